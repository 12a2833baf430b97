use std::io;
use std::net::Ipv4Addr;

use pnet_base::MacAddr;
use pnet_packet::arp::{ArpHardwareTypes, ArpOperation, ArpOperations, ArpPacket, MutableArpPacket};
use pnet_packet::ethernet::EtherTypes;

use crate::device::DeviceRef;
use crate::ethernet;
use crate::net_stack::NetStack;

pub const ARP_PACKET_LEN: usize = 28;

/// Resolved IPv4 to MAC mappings.
///
/// Bounded, append-only and looked up linearly. Once full, new addresses
/// are rejected; there is no eviction.
#[derive(Debug)]
pub(crate) struct ArpTable {
    capacity: usize,
    entries: Vec<(Ipv4Addr, MacAddr)>,
}

impl ArpTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Vec::with_capacity(capacity),
        }
    }
    pub fn get(&self, ip: Ipv4Addr) -> Option<MacAddr> {
        self.entries.iter().find(|(v, _)| *v == ip).map(|(_, mac)| *mac)
    }
    pub fn insert(&mut self, ip: Ipv4Addr, mac: MacAddr) -> bool {
        if let Some(entry) = self.entries.iter_mut().find(|(v, _)| *v == ip) {
            entry.1 = mac;
            return true;
        }
        if self.entries.len() >= self.capacity {
            return false;
        }
        self.entries.push((ip, mac));
        true
    }
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Returns the MAC for `ip` if it is already resolved.
///
/// On a miss an ARP request is broadcast and `None` is returned; the caller
/// is expected to treat that as "not found" rather than wait.
pub fn lookup(stack: &NetStack, device: &DeviceRef, ip: Ipv4Addr) -> Option<MacAddr> {
    if let Some(mac) = stack.inner.arp_table.lock().get(ip) {
        return Some(mac);
    }
    if let Err(e) = request(device, ip) {
        log::warn!("arp request for {ip} failed: {e:?}");
    }
    None
}

pub fn store(stack: &NetStack, ip: Ipv4Addr, mac: MacAddr) -> bool {
    let stored = stack.inner.arp_table.lock().insert(ip, mac);
    if !stored {
        log::warn!("arp table full, dropping {ip} is-at {mac}");
    }
    stored
}

pub fn handle_packet(stack: &NetStack, device: &DeviceRef, data: &[u8]) {
    let Some(packet) = ArpPacket::new(data) else {
        log::warn!("arp packet too short: {} bytes", data.len());
        return;
    };
    if packet.get_target_proto_addr() != device.ip() {
        return;
    }
    match packet.get_operation() {
        ArpOperations::Request => {
            if let Err(e) = reply(device, packet.get_sender_hw_addr(), packet.get_sender_proto_addr()) {
                log::warn!("arp reply to {} failed: {e:?}", packet.get_sender_proto_addr());
            }
        }
        ArpOperations::Reply => {
            store(stack, packet.get_sender_proto_addr(), packet.get_sender_hw_addr());
        }
        op => log::debug!("unsupported arp operation {}", op.0),
    }
}

/// Broadcasts an unsolicited reply advertising the device's own address.
pub fn gratuitous_announce(device: &DeviceRef) -> io::Result<()> {
    reply(device, MacAddr::zero(), device.ip())
}

fn request(device: &DeviceRef, target_ip: Ipv4Addr) -> io::Result<()> {
    let mut buf = ethernet::allocate(ARP_PACKET_LEN);
    write_packet(buf.bytes_mut(), ArpOperations::Request, device, MacAddr::zero(), target_ip)?;
    ethernet::send(buf, EtherTypes::Arp, MacAddr::broadcast(), device)
}

fn reply(device: &DeviceRef, target_mac: MacAddr, target_ip: Ipv4Addr) -> io::Result<()> {
    let mut buf = ethernet::allocate(ARP_PACKET_LEN);
    write_packet(buf.bytes_mut(), ArpOperations::Reply, device, target_mac, target_ip)?;
    let destination = if target_mac == MacAddr::zero() {
        MacAddr::broadcast()
    } else {
        target_mac
    };
    ethernet::send(buf, EtherTypes::Arp, destination, device)
}

fn write_packet(
    buf: &mut [u8],
    operation: ArpOperation,
    device: &DeviceRef,
    target_mac: MacAddr,
    target_ip: Ipv4Addr,
) -> io::Result<()> {
    let Some(mut packet) = MutableArpPacket::new(buf) else {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "arp buffer too short"));
    };
    packet.set_hardware_type(ArpHardwareTypes::Ethernet);
    packet.set_protocol_type(EtherTypes::Ipv4);
    packet.set_hw_addr_len(6);
    packet.set_proto_addr_len(4);
    packet.set_operation(operation);
    packet.set_sender_hw_addr(device.mac());
    packet.set_sender_proto_addr(device.ip());
    packet.set_target_hw_addr(target_mac);
    packet.set_target_proto_addr(target_ip);
    Ok(())
}
