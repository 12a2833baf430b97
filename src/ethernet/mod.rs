use std::io;

use pnet_base::MacAddr;
use pnet_packet::ethernet::{EtherType, EtherTypes, EthernetPacket, MutableEthernetPacket};
use pnet_packet::Packet;

use crate::buffer::PacketBuf;
use crate::device::DeviceRef;
use crate::net_stack::NetStack;
use crate::{arp, ip};

pub const ETHERNET_HEADER_LEN: usize = 14;

/// Allocates a buffer for `size` payload bytes with room for the frame header.
pub fn allocate(size: usize) -> PacketBuf {
    let mut buf = PacketBuf::allocate(size + ETHERNET_HEADER_LEN);
    buf.push(ETHERNET_HEADER_LEN);
    buf
}

/// Prepends the frame header and hands the frame to the device.
pub fn send(mut buf: PacketBuf, ethertype: EtherType, destination: MacAddr, device: &DeviceRef) -> io::Result<()> {
    buf.pop(ETHERNET_HEADER_LEN);
    let Some(mut frame) = MutableEthernetPacket::new(buf.bytes_mut()) else {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "frame too short"));
    };
    frame.set_destination(destination);
    frame.set_source(device.mac());
    frame.set_ethertype(ethertype);
    device.send(&buf)
}

pub fn receive(stack: &NetStack, device: &DeviceRef, data: &[u8]) {
    let Some(frame) = EthernetPacket::new(data) else {
        log::warn!("ethernet frame too short: {} bytes", data.len());
        return;
    };
    match frame.get_ethertype() {
        EtherTypes::Ipv4 => ip::receive(stack, device, frame.payload()),
        EtherTypes::Arp => arp::handle_packet(stack, device, frame.payload()),
        EtherTypes::Ipv6 => log::debug!("ipv6 frame dropped"),
        ethertype => log::warn!("unknown ethernet frame type: {:#06x}", ethertype.0),
    }
}
