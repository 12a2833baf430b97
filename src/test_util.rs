//! Helpers shared by the unit tests: a capturing device and builders for
//! inbound frames.

use std::io;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use pnet_base::MacAddr;
use pnet_packet::arp::{ArpHardwareTypes, ArpOperation, MutableArpPacket};
use pnet_packet::ethernet::{EtherType, EtherTypes, MutableEthernetPacket};
use pnet_packet::ip::IpNextHeaderProtocols;
use pnet_packet::tcp::TcpPacket;

use crate::buffer::PacketBuf;
use crate::device::{DeviceRef, NetworkDevice};
use crate::net_stack::{net_stack, NetStack, NetStackConfig};

pub const LOCAL_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 3, 2);
pub const LOCAL_MAC: MacAddr = MacAddr(0x52, 0x54, 0x00, 0x12, 0x34, 0x56);
pub const REMOTE_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 3, 1);
pub const REMOTE_MAC: MacAddr = MacAddr(0x12, 0xc9, 0x37, 0x98, 0x91, 0x89);

/// Device at [`LOCAL_IP`] that records every frame it is asked to send.
#[derive(Default)]
pub struct CaptureDevice {
    frames: Mutex<Vec<Vec<u8>>>,
    failing: AtomicBool,
}

impl CaptureDevice {
    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.frames.lock().clone()
    }
    /// While set, `send` records nothing and fails with `WouldBlock`.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl NetworkDevice for CaptureDevice {
    fn mac(&self) -> MacAddr {
        LOCAL_MAC
    }
    fn ip(&self) -> Ipv4Addr {
        LOCAL_IP
    }
    fn send(&self, buf: &PacketBuf) -> io::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(io::Error::from(io::ErrorKind::WouldBlock));
        }
        self.frames.lock().push(buf.bytes().to_vec());
        Ok(())
    }
}

pub fn capture_device() -> (DeviceRef, Arc<CaptureDevice>) {
    let capture = Arc::new(CaptureDevice::default());
    let device: DeviceRef = capture.clone();
    (device, capture)
}

pub fn stack() -> NetStack {
    stack_with(NetStackConfig::default())
}

pub fn stack_with(config: NetStackConfig) -> NetStack {
    let _ = env_logger::builder().is_test(true).try_init();
    net_stack(config).unwrap()
}

/// Resolves [`REMOTE_IP`] so replies can go out without an ARP round trip.
pub fn seed_arp(stack: &NetStack, _device: &DeviceRef) {
    assert!(crate::arp::store(stack, REMOTE_IP, REMOTE_MAC));
}

pub fn octets(mac: MacAddr) -> [u8; 6] {
    [mac.0, mac.1, mac.2, mac.3, mac.4, mac.5]
}

pub fn arp_packet(op: u16, sender_mac: MacAddr, sender_ip: Ipv4Addr, target_mac: MacAddr, target_ip: Ipv4Addr) -> Vec<u8> {
    let mut buf = vec![0u8; crate::arp::ARP_PACKET_LEN];
    let mut packet = MutableArpPacket::new(&mut buf).unwrap();
    packet.set_hardware_type(ArpHardwareTypes::Ethernet);
    packet.set_protocol_type(EtherTypes::Ipv4);
    packet.set_hw_addr_len(6);
    packet.set_proto_addr_len(4);
    packet.set_operation(ArpOperation(op));
    packet.set_sender_hw_addr(sender_mac);
    packet.set_sender_proto_addr(sender_ip);
    packet.set_target_hw_addr(target_mac);
    packet.set_target_proto_addr(target_ip);
    buf
}

/// Frame from [`REMOTE_MAC`] to [`LOCAL_MAC`].
pub fn ethernet_frame(ethertype: EtherType, payload: &[u8]) -> Vec<u8> {
    let mut buf = vec![0u8; 14 + payload.len()];
    let mut frame = MutableEthernetPacket::new(&mut buf).unwrap();
    frame.set_destination(LOCAL_MAC);
    frame.set_source(REMOTE_MAC);
    frame.set_ethertype(ethertype);
    buf[14..].copy_from_slice(payload);
    buf
}

pub fn ipv4_packet(protocol: u8, src: Ipv4Addr, dst: Ipv4Addr, payload: &[u8]) -> Vec<u8> {
    let mut buf = vec![0u8; 20 + payload.len()];
    let total_len = buf.len() as u16;
    buf[0] = 0x45;
    buf[2..4].copy_from_slice(&total_len.to_be_bytes());
    buf[8] = 64;
    buf[9] = protocol;
    buf[12..16].copy_from_slice(&src.octets());
    buf[16..20].copy_from_slice(&dst.octets());
    let checksum = pnet_packet::util::checksum(&buf[..20], 5);
    buf[10..12].copy_from_slice(&checksum.to_be_bytes());
    buf[20..].copy_from_slice(payload);
    buf
}

/// Ethernet frame carrying an IPv4 packet from [`REMOTE_IP`] to [`LOCAL_IP`].
pub fn ipv4_frame(protocol: u8, payload: &[u8]) -> Vec<u8> {
    ethernet_frame(EtherTypes::Ipv4, &ipv4_packet(protocol, REMOTE_IP, LOCAL_IP, payload))
}

/// Segment from [`REMOTE_IP`] to [`LOCAL_IP`] without options.
pub fn tcp_segment(src_port: u16, dst_port: u16, seq: u32, ack: u32, flags: u8, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(20 + payload.len());
    buf.extend_from_slice(&src_port.to_be_bytes());
    buf.extend_from_slice(&dst_port.to_be_bytes());
    buf.extend_from_slice(&seq.to_be_bytes());
    buf.extend_from_slice(&ack.to_be_bytes());
    buf.push(5 << 4);
    buf.push(flags);
    buf.extend_from_slice(&65535u16.to_be_bytes());
    buf.extend_from_slice(&[0, 0, 0, 0]);
    buf.extend_from_slice(payload);
    let checksum = pnet_packet::util::ipv4_checksum(&buf, 8, &[], &REMOTE_IP, &LOCAL_IP, IpNextHeaderProtocols::Tcp);
    buf[16..18].copy_from_slice(&checksum.to_be_bytes());
    buf
}

pub fn udp_datagram(src_ip: Ipv4Addr, src_port: u16, dst_ip: Ipv4Addr, dst_port: u16, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(8 + payload.len());
    buf.extend_from_slice(&src_port.to_be_bytes());
    buf.extend_from_slice(&dst_port.to_be_bytes());
    buf.extend_from_slice(&(8 + payload.len() as u16).to_be_bytes());
    buf.extend_from_slice(&[0, 0]);
    buf.extend_from_slice(payload);
    let checksum = pnet_packet::util::ipv4_checksum(&buf, 3, &[], &src_ip, &dst_ip, IpNextHeaderProtocols::Udp);
    buf[6..8].copy_from_slice(&checksum.to_be_bytes());
    buf
}

/// The TCP segment of a frame sent by the stack.
pub fn reply_segment(frame: &[u8]) -> TcpPacket<'_> {
    TcpPacket::new(&frame[34..]).unwrap()
}

pub fn ping_request() -> Vec<u8> {
    PING_REQUEST.to_vec()
}

/// Echo request from 192.168.3.1 to 192.168.3.2, 56 bytes of payload.
pub const PING_REQUEST: [u8; 84] = [
    0x45, 0x00, 0x00, 0x54, 0xd1, 0x94, 0x40, 0x00, 0x40, 0x01, 0xe1, 0xc0,
    0xc0, 0xa8, 0x03, 0x01, 0xc0, 0xa8, 0x03, 0x02, 0x08, 0x00, 0x6b, 0xd3,
    0x0e, 0xb2, 0x03, 0xa5, 0x2d, 0x77, 0x1b, 0x53, 0x00, 0x00, 0x00, 0x00,
    0x6f, 0x38, 0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x10, 0x11, 0x12, 0x13,
    0x14, 0x15, 0x16, 0x17, 0x18, 0x19, 0x1a, 0x1b, 0x1c, 0x1d, 0x1e, 0x1f,
    0x20, 0x21, 0x22, 0x23, 0x24, 0x25, 0x26, 0x27, 0x28, 0x29, 0x2a, 0x2b,
    0x2c, 0x2d, 0x2e, 0x2f, 0x30, 0x31, 0x32, 0x33, 0x34, 0x35, 0x36, 0x37,
];

/// SYN from 192.168.3.1:51064 to port 80, with options.
pub const SYN_PORT_80: [u8; 40] = [
    0xc7, 0x78, 0x00, 0x50, 0xee, 0x75, 0x88, 0x62, 0x00, 0x00, 0x00, 0x00,
    0xa0, 0x02, 0x72, 0x10, 0x9e, 0xc3, 0x00, 0x00, 0x02, 0x04, 0x05, 0xb4,
    0x04, 0x02, 0x08, 0x0a, 0x04, 0x31, 0x6d, 0x06, 0x00, 0x00, 0x00, 0x00,
    0x01, 0x03, 0x03, 0x07,
];

/// SYN from 192.168.3.1:37382 to port 8099, with options.
pub const SYN_PORT_8099: [u8; 40] = [
    0x92, 0x06, 0x1f, 0xa3, 0x1c, 0xf9, 0x4a, 0x97, 0x00, 0x00, 0x00, 0x00,
    0xa0, 0x02, 0x6d, 0xb0, 0x75, 0xc4, 0x00, 0x00, 0x02, 0x04, 0x06, 0x18,
    0x04, 0x02, 0x08, 0x0a, 0x02, 0xeb, 0xc4, 0xad, 0x00, 0x00, 0x00, 0x00,
    0x01, 0x03, 0x03, 0x07,
];
