use std::net::Ipv4Addr;

use pnet_packet::icmp::{IcmpPacket, IcmpTypes};
use pnet_packet::ip::IpNextHeaderProtocols;

use crate::device::DeviceRef;
use crate::ip;
use crate::net_stack::NetStack;

pub const ICMP_HEADER_LEN: usize = 8;

/// Answers an echo request from `sender` with an echo reply carrying the
/// same identifier, sequence number and payload. Other message types are
/// ignored.
pub fn handle_echo_request(stack: &NetStack, sender: Ipv4Addr, device: &DeviceRef, data: &[u8]) {
    if data.len() < ICMP_HEADER_LEN {
        log::warn!("icmp packet too short: {} bytes from {sender}", data.len());
        return;
    }
    let Some(request) = IcmpPacket::new(data) else {
        return;
    };
    if request.get_icmp_type() != IcmpTypes::EchoRequest {
        log::debug!("icmp type {} from {sender} ignored", request.get_icmp_type().0);
        return;
    }
    let mut buf = ip::allocate(data.len());
    let reply = buf.bytes_mut();
    reply.copy_from_slice(data);
    reply[0] = IcmpTypes::EchoReply.0;
    reply[1] = 0;
    let checksum = ip::checksum(reply, 1);
    reply[2..4].copy_from_slice(&checksum.to_be_bytes());
    if let Err(e) = ip::send(stack, buf, IpNextHeaderProtocols::Icmp, sender, device) {
        log::warn!("icmp echo reply to {sender} failed: {e:?}");
    }
}
