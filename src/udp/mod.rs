use std::io;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::Arc;

use bytes::BufMut;
use pnet_packet::ip::IpNextHeaderProtocols;
use pnet_packet::udp::UdpPacket;

use crate::address::Quad;
use crate::device::DeviceRef;
use crate::ip::{self, IPV4_HEADER_LEN};
use crate::net_stack::NetStack;

pub const UDP_HEADER_LEN: usize = 8;

/// Called for every datagram arriving on a listened port, with the flow
/// as seen by the sender (`src` is the peer, `dst` is us).
pub type NotifyFn = Arc<dyn Fn(&NetStack, &Quad, &[u8]) + Send + Sync>;

pub fn receive(stack: &NetStack, device: &DeviceRef, data: &[u8], src_ip: Ipv4Addr) {
    let Some(packet) = UdpPacket::new(data) else {
        log::warn!("udp packet too short: {} bytes from {src_ip}", data.len());
        return;
    };
    let length = packet.get_length() as usize;
    if length < UDP_HEADER_LEN || length > data.len() {
        log::warn!("bad udp length {length} from {src_ip}, received {}", data.len());
        return;
    }
    let quad = Quad {
        src: SocketAddrV4::new(src_ip, packet.get_source()),
        dst: SocketAddrV4::new(device.ip(), packet.get_destination()),
    };
    let payload = &data[UDP_HEADER_LEN..length];
    let port = quad.dst.port();
    let listeners: Vec<NotifyFn> = stack
        .inner
        .udp_listeners
        .lock()
        .iter()
        .filter(|(p, _)| *p == port)
        .map(|(_, notify)| notify.clone())
        .collect();
    if listeners.is_empty() {
        log::debug!("udp {quad} has no listener");
        return;
    }
    for notify in listeners {
        notify(stack, &quad, payload);
    }
}

/// Sends `data` from `quad.src` to `quad.dst`.
///
/// The outgoing device is the one owning `quad.src`'s address.
pub fn send(stack: &NetStack, quad: &Quad, data: &[u8]) -> io::Result<()> {
    let Some(device) = ip::resolve_local(stack, *quad.src.ip()) else {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("no device for {}", quad.src.ip()),
        ));
    };
    let max = stack.config.mtu as usize - IPV4_HEADER_LEN - UDP_HEADER_LEN;
    if data.len() > max {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("udp payload too long: {}>{max}", data.len()),
        ));
    }
    let mut buf = ip::allocate(UDP_HEADER_LEN + data.len());
    {
        let mut segment = buf.bytes_mut();
        segment.put_u16(quad.src.port());
        segment.put_u16(quad.dst.port());
        segment.put_u16((UDP_HEADER_LEN + data.len()) as u16);
        // checksum
        segment.put_u16(0);
        segment.put_slice(data);
    }
    let checksum = match pnet_packet::util::ipv4_checksum(
        buf.bytes(),
        3,
        &[],
        quad.src.ip(),
        quad.dst.ip(),
        IpNextHeaderProtocols::Udp,
    ) {
        // zero means "no checksum" on the wire
        0 => 0xffff,
        checksum => checksum,
    };
    buf.bytes_mut()[6..8].copy_from_slice(&checksum.to_be_bytes());
    ip::send(stack, buf, IpNextHeaderProtocols::Udp, *quad.dst.ip(), &device)
}

/// Registers `notify` for datagrams arriving on `port`. Several listeners
/// may share a port; they are called in registration order.
pub fn listen(stack: &NetStack, port: u16, notify: NotifyFn) -> io::Result<()> {
    stack.inner.udp_listeners.lock().push((port, notify));
    Ok(())
}
