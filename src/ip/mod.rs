use std::io;
use std::net::Ipv4Addr;

use pnet_packet::ethernet::EtherTypes;
use pnet_packet::ip::{IpNextHeaderProtocol, IpNextHeaderProtocols};
use pnet_packet::ipv4::Ipv4Packet;

use crate::buffer::PacketBuf;
use crate::device::DeviceRef;
use crate::net_stack::NetStack;
use crate::{arp, ethernet, icmp, tcp, udp};

pub const IPV4_HEADER_LEN: usize = 20;

/// Internet checksum of `data`, with the 16-bit word at index `skipword`
/// treated as zero.
pub fn checksum(data: &[u8], skipword: usize) -> u16 {
    pnet_packet::util::checksum(data, skipword)
}

/// Allocates a buffer for `size` payload bytes with room for the IP and
/// Ethernet headers.
pub fn allocate(size: usize) -> PacketBuf {
    let mut buf = ethernet::allocate(size + IPV4_HEADER_LEN);
    buf.push(IPV4_HEADER_LEN);
    buf
}

/// Prepends the IPv4 header and sends the packet to `dest` through `device`.
///
/// Fails with `NotFound` if `dest` has not been resolved yet; a request has
/// been broadcast in that case and a later send may succeed.
pub fn send(
    stack: &NetStack,
    mut buf: PacketBuf,
    protocol: IpNextHeaderProtocol,
    dest: Ipv4Addr,
    device: &DeviceRef,
) -> io::Result<()> {
    buf.pop(IPV4_HEADER_LEN);
    let total_length = buf.curr_size();
    if total_length > u16::MAX as usize {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("ip packet too long: {total_length}"),
        ));
    }
    let ip_header = &mut buf.bytes_mut()[..IPV4_HEADER_LEN];
    ip_header[0] = (4 << 4) | (IPV4_HEADER_LEN / 4) as u8; // Version (4) + IHL
    ip_header[1] = 0; // Type of Service
    ip_header[2..4].copy_from_slice(&(total_length as u16).to_be_bytes());
    ip_header[4..6].copy_from_slice(&0u16.to_be_bytes());
    ip_header[6..8].copy_from_slice(&0u16.to_be_bytes());
    ip_header[8] = stack.config.ttl;
    ip_header[9] = protocol.0;
    ip_header[10..12].copy_from_slice(&0u16.to_be_bytes());
    ip_header[12..16].copy_from_slice(&device.ip().octets());
    ip_header[16..20].copy_from_slice(&dest.octets());
    let checksum = checksum(ip_header, 5);
    ip_header[10..12].copy_from_slice(&checksum.to_be_bytes());

    let Some(mac) = arp::lookup(stack, device, dest) else {
        return Err(io::Error::new(io::ErrorKind::NotFound, format!("{dest} is not resolved")));
    };
    ethernet::send(buf, EtherTypes::Ipv4, mac, device)
}

pub fn receive(stack: &NetStack, device: &DeviceRef, data: &[u8]) {
    add_device(stack, device);
    let Some(packet) = Ipv4Packet::new(data) else {
        log::warn!("ip packet too short: {} bytes", data.len());
        return;
    };
    if packet.get_version() != 4 {
        log::warn!("not an ipv4 packet: version {}", packet.get_version());
        return;
    }
    let header_len = packet.get_header_length() as usize * 4;
    let total_len = packet.get_total_length() as usize;
    if header_len < IPV4_HEADER_LEN || total_len < header_len || total_len > data.len() {
        log::warn!(
            "bad ip packet length: header={header_len},total={total_len},received={}",
            data.len()
        );
        return;
    }
    if checksum(&data[..header_len], 5) != packet.get_checksum() {
        log::warn!("bad ip header checksum from {}", packet.get_source());
        return;
    }
    let src = packet.get_source();
    let payload = &data[header_len..total_len];
    match packet.get_next_level_protocol() {
        IpNextHeaderProtocols::Icmp => icmp::handle_echo_request(stack, src, device, payload),
        IpNextHeaderProtocols::Igmp => log::debug!("igmp packet from {src} ignored"),
        IpNextHeaderProtocols::Tcp => tcp::receive(stack, device, payload, src),
        IpNextHeaderProtocols::Udp => udp::receive(stack, device, payload, src),
        protocol => log::warn!("unsupported ip protocol {} from {src}", protocol.0),
    }
}

/// Registers `device` as the owner of its IP address.
pub fn add_device(stack: &NetStack, device: &DeviceRef) {
    let ip = device.ip();
    if !stack.inner.devices.contains_key(&ip) {
        log::debug!("device {ip} registered");
        stack.inner.devices.insert(ip, device.clone());
    }
}

/// Returns the local device that owns `ip`, if any.
pub fn resolve_local(stack: &NetStack, ip: Ipv4Addr) -> Option<DeviceRef> {
    stack.inner.devices.get(&ip).map(|v| v.value().clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{capture_device, ipv4_packet, octets, ping_request, seed_arp, stack, LOCAL_IP, REMOTE_IP, REMOTE_MAC};

    #[test]
    fn test_checksum() {
        let header = [
            0x45, 0x00, 0x38, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xc0, 0xa8, 0x03, 0x02, 0xc0,
            0xa8, 0x03, 0x01,
        ];
        let checksum = checksum(&header, 5);
        assert_eq!(checksum, 0xfbaa);
        assert_eq!(checksum.to_be_bytes(), [0xfb, 0xaa]);
    }
    #[test]
    fn test_send_writes_header() {
        let stack = stack();
        let (dev, capture) = capture_device();
        seed_arp(&stack, &dev);
        let mut buf = allocate(4);
        buf.bytes_mut().copy_from_slice(b"ping");
        send(&stack, buf, IpNextHeaderProtocols::Udp, REMOTE_IP, &dev).unwrap();

        let frames = capture.frames();
        assert_eq!(frames.len(), 1);
        let frame = &frames[0];
        assert_eq!(frame.len(), 14 + 20 + 4);
        assert_eq!(&frame[0..6], &octets(REMOTE_MAC));
        assert_eq!(&frame[12..14], &[0x08, 0x00]);
        let packet = Ipv4Packet::new(&frame[14..]).unwrap();
        assert_eq!(packet.get_version(), 4);
        assert_eq!(packet.get_header_length(), 5);
        assert_eq!(packet.get_total_length(), 24);
        assert_eq!(packet.get_ttl(), 64);
        assert_eq!(packet.get_next_level_protocol(), IpNextHeaderProtocols::Udp);
        assert_eq!(packet.get_source(), LOCAL_IP);
        assert_eq!(packet.get_destination(), REMOTE_IP);
        assert_eq!(checksum(&frame[14..34], 5), packet.get_checksum());
        assert_eq!(&frame[34..], b"ping");
    }
    #[test]
    fn test_send_unresolved() {
        let stack = stack();
        let (dev, capture) = capture_device();
        let err = send(&stack, allocate(4), IpNextHeaderProtocols::Udp, REMOTE_IP, &dev).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        // only the arp request went out
        let frames = capture.frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][12..14], &[0x08, 0x06]);
    }
    #[test]
    fn test_receive_registers_device() {
        let stack = stack();
        let (dev, capture) = capture_device();
        assert!(resolve_local(&stack, LOCAL_IP).is_none());
        // igmp is ignored, the device is still registered
        receive(&stack, &dev, &ipv4_packet(2, REMOTE_IP, LOCAL_IP, &[0; 8]));
        assert!(resolve_local(&stack, LOCAL_IP).is_some());
        assert!(resolve_local(&stack, REMOTE_IP).is_none());
        assert!(capture.frames().is_empty());
    }
    #[test]
    fn test_receive_drops_malformed() {
        let stack = stack();
        let (dev, capture) = capture_device();
        seed_arp(&stack, &dev);
        let request = ping_request();

        let mut bad_checksum = request.clone();
        bad_checksum[10] ^= 0xff;
        receive(&stack, &dev, &bad_checksum);

        let mut bad_version = request.clone();
        bad_version[0] = 0x65;
        receive(&stack, &dev, &bad_version);

        receive(&stack, &dev, &request[..40]);
        receive(&stack, &dev, &request[..12]);
        assert!(capture.frames().is_empty());

        // the untouched packet gets an answer
        receive(&stack, &dev, &request);
        assert_eq!(capture.frames().len(), 1);
    }
}
