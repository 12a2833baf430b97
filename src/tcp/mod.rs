use std::fmt;
use std::io;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::Arc;

use bytes::BufMut;
use parking_lot::Mutex;
use pnet_packet::ip::IpNextHeaderProtocols;
use pnet_packet::tcp::TcpFlags::{ACK, RST, SYN};
use pnet_packet::tcp::TcpPacket;

use crate::device::DeviceRef;
use crate::ip::{self, IPV4_HEADER_LEN};
use crate::net_stack::NetStack;
use crate::tcp::tcb::{SegmentHeader, Tcb};

pub use tcb::TcpState;
pub(crate) mod tcb;

pub const TCP_HEADER_LEN: usize = 20;

/// Called with every chunk of in-order data received on a connection.
pub type ReadFn = Arc<dyn Fn(&NetStack, &TcpStream, &[u8]) + Send + Sync>;
/// Called when a connection is accepted on a listened port; returns the
/// read handler for the new connection.
pub type AcceptFn = Arc<dyn Fn(&TcpStream) -> ReadFn + Send + Sync>;

/// Handle to a TCP connection: the local and peer address pair.
///
/// The handle does not keep the connection alive. Operations on a handle
/// whose connection has been torn down fail with `NotConnected` or do
/// nothing.
#[derive(Eq, Hash, PartialEq, Debug, Clone, Copy)]
pub struct TcpStream {
    local_addr: SocketAddrV4,
    peer_addr: SocketAddrV4,
}

impl TcpStream {
    pub fn new(local_addr: SocketAddrV4, peer_addr: SocketAddrV4) -> Self {
        Self { local_addr, peer_addr }
    }
    pub fn local_addr(&self) -> SocketAddrV4 {
        self.local_addr
    }
    pub fn peer_addr(&self) -> SocketAddrV4 {
        self.peer_addr
    }
}

impl fmt::Display for TcpStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.peer_addr, self.local_addr)
    }
}

pub fn listen(stack: &NetStack, port: u16, accept: AcceptFn) -> io::Result<()> {
    stack.add_tcp_listener(port, accept)
}

pub fn receive(stack: &NetStack, device: &DeviceRef, data: &[u8], src_ip: Ipv4Addr) {
    let Some(packet) = TcpPacket::new(data) else {
        log::warn!("tcp packet too short: {} bytes from {src_ip}", data.len());
        return;
    };
    let header_len = packet.get_data_offset() as usize * 4;
    if header_len < TCP_HEADER_LEN || header_len > data.len() {
        log::warn!("bad tcp data offset {header_len} from {src_ip}");
        return;
    }
    let stream = TcpStream::new(
        SocketAddrV4::new(device.ip(), packet.get_destination()),
        SocketAddrV4::new(src_ip, packet.get_source()),
    );
    let flags = packet.get_flags();
    let seq = packet.get_sequence();
    let ack = packet.get_acknowledgement();
    let payload = &data[header_len..];

    let Some(tcb) = stack.tcp_stream(&stream) else {
        if flags & RST == RST {
            return;
        }
        if flags & SYN != SYN {
            log::debug!("tcp {stream} has no connection, flags={flags:#04x}");
            return;
        }
        accept(stack, device, stream, flags, seq, ack);
        return;
    };

    let (outcome, device) = {
        let mut tcb = tcb.lock();
        (tcb.push_segment(flags, seq, ack, payload), tcb.device().clone())
    };
    if let Some(header) = outcome.reply {
        reply(stack, &device, &stream, header);
    }
    if outcome.teardown {
        log::debug!("tcp {stream} closed");
        stack.remove_tcp_stream(&stream);
        return;
    }
    if let Some(data) = outcome.deliver {
        let on_read = tcb.lock().on_read();
        on_read(stack, &stream, &data);
    }
    let outcome = tcb.lock().finish_segment(outcome.fin);
    if let Some(header) = outcome.reply {
        reply(stack, &device, &stream, header);
    }
    if outcome.teardown {
        log::debug!("tcp {stream} closed");
        stack.remove_tcp_stream(&stream);
    }
}

fn accept(stack: &NetStack, device: &DeviceRef, stream: TcpStream, flags: u8, seq: u32, ack: u32) {
    let listener = stack
        .inner
        .tcp_listeners
        .get(&stream.local_addr.port())
        .map(|v| v.value().clone());
    let Some(accept) = listener.filter(|_| flags & ACK != ACK) else {
        log::debug!("tcp {stream} refused");
        reply(stack, device, &stream, tcb::reset(flags, seq, ack));
        return;
    };
    // LISTEN -> SYN_RECEIVED
    let on_read = accept(&stream);
    let (tcb, header) = Tcb::new_syn_received(seq, on_read, device.clone(), stack.config.tcp_recv_buffer_size);
    stack.inner.tcp_streams.insert(stream, Arc::new(Mutex::new(tcb)));
    reply(stack, device, &stream, header);
}

/// Sends `data` on an established connection as a single segment.
pub fn send(stack: &NetStack, stream: &TcpStream, data: &[u8]) -> io::Result<()> {
    let max = stack.config.mtu as usize - IPV4_HEADER_LEN - TCP_HEADER_LEN;
    if data.len() > max {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("tcp payload too long: {}>{max}", data.len()),
        ));
    }
    let Some(tcb) = stack.tcp_stream(stream) else {
        return Err(io::Error::from(io::ErrorKind::NotConnected));
    };
    let mut tcb = tcb.lock();
    if !tcb.is_sendable() {
        return Err(io::Error::new(
            io::ErrorKind::NotConnected,
            format!("tcp {stream} is {:?}", tcb.state()),
        ));
    }
    let device = tcb.device().clone();
    transmit(stack, &device, stream, tcb.send_header(), data)?;
    tcb.commit_send(data.len());
    Ok(())
}

/// Starts an active close. Closing a connection that is already closing or
/// gone does nothing.
pub fn close(stack: &NetStack, stream: &TcpStream) -> io::Result<()> {
    let Some(tcb) = stack.tcp_stream(stream) else {
        return Ok(());
    };
    let mut tcb = tcb.lock();
    let Some(header) = tcb.close_header() else {
        return Ok(());
    };
    let device = tcb.device().clone();
    transmit(stack, &device, stream, header, &[])?;
    tcb.commit_close();
    Ok(())
}

pub fn state(stack: &NetStack, stream: &TcpStream) -> Option<TcpState> {
    stack.tcp_stream(stream).map(|tcb| tcb.lock().state())
}

fn reply(stack: &NetStack, device: &DeviceRef, stream: &TcpStream, header: SegmentHeader) {
    if let Err(e) = transmit(stack, device, stream, header, &[]) {
        log::warn!("tcp {stream} reply failed,flags={:#04x}: {e:?}", header.flags);
    }
}

fn transmit(stack: &NetStack, device: &DeviceRef, stream: &TcpStream, header: SegmentHeader, payload: &[u8]) -> io::Result<()> {
    let mut buf = ip::allocate(TCP_HEADER_LEN + payload.len());
    {
        let mut segment = buf.bytes_mut();
        segment.put_u16(stream.local_addr.port());
        segment.put_u16(stream.peer_addr.port());
        segment.put_u32(header.seq);
        segment.put_u32(header.ack);
        // Data Offset
        segment.put_u8((TCP_HEADER_LEN as u8 / 4) << 4);
        segment.put_u8(header.flags);
        segment.put_u16(header.window);
        // Checksum
        segment.put_u16(0);
        // Urgent Pointer
        segment.put_u16(0);
        segment.put_slice(payload);
    }
    let checksum = pnet_packet::util::ipv4_checksum(
        buf.bytes(),
        8,
        &[],
        stream.local_addr.ip(),
        stream.peer_addr.ip(),
        IpNextHeaderProtocols::Tcp,
    );
    buf.bytes_mut()[16..18].copy_from_slice(&checksum.to_be_bytes());
    ip::send(stack, buf, IpNextHeaderProtocols::Tcp, *stream.peer_addr.ip(), device)
}
