use std::io;
use std::sync::Arc;

use crate::address::Quad;
use crate::net_stack::NetStack;
use crate::tcp::{ReadFn, TcpStream};

pub const ECHO_PORT: u16 = 7;

/// Echoes TCP streams and UDP datagrams on port 7.
pub fn init(stack: &NetStack) -> io::Result<()> {
    stack
        .tcp_listen(
            ECHO_PORT,
            Arc::new(|_stream: &TcpStream| {
                let on_read: ReadFn = Arc::new(tcp_echo);
                on_read
            }),
        )
        .inspect_err(|e| log::warn!("cannot listen on port {ECHO_PORT} for tcp echo: {e:?}"))?;
    stack
        .udp_listen(ECHO_PORT, Arc::new(udp_echo))
        .inspect_err(|e| log::warn!("cannot listen on port {ECHO_PORT} for udp echo: {e:?}"))
}

fn tcp_echo(stack: &NetStack, stream: &TcpStream, data: &[u8]) {
    if let Err(e) = stack.tcp_send(stream, data) {
        log::warn!("tcp echo to {} failed: {e:?}", stream.peer_addr());
    }
}

fn udp_echo(stack: &NetStack, quad: &Quad, data: &[u8]) {
    if let Err(e) = stack.udp_send(&quad.reverse(), data) {
        log::warn!("udp echo to {} failed: {e:?}", quad.src);
    }
}
