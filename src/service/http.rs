use std::io;
use std::sync::Arc;

use crate::net_stack::NetStack;
use crate::tcp::{ReadFn, TcpStream};

pub const HTTP_PORT: u16 = 80;

const RESPONSE: &[u8] =
    b"HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: 26\r\n\r\n<html>Bad-OS 64</html>\r\n\r\n";

/// Answers every read on port 80 with a fixed page.
pub fn init(stack: &NetStack) -> io::Result<()> {
    stack
        .tcp_listen(
            HTTP_PORT,
            Arc::new(|_stream: &TcpStream| {
                let on_read: ReadFn = Arc::new(respond);
                on_read
            }),
        )
        .inspect_err(|e| log::warn!("failed to listen on port {HTTP_PORT}: {e:?}"))
}

fn respond(stack: &NetStack, stream: &TcpStream, _request: &[u8]) {
    if let Err(e) = stack.tcp_send(stream, RESPONSE) {
        log::warn!("http response to {} failed: {e:?}", stream.peer_addr());
    }
}
