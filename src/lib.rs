/*!
An Ethernet/IPv4 protocol stack for a single-threaded kernel: ARP, ICMP echo,
UDP and a minimal TCP.

Received frames are queued with [`NetStack::receive_deferred`] and processed
when the task queue is polled. Every reply goes out through the
[`NetworkDevice`](device::NetworkDevice) it came in on.

# Example
```no_run
use std::io;
use std::net::Ipv4Addr;
use std::sync::Arc;

use bytes::BytesMut;
use netstack::device::{DeviceRef, QueuedDevice, Transmit};
use pnet_base::MacAddr;

struct Nic;
impl Transmit for Nic {
    fn transmit(&self, _frame: &[u8]) -> io::Result<()> {
        todo!("Write the frame to the hardware")
    }
}

pub fn main() -> io::Result<()> {
    let stack = netstack::net_stack(netstack::NetStackConfig::default())?;
    let device: DeviceRef = QueuedDevice::new(
        MacAddr::new(0x52, 0x54, 0, 0x12, 0x34, 0x56),
        Ipv4Addr::new(192, 168, 3, 2),
        Nic,
        stack.task_queue().clone(),
    );
    stack.announce(&device)?;
    netstack::service::echo::init(&stack)?;
    netstack::service::http::init(&stack)?;
    loop {
        // from the receive interrupt
        let frame = BytesMut::new();
        stack.receive_deferred(&device, frame);
        // from the idle loop
        stack.poll_for_work();
    }
}
```
*/

pub mod buffer;
pub mod device;
mod net_stack;
pub use net_stack::*;
pub mod address;
pub mod arp;
pub mod ethernet;
pub mod icmp;
pub mod ip;
pub mod service;
pub mod task;
pub mod tcp;
pub mod udp;

#[cfg(test)]
mod test_util;
