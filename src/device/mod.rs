use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::net::Ipv4Addr;
use std::sync::{Arc, Weak};

use bytes::BytesMut;
use parking_lot::Mutex;
use pnet_base::MacAddr;

use crate::buffer::PacketBuf;
use crate::task::{Task, TaskQueue};

/// A network interface as seen by the protocol stack.
///
/// The stack only ever calls [`send`](NetworkDevice::send) on a fully framed
/// Ethernet buffer. Ownership of the buffer stays with the caller.
pub trait NetworkDevice: Send + Sync {
    fn mac(&self) -> MacAddr;
    fn ip(&self) -> Ipv4Addr;
    /// Transmit the buffer's current content (`buf.bytes()`).
    fn send(&self, buf: &PacketBuf) -> io::Result<()>;
}

pub type DeviceRef = Arc<dyn NetworkDevice>;

/// Raw frame transmit of a NIC driver.
pub trait Transmit: Send + Sync {
    fn transmit(&self, frame: &[u8]) -> io::Result<()>;
}

/// Adapts a [`Transmit`] driver into a [`NetworkDevice`] whose hardware
/// access is serialized through the deferred-work queue.
///
/// `send` only stages a copy of the frame; each run of the device's
/// transmit task hands exactly one staged frame to the hardware and
/// re-enqueues itself while frames remain.
pub struct QueuedDevice<T> {
    mac: MacAddr,
    ip: Ipv4Addr,
    hw: T,
    staged: Mutex<VecDeque<BytesMut>>,
    send_task: Arc<Task>,
    queue: TaskQueue,
}

impl<T: Transmit + 'static> QueuedDevice<T> {
    pub fn new(mac: MacAddr, ip: Ipv4Addr, hw: T, queue: TaskQueue) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let weak = weak.clone();
            let send_task = Task::new(move || {
                if let Some(device) = weak.upgrade() {
                    device.transmit_next();
                }
            });
            Self {
                mac,
                ip,
                hw,
                staged: Mutex::new(VecDeque::new()),
                send_task,
                queue,
            }
        })
    }
    pub fn hardware(&self) -> &T {
        &self.hw
    }
    pub fn staged(&self) -> usize {
        self.staged.lock().len()
    }
    fn transmit_next(&self) {
        let (frame, more) = {
            let mut staged = self.staged.lock();
            let frame = staged.pop_front();
            (frame, !staged.is_empty())
        };
        if let Some(frame) = frame {
            if let Err(e) = self.hw.transmit(&frame) {
                log::warn!("device {} transmit failed: {e:?}", self.ip);
            }
        }
        if more {
            self.queue.enqueue(&self.send_task);
        }
    }
}

impl<T: Transmit + 'static> NetworkDevice for QueuedDevice<T> {
    fn mac(&self) -> MacAddr {
        self.mac
    }
    fn ip(&self) -> Ipv4Addr {
        self.ip
    }
    fn send(&self, buf: &PacketBuf) -> io::Result<()> {
        self.staged.lock().push_back(BytesMut::from(buf.bytes()));
        self.queue.enqueue(&self.send_task);
        Ok(())
    }
}

impl<T> fmt::Debug for QueuedDevice<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueuedDevice")
            .field("mac", &self.mac)
            .field("ip", &self.ip)
            .field("staged", &self.staged.lock().len())
            .finish()
    }
}
