use std::fmt;
use std::io;
use std::net::Ipv4Addr;
use std::sync::Arc;

use bytes::BytesMut;
use dashmap::{DashMap, Entry};
use parking_lot::Mutex;
use pnet_base::MacAddr;

use crate::address::Quad;
use crate::arp::{self, ArpTable};
use crate::device::DeviceRef;
use crate::task::TaskQueue;
use crate::tcp::{self, AcceptFn, TcpState, TcpStream};
use crate::tcp::tcb::Tcb;
use crate::udp::{self, NotifyFn};
use crate::{ethernet, ip};

#[derive(Copy, Clone, Debug)]
pub struct NetStackConfig {
    pub mtu: u16,
    pub ttl: u8,
    /// Maximum number of resolved addresses kept in the ARP table.
    pub arp_capacity: usize,
    /// Per-connection receive buffer, also the advertised window.
    pub tcp_recv_buffer_size: usize,
}

impl NetStackConfig {
    pub fn check(&self) -> io::Result<()> {
        if self.mtu < 576 {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "mtu<576"));
        }
        if self.ttl == 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "ttl is zero"));
        }
        if self.arp_capacity == 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "arp_capacity is zero"));
        }
        if self.tcp_recv_buffer_size == 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "tcp_recv_buffer_size is zero"));
        }
        Ok(())
    }
}

impl Default for NetStackConfig {
    fn default() -> Self {
        Self {
            mtu: 1500,
            ttl: 64,
            arp_capacity: 128,
            tcp_recv_buffer_size: 4096,
        }
    }
}

/// Handle to the protocol stack. Cloning is cheap; every clone shares the
/// same registries and task queue.
#[derive(Clone)]
pub struct NetStack {
    pub(crate) config: NetStackConfig,
    pub(crate) inner: Arc<NetStackInner>,
}

pub(crate) struct NetStackInner {
    pub(crate) arp_table: Mutex<ArpTable>,
    pub(crate) devices: DashMap<Ipv4Addr, DeviceRef>,
    pub(crate) tcp_streams: DashMap<TcpStream, Arc<Mutex<Tcb>>>,
    pub(crate) tcp_listeners: DashMap<u16, AcceptFn>,
    /// (port, notify) in registration order.
    pub(crate) udp_listeners: Mutex<Vec<(u16, NotifyFn)>>,
    pub(crate) task_queue: TaskQueue,
}

impl fmt::Debug for NetStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetStack")
            .field("config", &self.config)
            .field("arp_entries", &self.inner.arp_table.lock().len())
            .field("devices", &self.inner.devices.len())
            .field("tcp_streams", &self.inner.tcp_streams.len())
            .field("tcp_listeners", &self.inner.tcp_listeners.len())
            .field("task_queue", &self.inner.task_queue)
            .finish()
    }
}

/// Create a protocol stack.
///
/// # Examples
/// ```rust
/// use std::sync::Arc;
/// use netstack::tcp::{ReadFn, TcpStream};
/// use netstack::NetStack;
///
/// let stack = netstack::net_stack(Default::default())?;
/// stack.tcp_listen(7, Arc::new(|_stream: &TcpStream| {
///     let on_read: ReadFn = Arc::new(|stack: &NetStack, stream: &TcpStream, data: &[u8]| {
///         _ = stack.tcp_send(stream, data);
///     });
///     on_read
/// }))?;
/// # Ok::<(), std::io::Error>(())
/// ```
pub fn net_stack(config: NetStackConfig) -> io::Result<NetStack> {
    config.check()?;
    Ok(NetStack::new(config))
}

impl NetStack {
    pub(crate) fn new(config: NetStackConfig) -> Self {
        Self {
            config,
            inner: Arc::new(NetStackInner {
                arp_table: Mutex::new(ArpTable::new(config.arp_capacity)),
                devices: Default::default(),
                tcp_streams: Default::default(),
                tcp_listeners: Default::default(),
                udp_listeners: Default::default(),
                task_queue: TaskQueue::new(),
            }),
        }
    }
    pub fn config(&self) -> &NetStackConfig {
        &self.config
    }
    pub fn task_queue(&self) -> &TaskQueue {
        &self.inner.task_queue
    }
    /// Process one received Ethernet frame immediately.
    pub fn receive_frame(&self, device: &DeviceRef, frame: &[u8]) {
        ethernet::receive(self, device, frame)
    }
    /// Queue a received frame for processing on the next
    /// [`poll_for_work`](NetStack::poll_for_work). Safe to call from a
    /// receive interrupt: nothing but the enqueue happens here.
    pub fn receive_deferred(&self, device: &DeviceRef, frame: BytesMut) {
        let stack = self.clone();
        let device = device.clone();
        self.inner.task_queue.spawn(move || stack.receive_frame(&device, &frame));
    }
    pub fn poll_for_work(&self) -> usize {
        self.inner.task_queue.poll_for_work()
    }
    pub fn add_device(&self, device: &DeviceRef) {
        ip::add_device(self, device)
    }
    pub fn resolve_local(&self, ip: Ipv4Addr) -> Option<DeviceRef> {
        ip::resolve_local(self, ip)
    }
    /// Register the device and broadcast a gratuitous ARP for its address.
    pub fn announce(&self, device: &DeviceRef) -> io::Result<()> {
        ip::add_device(self, device);
        arp::gratuitous_announce(device)
    }
    pub fn arp_lookup(&self, device: &DeviceRef, ip: Ipv4Addr) -> Option<MacAddr> {
        arp::lookup(self, device, ip)
    }
    pub fn tcp_listen(&self, port: u16, accept: AcceptFn) -> io::Result<()> {
        tcp::listen(self, port, accept)
    }
    pub fn tcp_send(&self, stream: &TcpStream, data: &[u8]) -> io::Result<()> {
        tcp::send(self, stream, data)
    }
    pub fn tcp_close(&self, stream: &TcpStream) -> io::Result<()> {
        tcp::close(self, stream)
    }
    /// State of a live connection, `None` once it has been torn down.
    pub fn tcp_state(&self, stream: &TcpStream) -> Option<TcpState> {
        tcp::state(self, stream)
    }
    pub fn udp_listen(&self, port: u16, notify: NotifyFn) -> io::Result<()> {
        udp::listen(self, port, notify)
    }
    pub fn udp_send(&self, quad: &Quad, data: &[u8]) -> io::Result<()> {
        udp::send(self, quad, data)
    }
    pub(crate) fn add_tcp_listener(&self, port: u16, accept: AcceptFn) -> io::Result<()> {
        match self.inner.tcp_listeners.entry(port) {
            Entry::Occupied(_entry) => Err(io::Error::from(io::ErrorKind::AddrInUse)),
            Entry::Vacant(entry) => {
                entry.insert(accept);
                Ok(())
            }
        }
    }
    pub(crate) fn tcp_stream(&self, stream: &TcpStream) -> Option<Arc<Mutex<Tcb>>> {
        self.inner.tcp_streams.get(stream).map(|v| v.value().clone())
    }
    pub(crate) fn remove_tcp_stream(&self, stream: &TcpStream) {
        self.inner.tcp_streams.remove(stream);
    }
}
