use std::fmt;
use std::io;
use std::net::{SocketAddr, SocketAddrV4};

pub trait ToSocketAddrV4 {
    fn to_addr(&self) -> io::Result<SocketAddrV4>;
}
impl ToSocketAddrV4 for SocketAddrV4 {
    fn to_addr(&self) -> io::Result<SocketAddrV4> {
        Ok(*self)
    }
}
impl ToSocketAddrV4 for &SocketAddrV4 {
    fn to_addr(&self) -> io::Result<SocketAddrV4> {
        Ok(**self)
    }
}
impl ToSocketAddrV4 for SocketAddr {
    fn to_addr(&self) -> io::Result<SocketAddrV4> {
        match self {
            SocketAddr::V4(addr) => Ok(*addr),
            SocketAddr::V6(_) => Err(io::Error::new(io::ErrorKind::Unsupported, "ipv6 is not supported")),
        }
    }
}
impl ToSocketAddrV4 for &str {
    fn to_addr(&self) -> io::Result<SocketAddrV4> {
        self.parse()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, format!("{e}")))
    }
}
impl ToSocketAddrV4 for String {
    fn to_addr(&self) -> io::Result<SocketAddrV4> {
        self.as_str().to_addr()
    }
}

/// A UDP 4-tuple identifying a datagram flow.
#[derive(Eq, Hash, PartialEq, Debug, Clone, Copy)]
pub struct Quad {
    pub src: SocketAddrV4,
    pub dst: SocketAddrV4,
}

impl Quad {
    pub fn new(src: impl ToSocketAddrV4, dst: impl ToSocketAddrV4) -> io::Result<Self> {
        Ok(Self {
            src: src.to_addr()?,
            dst: dst.to_addr()?,
        })
    }
    /// The same flow seen from the other end.
    pub fn reverse(&self) -> Self {
        Self {
            src: self.dst,
            dst: self.src,
        }
    }
}

impl fmt::Display for Quad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.src, self.dst)
    }
}
