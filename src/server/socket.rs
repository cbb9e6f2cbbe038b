//! UDP socket capability
//!
//! The ingestion loop reaches the operating system only through
//! [`SocketProvider`], so tests can substitute a scripted socket.

use std::future::Future;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use tokio::net::UdpSocket;

/// Address family of the relay socket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFamily {
    /// IPv4
    Inet,
    /// IPv6
    Inet6,
}

impl AddressFamily {
    /// Loopback address of this family on `port`
    pub fn loopback(self, port: u16) -> SocketAddr {
        match self {
            AddressFamily::Inet => SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port),
            AddressFamily::Inet6 => SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), port),
        }
    }

    /// Check whether `addr` belongs to this family
    pub fn matches(self, addr: &SocketAddr) -> bool {
        matches!(
            (self, addr),
            (AddressFamily::Inet, SocketAddr::V4(_)) | (AddressFamily::Inet6, SocketAddr::V6(_))
        )
    }
}

/// Create, bind, read and close primitives over one datagram socket
pub trait SocketProvider: Send + Sync {
    /// Socket handle
    type Socket: Send + Sync;

    /// Create an unbound datagram socket
    ///
    /// Implementations may defer opening the OS socket to [`bind`], in
    /// which case OS creation failures are reported by `bind`.
    ///
    /// [`bind`]: SocketProvider::bind
    fn create(&self, family: AddressFamily) -> io::Result<Self::Socket>;

    /// Bind the socket to a local address
    fn bind(&self, socket: &mut Self::Socket, addr: SocketAddr) -> io::Result<()>;

    /// Read one datagram into `buf`, returning its length
    fn read(
        &self,
        socket: &Self::Socket,
        buf: &mut [u8],
    ) -> impl Future<Output = io::Result<usize>> + Send;

    /// Release the socket
    fn close(&self, socket: Self::Socket);
}

/// Socket handle of [`UdpSocketProvider`]
#[derive(Debug)]
pub struct UdpHandle {
    family: AddressFamily,
    socket: Option<UdpSocket>,
}

impl UdpHandle {
    /// Address family the handle was created for
    pub fn family(&self) -> AddressFamily {
        self.family
    }

    /// Local address, once bound
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.bound()?.local_addr()
    }

    fn bound(&self) -> io::Result<&UdpSocket> {
        self.socket
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "socket is not bound"))
    }
}

/// Production provider backed by tokio's UDP socket
///
/// Must be used from within a tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct UdpSocketProvider;

impl SocketProvider for UdpSocketProvider {
    type Socket = UdpHandle;

    /// Record the family only; the OS socket is opened in `bind`, so an
    /// unusable family (for example IPv6 disabled) fails there.
    fn create(&self, family: AddressFamily) -> io::Result<UdpHandle> {
        Ok(UdpHandle {
            family,
            socket: None,
        })
    }

    fn bind(&self, handle: &mut UdpHandle, addr: SocketAddr) -> io::Result<()> {
        if !handle.family.matches(&addr) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("address {} does not match family {:?}", addr, handle.family),
            ));
        }
        if handle.socket.is_some() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "socket is already bound",
            ));
        }

        let std_socket = std::net::UdpSocket::bind(addr)?;
        std_socket.set_nonblocking(true)?;
        handle.socket = Some(UdpSocket::from_std(std_socket)?);
        Ok(())
    }

    async fn read(&self, handle: &UdpHandle, buf: &mut [u8]) -> io::Result<usize> {
        handle.bound()?.recv(buf).await
    }

    fn close(&self, handle: UdpHandle) {
        drop(handle);
    }
}
