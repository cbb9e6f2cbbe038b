//! Relay configuration

use std::net::SocketAddr;

use super::socket::AddressFamily;

/// Default UDP port sFlow agents export to
pub const DEFAULT_UDP_PORT: u16 = 6343;

/// Default maximum number of concurrent subscribers
pub const DEFAULT_MAX_CLIENTS: usize = 10;

/// Relay configuration options
///
/// Fixed once the server is constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// UDP port to read samples from (bound on loopback)
    pub udp_port: u16,

    /// Address family of the UDP socket
    pub address_family: AddressFamily,

    /// Maximum concurrent subscribers
    pub max_clients: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            udp_port: DEFAULT_UDP_PORT,
            address_family: AddressFamily::Inet6,
            max_clients: DEFAULT_MAX_CLIENTS,
        }
    }
}

impl RelayConfig {
    /// Set the UDP port
    pub fn udp_port(mut self, port: u16) -> Self {
        self.udp_port = port;
        self
    }

    /// Set the address family
    pub fn address_family(mut self, family: AddressFamily) -> Self {
        self.address_family = family;
        self
    }

    /// Set maximum concurrent subscribers
    pub fn max_clients(mut self, max: usize) -> Self {
        self.max_clients = max;
        self
    }

    /// Loopback address the UDP socket binds to
    pub fn loopback_addr(&self) -> SocketAddr {
        self.address_family.loopback(self.udp_port)
    }
}
