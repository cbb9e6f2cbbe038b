//! Per-subscriber statistics
//!
//! Each connection keeps a stats block identifying the collector behind it
//! and counting what was delivered. The collector address is derived from
//! the transport's peer string, which comes in one of two forms:
//!
//! ```text
//! ipv4:10.0.0.5:6343
//! ipv6:[2001:db8::1]:6343      (brackets may arrive as %5B / %5D)
//! ```

use std::net::{Ipv4Addr, Ipv6Addr};

use thiserror::Error;

const IPV4_PREFIX: &str = "ipv4:";
const IPV6_PREFIX: &str = "ipv6:";

/// Statistics for one subscriber connection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Collector IP address (empty if the peer could not be parsed)
    pub collector_ip: String,
    /// Collector port (0 if the peer could not be parsed)
    pub collector_port: u16,
    /// Samples accepted by the subscriber's transport
    pub datagram_count: u64,
    /// Total packet bytes accepted by the subscriber's transport
    pub bytes_sampled: u64,
    /// Failed writes to the subscriber
    pub error_count: u64,
}

impl ConnectionStats {
    /// Create an empty stats block for the given collector
    pub fn new(collector: Option<&CollectorAddr>) -> Self {
        match collector {
            Some(addr) => Self {
                collector_ip: addr.ip.clone(),
                collector_port: addr.port,
                ..Default::default()
            },
            None => Self::default(),
        }
    }
}

/// Collector address parsed from a peer string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorAddr {
    /// IP address without brackets
    pub ip: String,
    /// Port number
    pub port: u16,
}

/// Reason a peer string could not be parsed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeerParseError {
    /// Neither the `ipv4:` nor the `ipv6:` form
    #[error("unrecognized peer format: {0}")]
    UnrecognizedFormat(String),
    /// The address part is not a valid IP of the announced family
    #[error("invalid collector address in peer {0}")]
    InvalidAddress(String),
    /// The port is missing, not a number, or out of range
    #[error("invalid collector port in peer {0}")]
    InvalidPort(String),
}

impl CollectorAddr {
    /// Parse a transport peer string into a collector address
    pub fn parse_peer(peer: &str) -> Result<Self, PeerParseError> {
        if let Some(rest) = peer.strip_prefix(IPV4_PREFIX) {
            let (ip, port) = rest
                .rsplit_once(':')
                .ok_or_else(|| PeerParseError::InvalidPort(peer.to_string()))?;
            ip.parse::<Ipv4Addr>()
                .map_err(|_| PeerParseError::InvalidAddress(peer.to_string()))?;
            return Ok(Self {
                ip: ip.to_string(),
                port: parse_port(port, peer)?,
            });
        }

        if let Some(rest) = peer.strip_prefix(IPV6_PREFIX) {
            let rest = decode_brackets(rest);
            let inner = rest
                .strip_prefix('[')
                .ok_or_else(|| PeerParseError::InvalidAddress(peer.to_string()))?;
            let (ip, port) = inner
                .split_once("]:")
                .ok_or_else(|| PeerParseError::InvalidPort(peer.to_string()))?;
            ip.parse::<Ipv6Addr>()
                .map_err(|_| PeerParseError::InvalidAddress(peer.to_string()))?;
            return Ok(Self {
                ip: ip.to_string(),
                port: parse_port(port, peer)?,
            });
        }

        Err(PeerParseError::UnrecognizedFormat(peer.to_string()))
    }
}

fn parse_port(port: &str, peer: &str) -> Result<u16, PeerParseError> {
    if port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
        return Err(PeerParseError::InvalidPort(peer.to_string()));
    }
    port.parse()
        .map_err(|_| PeerParseError::InvalidPort(peer.to_string()))
}

/// Undo percent-encoding of `[` and `]` only
fn decode_brackets(raw: &str) -> String {
    raw.replace("%5B", "[")
        .replace("%5b", "[")
        .replace("%5D", "]")
        .replace("%5d", "]")
}
