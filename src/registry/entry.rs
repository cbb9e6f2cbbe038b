//! Subscriber connection entry
//!
//! A [`Connection`] is owned by the subscribe handler that created it. The
//! broker only keeps a weak reference while the connection is registered,
//! and is the only writer of its statistics.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use crate::session::state::{CloseSignal, ConnectionState};
use crate::session::stream::SubscriberStream;
use crate::stats::{CollectorAddr, ConnectionStats};

use super::frame::Sample;

/// One subscriber receiving broadcast samples
pub struct Connection {
    /// Remote peer identity reported by the transport
    peer: String,

    /// Write capability for this subscriber
    stream: Box<dyn SubscriberStream>,

    /// `Open -> Closed` lifecycle
    state: CloseSignal,

    /// Collector address, resolved once at registration
    collector: OnceLock<Option<CollectorAddr>>,

    datagram_count: AtomicU64,
    bytes_sampled: AtomicU64,
    error_count: AtomicU64,
}

impl Connection {
    /// Create an open connection over a subscriber stream
    pub fn new(stream: Box<dyn SubscriberStream>) -> Self {
        Self {
            peer: stream.peer(),
            stream,
            state: CloseSignal::new(),
            collector: OnceLock::new(),
            datagram_count: AtomicU64::new(0),
            bytes_sampled: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
        }
    }

    /// Remote peer identity
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Write a sample to the subscriber
    ///
    /// Returns whether the transport accepted it.
    pub fn write(&self, sample: &Sample) -> bool {
        self.stream.write(sample)
    }

    /// Whether the remote peer has disconnected
    pub fn is_cancelled(&self) -> bool {
        self.stream.is_cancelled()
    }

    /// Signal the subscriber that streaming has begun
    pub fn send_initial_metadata(&self) {
        self.stream.send_initial_metadata();
    }

    /// Current lifecycle state
    pub fn state(&self) -> ConnectionState {
        self.state.state()
    }

    /// Check if the connection is closed
    pub fn is_closed(&self) -> bool {
        self.state.is_closed()
    }

    /// Close the connection and wake its handler
    ///
    /// Returns `true` if this call closed it.
    pub fn close(&self) -> bool {
        let closed = self.state.close();
        if closed {
            tracing::debug!(peer = %self.peer, "Connection closed");
        }
        closed
    }

    /// Wait until the connection is closed
    ///
    /// Closure comes from the broker (write failure, stale reap, drain).
    pub async fn wait_until_closed(&self) {
        self.state.wait_closed().await;
    }

    /// Resolve the collector address from the peer string
    ///
    /// Only the first call has an effect. A peer that cannot be parsed
    /// leaves the address empty.
    pub(crate) fn initialize_stats(&self) {
        self.collector.get_or_init(|| match CollectorAddr::parse_peer(&self.peer) {
            Ok(addr) => Some(addr),
            Err(e) => {
                tracing::warn!(peer = %self.peer, error = %e, "Unable to parse collector address");
                None
            }
        });
    }

    /// Count one accepted sample of `bytes` length
    pub(crate) fn record_delivery(&self, bytes: usize) {
        self.datagram_count.fetch_add(1, Ordering::Relaxed);
        self.bytes_sampled.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Count one failed write
    pub(crate) fn record_error(&self) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy of the connection's statistics
    pub fn stats(&self) -> ConnectionStats {
        let collector = self.collector.get().and_then(Option::as_ref);
        ConnectionStats {
            datagram_count: self.datagram_count.load(Ordering::Relaxed),
            bytes_sampled: self.bytes_sampled.load(Ordering::Relaxed),
            error_count: self.error_count.load(Ordering::Relaxed),
            ..ConnectionStats::new(collector)
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("peer", &self.peer)
            .field("state", &self.state())
            .field("stats", &self.stats())
            .finish()
    }
}
