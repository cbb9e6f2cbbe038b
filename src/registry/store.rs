//! Subscriber broker implementation
//!
//! The broker owns the subscriber registry and fans every sample out to the
//! registered connections.
//!
//! One mutex guards the registry. Admission, removal, drain, stats and the
//! whole fan-out of a broadcast all run under it, so a connection cannot be
//! removed mid-broadcast and two broadcasts never interleave their counter
//! updates. Writes are non-blocking, so the lock is never held while
//! waiting on a subscriber.

use std::sync::{Arc, Weak};

use bytes::Bytes;
use tokio::sync::Mutex;

use crate::server::ingest::SampleSender;
use crate::stats::ConnectionStats;

use super::entry::Connection;
use super::error::BrokerError;
use super::frame::{unix_nanos_now, Sample, SflowVersion};

/// Broker lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerState {
    /// New subscribers are admitted
    Active,
    /// Drain was requested; no new subscribers are admitted
    Draining,
}

/// Registry contents guarded by the broker lock
#[derive(Debug)]
struct Registry {
    /// Registered connections in admission order
    connections: Vec<Weak<Connection>>,
    state: BrokerState,
    /// Timestamp of the previous broadcast, keeps timestamps monotonic
    last_timestamp: i64,
}

impl Registry {
    /// Forget entries whose connection was released without deregistering
    fn prune(&mut self) {
        let before = self.connections.len();
        self.connections.retain(|entry| entry.strong_count() > 0);

        let pruned = before - self.connections.len();
        if pruned > 0 {
            tracing::debug!(pruned = pruned, "Pruned released connections");
        }
    }

    /// Remove the first entry referring to `connection`
    fn remove(&mut self, connection: &Arc<Connection>) -> bool {
        let target = Arc::as_ptr(connection);
        match self
            .connections
            .iter()
            .position(|entry| std::ptr::eq(entry.as_ptr(), target))
        {
            Some(index) => {
                self.connections.remove(index);
                true
            }
            None => false,
        }
    }

    /// Close connections whose peer disconnected and count the rest
    fn reap_stale(&mut self) -> usize {
        self.prune();

        let mut alive = 0;
        for conn in self.connections.iter().filter_map(Weak::upgrade) {
            if conn.is_cancelled() {
                if conn.close() {
                    tracing::info!(peer = %conn.peer(), "Reaped stale connection");
                }
            } else {
                alive += 1;
            }
        }
        alive
    }

    fn next_timestamp(&mut self) -> i64 {
        let now = unix_nanos_now().max(self.last_timestamp);
        self.last_timestamp = now;
        now
    }
}

/// Subscriber registry and sample fan-out
#[derive(Debug)]
pub struct Broker {
    registry: Mutex<Registry>,
    max_clients: usize,
}

impl Broker {
    /// Create a broker admitting at most `max_clients` live subscribers
    pub fn new(max_clients: usize) -> Self {
        Self {
            registry: Mutex::new(Registry {
                connections: Vec::new(),
                state: BrokerState::Active,
                last_timestamp: 0,
            }),
            max_clients,
        }
    }

    /// Maximum number of live subscribers
    pub fn max_clients(&self) -> usize {
        self.max_clients
    }

    /// Register a connection
    ///
    /// Stale connections are reaped first and do not count against the
    /// limit. Fails if the broker is draining or the limit is reached; the
    /// caller must not serve the subscriber in that case.
    pub async fn add_connection(&self, connection: &Arc<Connection>) -> Result<(), BrokerError> {
        let mut registry = self.registry.lock().await;

        let alive = registry.reap_stale();

        if registry.state == BrokerState::Draining {
            tracing::warn!(peer = %connection.peer(), "Connection rejected: service drained");
            return Err(BrokerError::Draining);
        }

        if alive >= self.max_clients {
            tracing::warn!(
                peer = %connection.peer(),
                max_clients = self.max_clients,
                "Connection rejected: client limit reached"
            );
            return Err(BrokerError::CapacityReached {
                max: self.max_clients,
            });
        }

        connection.initialize_stats();
        registry.connections.push(Arc::downgrade(connection));

        tracing::info!(
            peer = %connection.peer(),
            clients = alive + 1,
            "Connection added"
        );

        Ok(())
    }

    /// Deregister a connection
    ///
    /// Removes the first entry referring to the same connection; does
    /// nothing if it is not registered.
    pub async fn drop_connection(&self, connection: &Arc<Connection>) {
        let mut registry = self.registry.lock().await;

        if registry.remove(connection) {
            tracing::info!(
                peer = %connection.peer(),
                clients = registry.connections.len(),
                "Connection dropped"
            );
        }
    }

    /// Deregister a connection without waiting for the registry lock
    ///
    /// Used when a handler is torn down before it could deregister. If the
    /// lock is busy the entry stays behind and is pruned by the next broker
    /// operation once the connection is released.
    pub(crate) fn release(&self, connection: &Arc<Connection>) {
        if let Ok(mut registry) = self.registry.try_lock() {
            if registry.remove(connection) {
                tracing::info!(peer = %connection.peer(), "Connection released");
            }
        }
    }

    /// Send a packet to every registered connection
    ///
    /// Connections whose peer already disconnected are skipped without a
    /// write and closed. A failed write closes only that connection and
    /// counts an error against it. Returns the number of accepted writes.
    pub async fn broadcast(&self, packet: Bytes, version: SflowVersion) -> usize {
        let mut registry = self.registry.lock().await;
        registry.prune();

        let sample = Sample::new(packet, registry.next_timestamp(), version);
        let mut delivered = 0;

        for conn in registry.connections.iter().filter_map(Weak::upgrade) {
            if conn.is_cancelled() {
                conn.close();
                continue;
            }

            if conn.write(&sample) {
                conn.record_delivery(sample.len());
                delivered += 1;
                tracing::trace!(peer = %conn.peer(), bytes = sample.len(), "Sample sent");
            } else {
                conn.record_error();
                conn.close();
                tracing::warn!(peer = %conn.peer(), "Failed to send sample, closing connection");
            }
        }

        delivered
    }

    /// Stop admitting subscribers and close every registered connection
    ///
    /// Does not wait for handlers to deregister. Irreversible.
    pub async fn drain(&self) {
        let mut registry = self.registry.lock().await;
        registry.state = BrokerState::Draining;

        let mut closed = 0;
        for conn in registry.connections.iter().filter_map(Weak::upgrade) {
            if conn.close() {
                closed += 1;
            }
        }

        tracing::info!(closed = closed, "Broker drained");
    }

    /// Statistics for every live connection, in admission order
    ///
    /// Connections whose peer disconnected are left out. A connection closed
    /// by a failed write stays visible until its handler drops it.
    pub async fn stats(&self) -> Vec<ConnectionStats> {
        let mut registry = self.registry.lock().await;
        registry.prune();
        registry
            .connections
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|conn| !conn.is_cancelled())
            .map(|conn| conn.stats())
            .collect()
    }

    /// Number of registered connections still held by a handler
    pub async fn connection_count(&self) -> usize {
        let mut registry = self.registry.lock().await;
        registry.prune();
        registry.connections.len()
    }

    /// Current lifecycle state
    pub async fn state(&self) -> BrokerState {
        self.registry.lock().await.state
    }

    /// Check if the broker has been drained
    pub async fn is_draining(&self) -> bool {
        self.state().await == BrokerState::Draining
    }
}

impl SampleSender for Broker {
    async fn send_sample_packet(&self, packet: Bytes, version: SflowVersion) {
        self.broadcast(packet, version).await;
    }
}
