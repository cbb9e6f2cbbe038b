//! Relay server
//!
//! Wires the ingestion loop to the broker and exposes the subscribe
//! service sharing that broker.

use std::future::Future;
use std::sync::Arc;

use crate::error::Result;
use crate::registry::Broker;
use crate::server::config::RelayConfig;
use crate::server::ingest::IngestionLoop;
use crate::server::service::RelayService;
use crate::server::socket::{SocketProvider, UdpSocketProvider};

/// gNPSI relay server
pub struct RelayServer<P: SocketProvider = UdpSocketProvider> {
    config: RelayConfig,
    broker: Arc<Broker>,
    ingest: IngestionLoop<P>,
}

impl RelayServer<UdpSocketProvider> {
    /// Create a new server reading from a real UDP socket
    pub fn new(config: RelayConfig) -> Self {
        Self::with_socket_provider(config, UdpSocketProvider)
    }
}

impl<P: SocketProvider> RelayServer<P> {
    /// Create a new server reading through a custom socket provider
    pub fn with_socket_provider(config: RelayConfig, provider: P) -> Self {
        Self {
            broker: Arc::new(Broker::new(config.max_clients)),
            ingest: IngestionLoop::new(config.clone(), provider),
            config,
        }
    }

    /// Get the server configuration
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Get a reference to the broker
    pub fn broker(&self) -> &Arc<Broker> {
        &self.broker
    }

    /// Subscribe service sharing this server's broker
    pub fn service(&self) -> RelayService {
        RelayService::new(Arc::clone(&self.broker))
    }

    /// Run the server
    ///
    /// Relays samples until the ingestion loop fails. Subscribers stay
    /// connected after a failure but receive nothing more.
    pub async fn run(&self) -> Result<()> {
        let result = self.ingest.run(self.broker.as_ref()).await;
        if let Err(ref e) = result {
            tracing::error!(error = %e, "Relay stopped, no further samples will be delivered");
        }
        result
    }

    /// Run the server with graceful shutdown
    ///
    /// When `shutdown` completes the broker is drained: every subscriber is
    /// closed and new ones are rejected.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received, draining subscribers");
                self.broker.drain().await;
                Ok(())
            }
            result = self.run() => result,
        }
    }
}
