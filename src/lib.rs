//! gNPSI sample relay
//!
//! Relays sampled-packet telemetry (sFlow datagrams) read from a local UDP
//! socket to any number of streaming subscribers.
//!
//! # Architecture
//!
//! ```text
//!   UDP datagram
//!        │
//!        ▼
//!   IngestionLoop ──► Broker::broadcast ──► Connection::write ──► subscriber
//!                          │
//!                  Mutex<Vec<Weak<Connection>>>
//!                          ▲
//!   RelayService::subscribe ── add_connection / wait_until_closed / drop_connection
//! ```
//!
//! One lock serializes admission, fan-out and drain. A failing subscriber is
//! closed in place and never delays delivery to the others.
//!
//! # Example
//!
//! ```no_run
//! use gnpsi_relay::{ChannelStream, RelayConfig, RelayServer};
//!
//! # async fn example() -> gnpsi_relay::Result<()> {
//! let server = RelayServer::new(RelayConfig::default().udp_port(6343).max_clients(4));
//!
//! let service = server.service();
//! let (stream, mut subscription) = ChannelStream::new("ipv4:10.0.0.5:6343", 64);
//! tokio::spawn(async move { service.subscribe(Some(Box::new(stream))).await });
//! tokio::spawn(async move {
//!     while let Some(sample) = subscription.recv().await {
//!         println!("{} bytes", sample.packet.len());
//!     }
//! });
//!
//! server.run_until(async { let _ = tokio::signal::ctrl_c().await; }).await
//! # }
//! ```

pub mod error;
pub mod registry;
pub mod server;
pub mod session;
pub mod stats;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{Error, Result};
pub use registry::{Broker, BrokerError, Connection, Sample, SflowMetadata, SflowVersion};
pub use server::{
    AddressFamily, Code, IngestionLoop, RelayConfig, RelayServer, RelayService, SampleSender,
    SocketProvider, Status, UdpSocketProvider,
};
pub use session::{ChannelStream, ConnectionState, Subscription, SubscriberStream};
pub use stats::{CollectorAddr, ConnectionStats, PeerParseError};
