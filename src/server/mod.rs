//! Relay server
//!
//! - UDP socket capability and its tokio implementation
//! - Ingestion loop feeding the broker
//! - Subscribe service
//! - Server wiring with graceful shutdown

pub mod config;
pub mod ingest;
pub mod listener;
pub mod service;
pub mod socket;

pub use config::RelayConfig;
pub use ingest::{IngestionLoop, ReadError, SampleSender, MAX_DATAGRAM_SIZE};
pub use listener::RelayServer;
pub use service::{Code, RelayService, Status};
pub use socket::{AddressFamily, SocketProvider, UdpHandle, UdpSocketProvider};
