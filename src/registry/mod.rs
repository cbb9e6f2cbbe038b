//! Subscriber registry and sample fan-out
//!
//! The broker admits subscribers, fans samples out to them, reaps stale
//! ones and drains them on shutdown.
//!
//! # Architecture
//!
//! ```text
//!                 Arc<Broker>
//!         ┌─────────────────────────────┐
//!         │ Mutex<Registry {            │
//!         │   connections: Vec<Weak<_>>,│
//!         │   state: Active | Draining, │
//!         │ }>                          │
//!         └──────────────┬──────────────┘
//!                        │ broadcast()
//!         ┌──────────────┼──────────────┐
//!         ▼              ▼              ▼
//!   Arc<Connection> Arc<Connection> Arc<Connection>
//!   (held by its    (held by its    (held by its
//!    handler)        handler)        handler)
//! ```
//!
//! # Zero-Copy Design
//!
//! A broadcast builds one [`Sample`] whose packet is a `bytes::Bytes`, so
//! every subscriber shares the same allocation.

pub mod entry;
pub mod error;
pub mod frame;
pub mod store;

pub use entry::Connection;
pub use error::BrokerError;
pub use frame::{Sample, SflowMetadata, SflowVersion};
pub use store::{Broker, BrokerState};
