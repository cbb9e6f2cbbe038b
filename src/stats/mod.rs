//! Statistics for subscriber connections

pub mod metrics;

pub use metrics::{CollectorAddr, ConnectionStats, PeerParseError};
