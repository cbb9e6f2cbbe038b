//! Broker error types
//!
//! Errors returned when a subscriber cannot be admitted.

use thiserror::Error;

/// Error type for broker admission
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    /// The broker has been drained and accepts no new subscribers
    #[error("no more connections can be added after the service is drained")]
    Draining,
    /// The live subscriber count already reached the configured maximum
    #[error("number of clients exceeds maximum number; service supports at most {max} clients")]
    CapacityReached {
        /// Configured maximum number of subscribers
        max: usize,
    },
}
