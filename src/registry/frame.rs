//! Sample types broadcast to subscribers
//!
//! A [`Sample`] is built once per broadcast and shared read-only by every
//! subscriber that receives it.

use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;

/// sFlow datagram encoding version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SflowVersion {
    /// Version not reported
    Unspecified,
    /// sFlow version 5
    #[default]
    V5,
}

/// sFlow-specific sample metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SflowMetadata {
    /// Encoding version of the sampled datagram
    pub version: SflowVersion,
}

/// One telemetry record delivered to subscribers
///
/// Cheap to clone: the packet is reference counted via `Bytes`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    /// Raw datagram as read from the socket
    pub packet: Bytes,
    /// Broadcast time in nanoseconds since the unix epoch
    pub timestamp: i64,
    /// sFlow metadata
    pub sflow_metadata: SflowMetadata,
}

impl Sample {
    /// Create a sample with an explicit timestamp
    pub fn new(packet: Bytes, timestamp: i64, version: SflowVersion) -> Self {
        Self {
            packet,
            timestamp,
            sflow_metadata: SflowMetadata { version },
        }
    }

    /// Size of the sampled packet in bytes
    pub fn len(&self) -> usize {
        self.packet.len()
    }

    /// Whether the sampled packet is empty
    pub fn is_empty(&self) -> bool {
        self.packet.is_empty()
    }

    /// Encoding version of the sampled datagram
    pub fn version(&self) -> SflowVersion {
        self.sflow_metadata.version
    }
}

/// Current wall-clock time in unix nanoseconds
///
/// Saturates at 0 for clocks set before the epoch.
pub(crate) fn unix_nanos_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
