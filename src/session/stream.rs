//! Subscriber stream capability
//!
//! The broker never talks to a transport directly. Each subscriber is
//! reached through a [`SubscriberStream`], which only needs to accept a
//! sample, report the remote peer, and report whether the peer has gone.
//!
//! [`ChannelStream`] is the in-process transport: a bounded channel whose
//! receiving half ([`Subscription`]) is handed to whoever serves the
//! subscriber. Writes never wait; a full buffer counts as a failed write.

use tokio::sync::{mpsc, watch};

use crate::registry::frame::Sample;

/// Write side of one subscriber's sample stream
pub trait SubscriberStream: Send + Sync {
    /// Write one sample. Returns `true` if the transport accepted it.
    fn write(&self, sample: &Sample) -> bool;

    /// Tell the subscriber that streaming has begun
    fn send_initial_metadata(&self);

    /// Transport-level identity of the remote peer (e.g. `ipv4:10.0.0.5:6343`)
    fn peer(&self) -> String;

    /// Whether the remote peer has disconnected. Must not block.
    fn is_cancelled(&self) -> bool;
}

/// Subscriber stream backed by a bounded tokio channel
#[derive(Debug)]
pub struct ChannelStream {
    peer: String,
    tx: mpsc::Sender<Sample>,
    started: watch::Sender<bool>,
}

impl ChannelStream {
    /// Create a stream holding at most `buffer` undelivered samples
    ///
    /// Returns the write half and the subscriber's receive half.
    pub fn new(peer: impl Into<String>, buffer: usize) -> (Self, Subscription) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let (started, started_rx) = watch::channel(false);

        let stream = Self {
            peer: peer.into(),
            tx,
            started,
        };

        let subscription = Subscription {
            rx,
            started: started_rx,
        };

        (stream, subscription)
    }
}

impl SubscriberStream for ChannelStream {
    fn write(&self, sample: &Sample) -> bool {
        match self.tx.try_send(sample.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::debug!(peer = %self.peer, "Subscriber buffer full");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    fn send_initial_metadata(&self) {
        self.started.send_replace(true);
    }

    fn peer(&self) -> String {
        self.peer.clone()
    }

    fn is_cancelled(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receive half of a [`ChannelStream`]
///
/// Dropping it cancels the subscription.
#[derive(Debug)]
pub struct Subscription {
    rx: mpsc::Receiver<Sample>,
    started: watch::Receiver<bool>,
}

impl Subscription {
    /// Wait until the server has admitted the subscriber
    ///
    /// Returns `false` if the server side went away without admitting it.
    pub async fn started(&mut self) -> bool {
        self.started.wait_for(|started| *started).await.is_ok()
    }

    /// Check whether the server has admitted the subscriber
    pub fn is_started(&self) -> bool {
        *self.started.borrow()
    }

    /// Receive the next sample
    ///
    /// Returns `None` once the server has closed the stream and every
    /// buffered sample was consumed.
    pub async fn recv(&mut self) -> Option<Sample> {
        self.rx.recv().await
    }

    /// Receive a buffered sample without waiting
    pub fn try_recv(&mut self) -> Option<Sample> {
        self.rx.try_recv().ok()
    }

    /// Cancel the subscription, keeping already buffered samples readable
    pub fn cancel(&mut self) {
        self.rx.close();
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::registry::frame::SflowVersion;

    fn sample(data: &'static [u8]) -> Sample {
        Sample::new(Bytes::from_static(data), 1, SflowVersion::V5)
    }

    #[tokio::test]
    async fn test_write_and_receive() {
        let (stream, mut subscription) = ChannelStream::new("ipv4:127.0.0.1:9000", 4);

        assert_eq!(stream.peer(), "ipv4:127.0.0.1:9000");
        assert!(stream.write(&sample(b"abc")));

        let received = subscription.recv().await.unwrap();
        assert_eq!(received.packet, Bytes::from_static(b"abc"));
    }

    #[tokio::test]
    async fn test_full_buffer_rejects_write() {
        let (stream, mut subscription) = ChannelStream::new("peer", 1);

        assert!(stream.write(&sample(b"1")));
        assert!(!stream.write(&sample(b"2")));
        assert!(!stream.is_cancelled());

        assert_eq!(subscription.try_recv().unwrap().packet, Bytes::from_static(b"1"));
        assert!(subscription.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_dropped_subscription_cancels() {
        let (stream, subscription) = ChannelStream::new("peer", 4);
        assert!(!stream.is_cancelled());

        drop(subscription);

        assert!(stream.is_cancelled());
        assert!(!stream.write(&sample(b"x")));
    }

    #[tokio::test]
    async fn test_cancel_keeps_buffered_samples() {
        let (stream, mut subscription) = ChannelStream::new("peer", 4);
        assert!(stream.write(&sample(b"kept")));

        subscription.cancel();

        assert!(stream.is_cancelled());
        assert_eq!(subscription.recv().await.unwrap().packet, Bytes::from_static(b"kept"));
        assert!(subscription.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_initial_metadata() {
        let (stream, mut subscription) = ChannelStream::new("peer", 4);
        assert!(!subscription.is_started());

        stream.send_initial_metadata();

        assert!(subscription.started().await);
        assert!(subscription.is_started());
    }

    #[tokio::test]
    async fn test_started_false_when_server_gone() {
        let (stream, mut subscription) = ChannelStream::new("peer", 4);
        drop(stream);

        assert!(!subscription.started().await);
        assert!(subscription.recv().await.is_none());
    }
}
