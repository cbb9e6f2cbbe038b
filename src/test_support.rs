//! Test doubles shared by unit tests

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::registry::entry::Connection;
use crate::registry::frame::Sample;
use crate::session::stream::SubscriberStream;

#[derive(Debug, Default)]
struct MockInner {
    peer: String,
    reject_writes: AtomicBool,
    cancelled: AtomicBool,
    write_attempts: AtomicUsize,
    metadata_sent: AtomicBool,
    received: Mutex<Vec<Sample>>,
}

/// Scriptable subscriber stream; clones share state
#[derive(Debug, Clone, Default)]
pub(crate) struct MockStream {
    inner: Arc<MockInner>,
}

impl MockStream {
    pub(crate) fn new(peer: &str) -> Self {
        Self {
            inner: Arc::new(MockInner {
                peer: peer.to_string(),
                ..Default::default()
            }),
        }
    }

    /// Make every following write fail
    pub(crate) fn reject_writes(&self) {
        self.inner.reject_writes.store(true, Ordering::SeqCst);
    }

    /// Simulate the remote peer going away
    pub(crate) fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
    }

    pub(crate) fn write_attempts(&self) -> usize {
        self.inner.write_attempts.load(Ordering::SeqCst)
    }

    pub(crate) fn metadata_sent(&self) -> bool {
        self.inner.metadata_sent.load(Ordering::SeqCst)
    }

    pub(crate) fn received(&self) -> Vec<Sample> {
        self.inner.received.lock().unwrap().clone()
    }
}

impl SubscriberStream for MockStream {
    fn write(&self, sample: &Sample) -> bool {
        self.inner.write_attempts.fetch_add(1, Ordering::SeqCst);
        if self.inner.reject_writes.load(Ordering::SeqCst) {
            return false;
        }
        self.inner.received.lock().unwrap().push(sample.clone());
        true
    }

    fn send_initial_metadata(&self) {
        self.inner.metadata_sent.store(true, Ordering::SeqCst);
    }

    fn peer(&self) -> String {
        self.inner.peer.clone()
    }

    fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }
}

/// Connection over a fresh mock stream, plus a handle to that stream
pub(crate) fn mock_connection(peer: &str) -> (Arc<Connection>, MockStream) {
    let stream = MockStream::new(peer);
    let connection = Arc::new(Connection::new(Box::new(stream.clone())));
    (connection, stream)
}
