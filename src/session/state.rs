//! Connection state machine
//!
//! A subscriber connection moves from `Open` to `Closed` exactly once.
//! Closing wakes every task waiting on the transition; a wait that starts
//! after the close resolves immediately.

use tokio::sync::watch;

/// Subscriber connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Samples may be written to the subscriber
    Open,
    /// The stream is finished; the handler may deregister
    Closed,
}

/// One-way `Open -> Closed` signal
#[derive(Debug)]
pub struct CloseSignal {
    tx: watch::Sender<ConnectionState>,
}

impl CloseSignal {
    /// Create a signal in the `Open` state
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ConnectionState::Open);
        Self { tx }
    }

    /// Current state
    pub fn state(&self) -> ConnectionState {
        *self.tx.borrow()
    }

    /// Check if the signal has been closed
    pub fn is_closed(&self) -> bool {
        self.state() == ConnectionState::Closed
    }

    /// Transition to `Closed` and wake all waiters
    ///
    /// Returns `true` only for the call that performed the transition.
    pub fn close(&self) -> bool {
        self.tx.send_if_modified(|state| match state {
            ConnectionState::Open => {
                *state = ConnectionState::Closed;
                true
            }
            ConnectionState::Closed => false,
        })
    }

    /// Wait until the signal is closed
    pub async fn wait_closed(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so this only returns once closed.
        let _ = rx
            .wait_for(|state| *state == ConnectionState::Closed)
            .await;
    }
}

impl Default for CloseSignal {
    fn default() -> Self {
        Self::new()
    }
}
