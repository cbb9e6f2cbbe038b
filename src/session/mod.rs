//! Subscriber session plumbing
//!
//! - Connection lifecycle state (`Open -> Closed`)
//! - The stream capability the broker writes samples through
//! - An in-process channel transport implementing it

pub mod state;
pub mod stream;

pub use state::{CloseSignal, ConnectionState};
pub use stream::{ChannelStream, SubscriberStream, Subscription};
