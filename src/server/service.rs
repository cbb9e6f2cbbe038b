//! Subscribe handler
//!
//! Bridges one inbound subscription to the full lifecycle of a
//! [`Connection`]: create, register, wait until closed, deregister.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::registry::{Broker, BrokerError, Connection};
use crate::session::stream::SubscriberStream;

/// Status code reported to a subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Code {
    /// The call itself was malformed
    InvalidArgument,
    /// The service cannot take the subscriber in its current state
    FailedPrecondition,
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Code::InvalidArgument => write!(f, "INVALID_ARGUMENT"),
            Code::FailedPrecondition => write!(f, "FAILED_PRECONDITION"),
        }
    }
}

/// Error status returned by [`RelayService::subscribe`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct Status {
    /// Status code
    pub code: Code,
    /// Human readable reason
    pub message: String,
}

impl Status {
    /// Create a status
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Malformed call
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(Code::InvalidArgument, message)
    }

    /// Call rejected by the service's current state
    pub fn failed_precondition(message: impl Into<String>) -> Self {
        Self::new(Code::FailedPrecondition, message)
    }
}

impl From<BrokerError> for Status {
    fn from(err: BrokerError) -> Self {
        Status::failed_precondition(err.to_string())
    }
}

/// Registry membership of one served connection
///
/// Deregisters the connection when dropped, so a handler future that is
/// aborted or timed out never leaves its entry behind.
struct Registration<'a> {
    broker: &'a Broker,
    connection: Option<Arc<Connection>>,
}

impl<'a> Registration<'a> {
    fn new(broker: &'a Broker, connection: &Arc<Connection>) -> Self {
        Self {
            broker,
            connection: Some(Arc::clone(connection)),
        }
    }

    async fn deregister(mut self) {
        if let Some(connection) = &self.connection {
            self.broker.drop_connection(connection).await;
        }
        self.connection = None;
    }
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            tracing::debug!(peer = %connection.peer(), "Subscribe handler cancelled");
            self.broker.release(&connection);
        }
    }
}

/// Streaming subscribe endpoint
#[derive(Debug, Clone)]
pub struct RelayService {
    broker: Arc<Broker>,
}

impl RelayService {
    /// Create a service admitting subscribers into `broker`
    pub fn new(broker: Arc<Broker>) -> Self {
        Self { broker }
    }

    /// Broker backing this service
    pub fn broker(&self) -> &Arc<Broker> {
        &self.broker
    }

    /// Serve one subscriber until its stream is closed
    ///
    /// `call` is `None` when the transport supplied no call context. The
    /// future resolves only once the connection is closed by the broker,
    /// after it has been deregistered. Dropping the future early also
    /// deregisters the connection.
    pub async fn subscribe(&self, call: Option<Box<dyn SubscriberStream>>) -> Result<(), Status> {
        let Some(stream) = call else {
            tracing::error!("Subscribe call has no context");
            return Err(Status::invalid_argument("context cannot be empty"));
        };

        let connection = Arc::new(Connection::new(stream));
        self.broker.add_connection(&connection).await?;
        let registration = Registration::new(&self.broker, &connection);

        // Admitted: from here on the subscriber receives every new sample.
        connection.send_initial_metadata();

        connection.wait_until_closed().await;
        registration.deregister().await;

        Ok(())
    }
}
