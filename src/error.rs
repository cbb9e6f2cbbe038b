//! Crate-level error types

use std::io;

use thiserror::Error;

/// Errors that stop the relay's ingestion loop
#[derive(Debug, Error)]
pub enum Error {
    /// The UDP socket could not be created or bound; no sample was read
    #[error("failed to set up relay socket: {0}")]
    Setup(#[source] io::Error),

    /// A non-retryable error was returned while reading from the socket
    #[error("fatal read error on relay socket: {0}")]
    Read(#[source] io::Error),
}

impl Error {
    /// Underlying I/O error
    pub fn io_error(&self) -> &io::Error {
        match self {
            Error::Setup(e) | Error::Read(e) => e,
        }
    }
}

/// Result alias for relay operations
pub type Result<T> = std::result::Result<T, Error>;
