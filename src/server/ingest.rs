//! UDP ingestion loop
//!
//! Reads sampled datagrams from a loopback UDP socket and hands each one to
//! a [`SampleSender`]. The loop runs until a fatal read error and is never
//! restarted.

use std::future::Future;
use std::io;

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::registry::frame::SflowVersion;

use super::config::RelayConfig;
use super::socket::SocketProvider;

/// Largest datagram read from the socket
pub const MAX_DATAGRAM_SIZE: usize = 4096;

/// Receiver of datagrams read by the ingestion loop
pub trait SampleSender: Send + Sync {
    /// Deliver one sampled packet to subscribers
    fn send_sample_packet(
        &self,
        packet: Bytes,
        version: SflowVersion,
    ) -> impl Future<Output = ()> + Send;
}

/// How a read error affects the loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadError {
    /// Skip this read and try again
    Retryable,
    /// Stop reading permanently
    Fatal,
}

impl ReadError {
    /// Classify an I/O error from a socket read
    pub fn classify(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock => ReadError::Retryable,
            _ => ReadError::Fatal,
        }
    }
}

/// Loop relaying datagrams from one UDP socket
#[derive(Debug)]
pub struct IngestionLoop<P: SocketProvider> {
    config: RelayConfig,
    provider: P,
}

impl<P: SocketProvider> IngestionLoop<P> {
    /// Create a loop reading through `provider`
    pub fn new(config: RelayConfig, provider: P) -> Self {
        Self { config, provider }
    }

    /// Configuration in use
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Socket provider in use
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Bind the socket and relay datagrams until a fatal read error
    ///
    /// Returns `Error::Setup` without reading if the socket cannot be
    /// created or bound, and `Error::Read` once a fatal read error stops
    /// the loop.
    pub async fn run<S: SampleSender>(&self, sink: &S) -> Result<()> {
        tracing::info!(
            port = self.config.udp_port,
            family = ?self.config.address_family,
            "Setting up socket to read packets"
        );
        let socket = self.setup()?;

        let mut buf = [0u8; MAX_DATAGRAM_SIZE];
        tracing::info!("Start reading sample packets");

        let err = loop {
            match self.provider.read(&socket, &mut buf).await {
                Ok(len) => {
                    tracing::debug!(size = len, "Received sample");
                    sink.send_sample_packet(Bytes::copy_from_slice(&buf[..len]), SflowVersion::default())
                        .await;
                }
                Err(e) => match ReadError::classify(&e) {
                    ReadError::Retryable => {
                        tracing::debug!(error = %e, "Read from socket failed with a non fatal error");
                    }
                    ReadError::Fatal => break e,
                },
            }
        };

        tracing::error!(error = %err, "Read from socket failed with a fatal error");
        self.provider.close(socket);
        Err(Error::Read(err))
    }

    fn setup(&self) -> Result<P::Socket> {
        let mut socket = self
            .provider
            .create(self.config.address_family)
            .map_err(|e| {
                tracing::error!(error = %e, "Socket creation failed, cannot relay samples");
                Error::Setup(e)
            })?;

        let addr = self.config.loopback_addr();
        if let Err(e) = self.provider.bind(&mut socket, addr) {
            tracing::error!(addr = %addr, error = %e, "Failed to bind socket, cannot relay samples");
            self.provider.close(socket);
            return Err(Error::Setup(e));
        }

        Ok(socket)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;
    use crate::server::socket::AddressFamily;

    /// Socket whose create/bind/read results are scripted
    #[derive(Default)]
    struct ScriptedSocket {
        fail_create: bool,
        fail_bind: bool,
        reads: Mutex<VecDeque<io::Result<Vec<u8>>>>,
        read_calls: AtomicUsize,
        closes: AtomicUsize,
        bound_to: Mutex<Option<SocketAddr>>,
    }

    impl ScriptedSocket {
        fn with_reads(reads: Vec<io::Result<Vec<u8>>>) -> Self {
            Self {
                reads: Mutex::new(reads.into()),
                ..Default::default()
            }
        }
    }

    impl SocketProvider for ScriptedSocket {
        type Socket = ();

        fn create(&self, _family: AddressFamily) -> io::Result<()> {
            if self.fail_create {
                return Err(io::Error::from(io::ErrorKind::PermissionDenied));
            }
            Ok(())
        }

        fn bind(&self, _socket: &mut (), addr: SocketAddr) -> io::Result<()> {
            if self.fail_bind {
                return Err(io::Error::from(io::ErrorKind::AddrInUse));
            }
            *self.bound_to.lock().unwrap() = Some(addr);
            Ok(())
        }

        async fn read(&self, _socket: &(), buf: &mut [u8]) -> io::Result<usize> {
            self.read_calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(buf.len(), MAX_DATAGRAM_SIZE);
            let next = self
                .reads
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(io::Error::from(io::ErrorKind::BrokenPipe)));
            let data = next?;
            buf[..data.len()].copy_from_slice(&data);
            Ok(data.len())
        }

        fn close(&self, _socket: ()) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct RecordingSender {
        sent: Mutex<Vec<(Bytes, SflowVersion)>>,
    }

    impl SampleSender for RecordingSender {
        async fn send_sample_packet(&self, packet: Bytes, version: SflowVersion) {
            self.sent.lock().unwrap().push((packet, version));
        }
    }

    fn fatal() -> io::Error {
        io::Error::from(io::ErrorKind::InvalidInput)
    }

    fn config() -> RelayConfig {
        RelayConfig::default().udp_port(0)
    }

    #[test]
    fn test_classify() {
        assert_eq!(
            ReadError::classify(&io::Error::from(io::ErrorKind::Interrupted)),
            ReadError::Retryable
        );
        assert_eq!(
            ReadError::classify(&io::Error::from(io::ErrorKind::WouldBlock)),
            ReadError::Retryable
        );
        assert_eq!(ReadError::classify(&fatal()), ReadError::Fatal);
        assert_eq!(
            ReadError::classify(&io::Error::from(io::ErrorKind::ConnectionReset)),
            ReadError::Fatal
        );
    }

    #[tokio::test]
    async fn test_relay_success_then_fatal() {
        let socket = ScriptedSocket::with_reads(vec![Ok(b"X".to_vec()), Err(fatal())]);
        let ingest = IngestionLoop::new(config(), socket);
        let sender = RecordingSender::default();

        let result = ingest.run(&sender).await;

        assert!(matches!(result, Err(Error::Read(_))));
        let sent = sender.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0], (Bytes::from_static(b"X"), SflowVersion::V5));
        assert_eq!(ingest.provider.read_calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            *ingest.provider.bound_to.lock().unwrap(),
            Some(AddressFamily::Inet6.loopback(0))
        );
    }

    #[tokio::test]
    async fn test_zero_length_read_is_forwarded() {
        let socket = ScriptedSocket::with_reads(vec![Ok(Vec::new()), Err(fatal())]);
        let ingest = IngestionLoop::new(config(), socket);
        let sender = RecordingSender::default();

        let _ = ingest.run(&sender).await;

        let sent = sender.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].0.is_empty());
    }

    #[tokio::test]
    async fn test_retryable_error_is_skipped() {
        let socket = ScriptedSocket::with_reads(vec![
            Err(io::Error::from(io::ErrorKind::Interrupted)),
            Err(fatal()),
        ]);
        let ingest = IngestionLoop::new(config(), socket);
        let sender = RecordingSender::default();

        let result = ingest.run(&sender).await;

        assert!(matches!(result, Err(Error::Read(_))));
        assert!(sender.sent.lock().unwrap().is_empty());
        assert_eq!(ingest.provider.read_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_reads_resume_after_would_block() {
        let socket = ScriptedSocket::with_reads(vec![
            Ok(b"first".to_vec()),
            Err(io::Error::from(io::ErrorKind::WouldBlock)),
            Ok(b"second".to_vec()),
            Err(fatal()),
        ]);
        let ingest = IngestionLoop::new(config(), socket);
        let sender = RecordingSender::default();

        let _ = ingest.run(&sender).await;

        let sent: Vec<Bytes> = sender.sent.lock().unwrap().iter().map(|(p, _)| p.clone()).collect();
        assert_eq!(sent, vec![Bytes::from_static(b"first"), Bytes::from_static(b"second")]);
    }

    #[tokio::test]
    async fn test_fatal_error_stops_immediately() {
        let socket = ScriptedSocket::with_reads(vec![Err(fatal()), Ok(b"never".to_vec())]);
        let ingest = IngestionLoop::new(config(), socket);
        let sender = RecordingSender::default();

        let result = ingest.run(&sender).await;

        assert!(matches!(result, Err(Error::Read(_))));
        assert!(sender.sent.lock().unwrap().is_empty());
        assert_eq!(ingest.provider.read_calls.load(Ordering::SeqCst), 1);
        assert_eq!(ingest.provider.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_create_failure_never_reads() {
        let socket = ScriptedSocket {
            fail_create: true,
            ..Default::default()
        };
        let ingest = IngestionLoop::new(config(), socket);
        let sender = RecordingSender::default();

        let result = ingest.run(&sender).await;

        assert!(matches!(result, Err(Error::Setup(_))));
        assert_eq!(ingest.provider.read_calls.load(Ordering::SeqCst), 0);
        assert_eq!(ingest.provider.closes.load(Ordering::SeqCst), 0);
        assert!(ingest.provider.bound_to.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_bind_failure_releases_socket() {
        let socket = ScriptedSocket {
            fail_bind: true,
            ..Default::default()
        };
        let ingest = IngestionLoop::new(config(), socket);
        let sender = RecordingSender::default();

        let result = ingest.run(&sender).await;

        let err = result.unwrap_err();
        assert!(matches!(err, Error::Setup(_)));
        assert_eq!(err.io_error().kind(), io::ErrorKind::AddrInUse);
        assert_eq!(ingest.provider.closes.load(Ordering::SeqCst), 1);
        assert_eq!(ingest.provider.read_calls.load(Ordering::SeqCst), 0);
        assert!(sender.sent.lock().unwrap().is_empty());
    }
}
