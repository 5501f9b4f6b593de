//! Connection lifecycle to the remote display peripheral.
//!
//! The peripheral speaks Bluetooth Serial Port Profile; on a dev host the
//! byte stream is reached through an RFCOMM/TCP bridge, so the concrete
//! transport here is TCP behind a `Transport` seam that tests (and other
//! backends) plug into.

use std::future::Future;
use std::io;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::sleep;

/// Serial Port Profile service identifier the peripheral advertises.
pub const SPP_SERVICE_UUID: &str = "00001101-0000-1000-8000-00805F9B34FB";

/// Link failures surfaced to callers. Individual I/O errors during a
/// retry sequence are absorbed; only the exhausted sequence comes out.
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("all {attempts} connection attempts failed")]
    AttemptsExhausted { attempts: u32 },
    #[error("no previously used address to reconnect to")]
    NoPriorAddress,
    #[error("link lost: reconnect exhausted during transmission")]
    TransmissionExhausted,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

impl LinkState {
    /// Status wording for user-facing surfaces.
    pub fn describe(&self) -> &'static str {
        match self {
            LinkState::Disconnected => "disconnected",
            LinkState::Connecting => "connecting",
            LinkState::Connected => "connected",
            LinkState::Failed => "lost",
        }
    }
}

/// Opens the byte stream to a peripheral address.
pub trait Transport {
    type Stream: AsyncWrite + Unpin + Send;

    fn connect(&self, address: &str) -> impl Future<Output = io::Result<Self::Stream>> + Send;
}

/// Byte stream over TCP (RFCOMM bridge on a dev host).
pub struct TcpTransport;

impl Transport for TcpTransport {
    type Stream = TcpStream;

    fn connect(&self, address: &str) -> impl Future<Output = io::Result<TcpStream>> + Send {
        let address = address.to_string();
        async move { TcpStream::connect(address).await }
    }
}

/// Owns the connection lifecycle to one peripheral: connect, send,
/// failure detection, disconnect, reconnect.
///
/// Callers that share a session across tasks must serialize access to it
/// (an `Arc<tokio::sync::Mutex<_>>` in this crate); no two operations may
/// touch the stream concurrently.
pub struct LinkSession<T: Transport> {
    transport: T,
    state: LinkState,
    stream: Option<T::Stream>,
    last_address: Option<String>,
    retry_delay: Duration,
    last_error: Option<String>,
}

impl<T: Transport> LinkSession<T> {
    pub fn new(transport: T, retry_delay: Duration) -> Self {
        LinkSession {
            transport,
            state: LinkState::Disconnected,
            stream: None,
            last_address: None,
            retry_delay,
            last_error: None,
        }
    }

    /// Attempt up to `max(retries, 1)` sequential connections to
    /// `address`, waiting `retry_delay` between failures (not after the
    /// last). Success lands in `Connected`; exhaustion lands in `Failed`
    /// and the caller may try again later.
    pub async fn connect(&mut self, address: &str, retries: u32) -> Result<(), LinkError> {
        self.release_stream();
        self.state = LinkState::Connecting;

        let attempts = retries.max(1);
        for attempt in 1..=attempts {
            match self.transport.connect(address).await {
                Ok(stream) => {
                    self.stream = Some(stream);
                    self.state = LinkState::Connected;
                    self.last_address = Some(address.to_string());
                    self.last_error = None;
                    log::info!("connected to {} (attempt {}/{})", address, attempt, attempts);
                    return Ok(());
                }
                Err(e) => {
                    log::warn!(
                        "connect to {} failed (attempt {}/{}): {}",
                        address,
                        attempt,
                        attempts,
                        e
                    );
                    self.last_error = Some(e.to_string());
                    self.release_stream();
                    if attempt < attempts {
                        sleep(self.retry_delay).await;
                    }
                }
            }
        }

        self.state = LinkState::Failed;
        Err(LinkError::AttemptsExhausted { attempts })
    }

    /// Re-run `connect` against the last successfully used address.
    /// No side effect when there is none.
    pub async fn reconnect(&mut self, retries: u32) -> Result<(), LinkError> {
        let address = self
            .last_address
            .clone()
            .ok_or(LinkError::NoPriorAddress)?;
        self.connect(&address, retries).await
    }

    /// Write one payload. `false` without touching I/O when not
    /// connected. A write error tears the session down to `Disconnected`
    /// and returns `false`; the caller decides whether to reconnect.
    pub async fn send(&mut self, payload: &[u8]) -> bool {
        if self.state != LinkState::Connected {
            log::warn!("send skipped, link is {}", self.state.describe());
            return false;
        }
        let Some(stream) = self.stream.as_mut() else {
            return false;
        };

        let result = async {
            stream.write_all(payload).await?;
            stream.flush().await
        }
        .await;

        match result {
            Ok(()) => true,
            Err(e) => {
                log::error!("send failed, tearing link down: {}", e);
                self.last_error = Some(e.to_string());
                self.release_stream();
                self.state = LinkState::Disconnected;
                false
            }
        }
    }

    /// Idempotent; releases the stream on all paths.
    pub fn disconnect(&mut self) {
        self.release_stream();
        self.state = LinkState::Disconnected;
        log::debug!("link disconnected");
    }

    /// Current state only; never probes the peer.
    pub fn is_connected(&self) -> bool {
        self.state == LinkState::Connected
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Message from the most recent failure, for status surfaces.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn release_stream(&mut self) {
        // Dropping the stream closes the underlying socket.
        self.stream = None;
    }
}
