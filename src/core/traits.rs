//! Collaborator traits for FERRY.
//!
//! The transfer core never touches the file system or the host liveness
//! check directly; it calls into these traits instead.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::io::AsyncRead;

use super::error::StorageError;

/// A readable payload of known length.
pub struct Payload {
    len: u64,
    reader: Pin<Box<dyn AsyncRead + Send>>,
}

impl Payload {
    /// Wrap a reader that yields exactly `len` bytes.
    pub fn new<R>(len: u64, reader: R) -> Self
    where
        R: AsyncRead + Send + 'static,
    {
        Self {
            len,
            reader: Box::pin(reader),
        }
    }

    /// Announced payload length in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Check if the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Split into length and reader.
    pub fn into_parts(self) -> (u64, Pin<Box<dyn AsyncRead + Send>>) {
        (self.len, self.reader)
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Payload").field("len", &self.len).finish()
    }
}

/// Where the producer obtains the bytes it serves.
///
/// `open` is called once per session, so the length always reflects the
/// stored payload at send time.
pub trait PayloadSource: Send + Sync {
    /// Open the payload for one session.
    fn open(&self) -> impl Future<Output = Result<Payload, StorageError>> + Send;
}

/// Where the consumer persists a received payload.
pub trait PayloadSink: Send + Sync {
    /// Persist a complete payload.
    ///
    /// Only called after the framing reported completion; `bytes` holds
    /// exactly the bytes read.
    fn persist(&self, bytes: &[u8]) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// Drop any output left behind by a failed attempt.
    fn discard(&self) -> impl Future<Output = Result<(), StorageError>> + Send;
}

/// Outcome of one reachability probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reachability {
    /// The host answered.
    Reachable,
    /// The host did not answer within the probe timeout.
    Unreachable,
}

impl Reachability {
    /// Check if the host answered.
    pub fn is_reachable(self) -> bool {
        matches!(self, Self::Reachable)
    }
}

/// Liveness check run before every connect attempt.
pub trait ReachabilityProbe: Send + Sync {
    /// Probe `host` once, giving up after `timeout`.
    fn probe(&self, host: &str, timeout: Duration) -> impl Future<Output = Reachability> + Send;
}
