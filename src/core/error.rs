//! Error types for FERRY protocol.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors raised by a payload storage collaborator.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The payload location could not be opened for reading or writing.
    #[error("{} unavailable: {source}", path.display())]
    Unavailable {
        /// Path that could not be opened.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// I/O error while reading or writing an open payload.
    #[error("storage i/o error: {0}")]
    Io(#[from] io::Error),
}

impl StorageError {
    /// Wrap an I/O error raised while opening `path`.
    pub fn unavailable(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Unavailable {
            path: path.into(),
            source,
        }
    }
}

/// Errors that fail one transfer session.
///
/// None of these are fatal on their own; the producer and the consumer
/// decide at the session boundary whether to continue.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The producer host did not answer the reachability probe.
    #[error("host unreachable: {0}")]
    UnreachableHost(String),

    /// The producer host is up but nothing is listening on the port.
    #[error("connection refused by {0}")]
    ConnectionRefused(String),

    /// The TCP handshake did not complete in time.
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// A single read stalled beyond the inactivity window.
    #[error("read timed out after {0:?} of inactivity")]
    ReadTimeout(Duration),

    /// A single write stalled beyond the inactivity window.
    #[error("write timed out after {0:?} of inactivity")]
    WriteTimeout(Duration),

    /// The storage collaborator failed.
    #[error("file unavailable: {0}")]
    FileUnavailable(#[from] StorageError),

    /// Byte count differs from the agreed payload length.
    #[error("size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        /// Agreed payload length.
        expected: u64,
        /// Bytes actually transferred.
        actual: u64,
    },

    /// Socket I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// The session was aborted by a cancellation signal.
    #[error("transfer cancelled")]
    Cancelled,
}

impl TransferError {
    /// Check if this error came from the storage collaborator.
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::FileUnavailable(_))
    }

    /// Classify an I/O error raised by a TCP connect to `addr`.
    pub fn from_connect(addr: &str, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionRefused => Self::ConnectionRefused(addr.to_string()),
            io::ErrorKind::HostUnreachable | io::ErrorKind::NetworkUnreachable => {
                Self::UnreachableHost(addr.to_string())
            }
            _ => Self::Io(err),
        }
    }
}

/// Result type for session-level operations.
pub type TransferResult<T> = Result<T, TransferError>;
