//! Payload read/write loops over a byte stream.
//!
//! Both loops work on any `AsyncRead`/`AsyncWrite`, so the same code drives
//! a `TcpStream` in production and an in-memory duplex in tests. Neither
//! side assumes a single call moves the whole payload.

use std::future::Future;
use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

use super::framing::Framing;
use crate::core::{
    DEFAULT_READ_TIMEOUT, DEFAULT_WRITE_TIMEOUT, LENGTH_PREFIX_SIZE, MAX_PREALLOCATION, Payload,
    READ_CHUNK_SIZE, StorageError, TransferError, TransferResult, WRITE_CHUNK_SIZE,
};

/// Run one I/O call under an optional inactivity limit.
async fn bounded<F, T>(
    limit: Option<Duration>,
    call: F,
    elapsed: fn(Duration) -> TransferError,
) -> TransferResult<T>
where
    F: Future<Output = io::Result<T>>,
{
    match limit {
        Some(limit) => match tokio::time::timeout(limit, call).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(elapsed(limit)),
        },
        None => Ok(call.await?),
    }
}

fn preallocation(hint: u64) -> usize {
    usize::try_from(hint).map_or(MAX_PREALLOCATION, |hint| hint.min(MAX_PREALLOCATION))
}

/// Producer side: writes one payload to a stream.
#[derive(Debug, Clone, Copy)]
pub struct PayloadSender {
    framing: Framing,
    write_timeout: Option<Duration>,
    chunk_size: usize,
}

impl PayloadSender {
    /// Create a sender for the given framing.
    pub fn new(framing: Framing) -> Self {
        Self {
            framing,
            write_timeout: Some(DEFAULT_WRITE_TIMEOUT),
            chunk_size: WRITE_CHUNK_SIZE,
        }
    }

    /// Set the per-write inactivity limit (`None` waits forever).
    pub fn write_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set the number of bytes handed to the stream per write.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    /// Stream `payload` to `writer`, then flush and half-close it.
    ///
    /// Returns the number of payload bytes written, which always equals the
    /// payload's announced length on success.
    pub async fn send<W>(&self, writer: &mut W, payload: Payload) -> TransferResult<u64>
    where
        W: AsyncWrite + Unpin,
    {
        let (len, reader) = payload.into_parts();

        if let Some(agreed) = self.framing.fixed_len() {
            if agreed != len {
                return Err(TransferError::SizeMismatch {
                    expected: agreed,
                    actual: len,
                });
            }
        }

        if let Some(header) = self.framing.encode_header(len) {
            bounded(
                self.write_timeout,
                writer.write_all(&header),
                TransferError::WriteTimeout,
            )
            .await?;
        }

        let mut reader = reader.take(len);
        let mut chunk = vec![0u8; self.chunk_size.min(preallocation(len)).max(1)];
        let mut sent = 0u64;

        loop {
            let n = reader.read(&mut chunk).await.map_err(StorageError::Io)?;
            if n == 0 {
                break;
            }
            bounded(
                self.write_timeout,
                writer.write_all(&chunk[..n]),
                TransferError::WriteTimeout,
            )
            .await?;
            sent += n as u64;
            trace!(sent, total = len, "payload progress");
        }

        if sent != len {
            return Err(TransferError::SizeMismatch {
                expected: len,
                actual: sent,
            });
        }

        bounded(self.write_timeout, writer.flush(), TransferError::WriteTimeout).await?;
        bounded(self.write_timeout, writer.shutdown(), TransferError::WriteTimeout).await?;

        Ok(sent)
    }
}

/// Consumer side: reads one payload from a stream.
#[derive(Debug, Clone, Copy)]
pub struct PayloadReceiver {
    framing: Framing,
    expected: Option<u64>,
    read_timeout: Option<Duration>,
    chunk_size: usize,
}

impl PayloadReceiver {
    /// Create a receiver.
    ///
    /// `expected` is a size hint. With [`Framing::EndOfStream`] it also
    /// bounds the read: one byte past it ends the transfer with a size
    /// mismatch instead of buffering until EOF. Length-prefixed framing
    /// trusts the header instead.
    pub fn new(framing: Framing, expected: Option<u64>) -> Self {
        Self {
            framing,
            expected,
            read_timeout: Some(DEFAULT_READ_TIMEOUT),
            chunk_size: READ_CHUNK_SIZE,
        }
    }

    /// Set the per-read inactivity limit (`None` waits forever).
    pub fn read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set the maximum number of bytes requested per read.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    /// Allocate a destination buffer sized from the size hint.
    pub fn allocate(&self) -> Vec<u8> {
        let hint = self.framing.fixed_len().or(self.expected).unwrap_or(0);
        Vec::with_capacity(preallocation(hint))
    }

    /// Read a complete payload from `reader` into `buf`.
    ///
    /// `buf` is cleared first. On error it keeps the bytes read so far, so
    /// the caller can report the partial count even if this future is
    /// dropped mid-way.
    pub async fn receive<R>(&self, reader: &mut R, buf: &mut Vec<u8>) -> TransferResult<u64>
    where
        R: AsyncRead + Unpin,
    {
        buf.clear();

        let target = match self.framing {
            Framing::EndOfStream => None,
            Framing::FixedSize(n) => Some(n),
            Framing::LengthPrefixed => {
                let mut header = [0u8; LENGTH_PREFIX_SIZE];
                bounded(
                    self.read_timeout,
                    reader.read_exact(&mut header),
                    TransferError::ReadTimeout,
                )
                .await?;
                let len = Framing::decode_header(header);
                debug!(len, "length header received");
                buf.reserve(preallocation(len));
                Some(len)
            }
        };

        // Under EndOfStream, reading one byte past the expected size is
        // enough to prove a mismatch.
        let limit = target.or(self.expected.map(|n| n.saturating_add(1)));

        let mut chunk = vec![0u8; self.chunk_size];
        loop {
            let received = buf.len() as u64;
            let want = match limit {
                Some(limit) => (limit - received).min(chunk.len() as u64) as usize,
                None => chunk.len(),
            };
            if want == 0 {
                break;
            }

            let n = bounded(
                self.read_timeout,
                reader.read(&mut chunk[..want]),
                TransferError::ReadTimeout,
            )
            .await?;
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            trace!(received = buf.len(), "so far read");
        }

        let received = buf.len() as u64;
        if let Some(expected) = target.or(self.expected) {
            if expected != received {
                return Err(TransferError::SizeMismatch {
                    expected,
                    actual: received,
                });
            }
        }

        Ok(received)
    }
}
