//! Server session management.
//!
//! One session serves the payload once over one accepted connection:
//! - Session ID assignment
//! - Opening the payload and streaming it
//! - Session lifecycle and outcome

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tokio::net::TcpStream;
use tracing::info;

use crate::core::{CancelToken, PayloadSource, TransferError, TransferResult};
use crate::transport::PayloadSender;

/// Session ID (monotonic per server).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    /// Create a session ID from a raw counter value.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw counter value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// The ID following this one.
    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u64> for SessionId {
    fn from(id: u64) -> Self {
        Self::new(id)
    }
}

/// Outcome of one served session.
#[derive(Debug)]
pub struct SessionReport {
    /// Session ID.
    pub id: SessionId,
    /// Consumer address.
    pub peer: SocketAddr,
    /// Bytes written, or the error that ended the session.
    pub result: TransferResult<u64>,
    /// Time spent serving.
    pub elapsed: Duration,
}

impl SessionReport {
    /// Check if the full payload was sent.
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// Bytes sent, if the session succeeded.
    pub fn bytes_sent(&self) -> Option<u64> {
        self.result.as_ref().ok().copied()
    }
}

/// A single accepted connection being served.
///
/// Owns the stream; dropping the session closes the connection on every
/// exit path.
#[derive(Debug)]
pub struct ServeSession {
    id: SessionId,
    peer: SocketAddr,
    stream: TcpStream,
    created_at: Instant,
}

impl ServeSession {
    /// Wrap an accepted connection.
    pub fn new(id: SessionId, peer: SocketAddr, stream: TcpStream) -> Self {
        Self {
            id,
            peer,
            stream,
            created_at: Instant::now(),
        }
    }

    /// Get the session ID.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Get the consumer address.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Get session age.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Serve the payload once, then close the connection.
    pub async fn serve<S>(
        mut self,
        source: &S,
        sender: PayloadSender,
        cancel: &CancelToken,
    ) -> SessionReport
    where
        S: PayloadSource,
    {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TransferError::Cancelled),
            result = self.send(source, sender) => result,
        };

        SessionReport {
            id: self.id,
            peer: self.peer,
            result,
            elapsed: self.age(),
        }
    }

    async fn send<S>(&mut self, source: &S, sender: PayloadSender) -> TransferResult<u64>
    where
        S: PayloadSource,
    {
        let payload = source.open().await?;
        info!(session = %self.id, peer = %self.peer, len = payload.len(), "sending payload");
        sender.send(&mut self.stream, payload).await
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    use super::*;
    use crate::storage::MemorySource;
    use crate::transport::Framing;

    async fn accepted_pair() -> (ServeSession, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (stream, peer) = listener.accept().await.unwrap();
        (ServeSession::new(SessionId::new(1), peer, stream), client)
    }

    #[test]
    fn test_session_id_sequence() {
        let id = SessionId::new(7);
        assert_eq!(id.next(), SessionId::new(8));
        assert_eq!(id.to_string(), "#7");
        assert_eq!(SessionId::new(u64::MAX).next(), SessionId::new(0));
    }

    #[tokio::test]
    async fn test_serve_writes_payload_and_closes() {
        let (session, mut client) = accepted_pair().await;
        assert_eq!(session.id(), SessionId::new(1));

        let source = MemorySource::new(&b"ABCDEFGHIJ"[..]);
        let report = session
            .serve(
                &source,
                PayloadSender::new(Framing::EndOfStream),
                &CancelToken::new(),
            )
            .await;

        assert!(report.is_success());
        assert_eq!(report.bytes_sent(), Some(10));

        let mut received = Vec::new();
        client.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"ABCDEFGHIJ");
    }

    #[tokio::test]
    async fn test_cancelled_session_fails() {
        let (session, _client) = accepted_pair().await;
        let cancel = CancelToken::new();
        cancel.cancel();

        let report = session
            .serve(
                &MemorySource::new(&b"x"[..]),
                PayloadSender::new(Framing::EndOfStream),
                &cancel,
            )
            .await;
        assert!(matches!(report.result, Err(TransferError::Cancelled)));
    }
}
