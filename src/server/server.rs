//! High-level FERRY server API.
//!
//! Provides `FerryServer<S>` for serving the payload of a `PayloadSource`
//! to every consumer that connects, one connection at a time.

use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, info, warn};

use super::session::{ServeSession, SessionId, SessionReport};
use crate::core::{
    ACCEPT_ERROR_BACKOFF, CancelToken, DEFAULT_PAYLOAD_FILE, DEFAULT_PORT, DEFAULT_WRITE_TIMEOUT,
    EVENT_CHANNEL_CAPACITY, PayloadSource, TransferError,
};
use crate::storage::FileSource;
use crate::transport::{Framing, PayloadSender};

/// Errors that can occur in the FERRY server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to address.
    #[error("bind to {addr} failed: {source}")]
    BindFailed {
        /// Address that could not be bound.
        addr: SocketAddr,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A session error the configured policy treats as fatal.
    #[error("fatal session error: {0}")]
    Fatal(#[source] TransferError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// What a failed session does to the accept loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionErrorPolicy {
    /// Log the failure and keep accepting.
    #[default]
    Continue,
    /// Stop the server when the payload cannot be read; other session
    /// errors still only end their own session.
    ShutdownOnFileError,
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,

    /// File served to every consumer.
    pub source_path: PathBuf,

    /// Completion signal agreed with consumers.
    pub framing: Framing,

    /// Per-write inactivity limit (`None` waits forever).
    pub write_timeout: Option<Duration>,

    /// Reaction to failed sessions.
    pub error_policy: SessionErrorPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            source_path: PathBuf::from(DEFAULT_PAYLOAD_FILE),
            framing: Framing::default(),
            write_timeout: Some(DEFAULT_WRITE_TIMEOUT),
            error_policy: SessionErrorPolicy::default(),
        }
    }
}

/// Builder for creating a `ServerConfig`.
#[derive(Debug)]
pub struct FerryServerBuilder {
    config: ServerConfig,
}

impl FerryServerBuilder {
    /// Create a new server builder.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
        }
    }

    /// Set the bind address.
    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.config.bind_addr = addr;
        self
    }

    /// Set the served file.
    pub fn source_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.source_path = path.into();
        self
    }

    /// Set the framing.
    pub fn framing(mut self, framing: Framing) -> Self {
        self.config.framing = framing;
        self
    }

    /// Set the per-write inactivity limit.
    pub fn write_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.write_timeout = timeout;
        self
    }

    /// Set the session error policy.
    pub fn error_policy(mut self, policy: SessionErrorPolicy) -> Self {
        self.config.error_policy = policy;
        self
    }

    /// Build the server configuration.
    pub fn build(self) -> ServerConfig {
        self.config
    }
}

impl Default for FerryServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Event from the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// A consumer connected and its session started.
    SessionStarted {
        /// Session ID.
        id: SessionId,
        /// Consumer address.
        peer: SocketAddr,
    },

    /// The full payload was sent and the connection closed.
    SessionCompleted {
        /// Session ID.
        id: SessionId,
        /// Consumer address.
        peer: SocketAddr,
        /// Bytes sent.
        bytes: u64,
    },

    /// A session ended early.
    SessionFailed {
        /// Session ID.
        id: SessionId,
        /// Consumer address.
        peer: SocketAddr,
        /// Rendered error.
        error: String,
    },

    /// The accept loop ended.
    Stopped,
}

/// Counters for a finished accept loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerSummary {
    /// Sessions that sent the full payload.
    pub completed: u64,
    /// Sessions that ended early.
    pub failed: u64,
}

impl ServerSummary {
    /// Total sessions served.
    pub fn sessions(&self) -> u64 {
        self.completed + self.failed
    }
}

/// A FERRY producer.
///
/// Serves sessions inline on the accept loop: one transfer is in flight at
/// a time, and a consumer that connects meanwhile waits in the listen
/// backlog until the current connection is closed.
///
/// # Example
///
/// ```ignore
/// use ferry_protocol::server::{FerryServer, FerryServerBuilder};
///
/// let config = FerryServerBuilder::new()
///     .bind_addr("0.0.0.0:1337".parse()?)
///     .source_path("maintenance_data.txt")
///     .build();
///
/// let server = FerryServer::bind(config).await?;
/// let shutdown = server.shutdown_token();
/// tokio::spawn(async move {
///     let _ = tokio::signal::ctrl_c().await;
///     shutdown.cancel();
/// });
/// let summary = server.run().await?;
/// ```
pub struct FerryServer<S: PayloadSource = FileSource> {
    /// Server configuration.
    config: ServerConfig,

    /// Listening socket.
    listener: TcpListener,

    /// Where payload bytes come from.
    source: S,

    /// Shutdown signal.
    shutdown: CancelToken,

    /// Event subscriber, if any.
    events: Option<mpsc::Sender<ServerEvent>>,

    /// ID for the next accepted connection.
    next_session: SessionId,

    /// Running counters.
    summary: ServerSummary,

    /// Bound address.
    local_addr: SocketAddr,
}

impl FerryServer<FileSource> {
    /// Bind to the configured address and serve the configured file.
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        let source = FileSource::new(config.source_path.clone());
        Self::with_source(config, source).await
    }
}

impl<S: PayloadSource> FerryServer<S> {
    /// Bind to the configured address and serve `source`.
    pub async fn with_source(config: ServerConfig, source: S) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(config.bind_addr)
            .await
            .map_err(|source| ServerError::BindFailed {
                addr: config.bind_addr,
                source,
            })?;
        let local_addr = listener.local_addr()?;

        info!(addr = %local_addr, framing = %config.framing, "server listening");

        Ok(Self {
            config,
            listener,
            source,
            shutdown: CancelToken::new(),
            events: None,
            next_session: SessionId::new(1),
            summary: ServerSummary::default(),
            local_addr,
        })
    }

    /// Get the local address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Token that stops the server when cancelled.
    ///
    /// Cancelling aborts an in-flight session as well.
    pub fn shutdown_token(&self) -> CancelToken {
        self.shutdown.clone()
    }

    /// Subscribe to server events.
    ///
    /// Replaces any previous subscriber. The server never waits on the
    /// subscriber: at most `EVENT_CHANNEL_CAPACITY` events are buffered and
    /// later ones are dropped until the receiver drains.
    pub fn events(&mut self) -> mpsc::Receiver<ServerEvent> {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        self.events = Some(tx);
        rx
    }

    /// Counters so far.
    pub fn summary(&self) -> ServerSummary {
        self.summary
    }

    /// Run the accept loop until shutdown.
    pub async fn run(mut self) -> Result<ServerSummary, ServerError> {
        let result = loop {
            match self.serve_next().await {
                Ok(Some(_)) => continue,
                Ok(None) => break Ok(self.summary),
                Err(e) => break Err(e),
            }
        };

        match &result {
            Ok(summary) => info!(
                completed = summary.completed,
                failed = summary.failed,
                "server stopped"
            ),
            Err(e) => error!(error = %e, "server stopped"),
        }
        self.emit(ServerEvent::Stopped);
        result
    }

    /// Accept one connection and serve it.
    ///
    /// Returns `Ok(None)` once shutdown is requested. A failed session is
    /// still `Ok(Some(_))` unless the error policy makes it fatal.
    pub async fn serve_next(&mut self) -> Result<Option<SessionReport>, ServerError> {
        let Some(session) = self.accept().await else {
            return Ok(None);
        };
        let (id, peer) = (session.id(), session.peer());

        info!(session = %id, %peer, "accepted connection");
        self.emit(ServerEvent::SessionStarted { id, peer });

        let sender = PayloadSender::new(self.config.framing).write_timeout(self.config.write_timeout);
        let report = session.serve(&self.source, sender, &self.shutdown).await;

        match &report.result {
            Ok(bytes) => {
                self.summary.completed += 1;
                info!(session = %id, %peer, bytes, elapsed = ?report.elapsed, "session completed");
                self.emit(ServerEvent::SessionCompleted {
                    id,
                    peer,
                    bytes: *bytes,
                });
            }
            Err(e) => {
                self.summary.failed += 1;
                warn!(session = %id, %peer, error = %e, "session failed");
                self.emit(ServerEvent::SessionFailed {
                    id,
                    peer,
                    error: e.to_string(),
                });
            }
        }

        let fatal = self.config.error_policy == SessionErrorPolicy::ShutdownOnFileError
            && report.result.as_ref().is_err_and(TransferError::is_storage);
        if fatal {
            if let Err(e) = report.result {
                return Err(ServerError::Fatal(e));
            }
        }

        Ok(Some(report))
    }

    /// Wait for the next connection, or `None` on shutdown.
    async fn accept(&mut self) -> Option<ServeSession> {
        loop {
            let accepted = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return None,
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => {
                    let id = self.next_session;
                    self.next_session = id.next();
                    return Some(ServeSession::new(id, peer, stream));
                }
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    tokio::select! {
                        _ = self.shutdown.cancelled() => return None,
                        _ = tokio::time::sleep(ACCEPT_ERROR_BACKOFF) => {}
                    }
                }
            }
        }
    }

    fn emit(&self, event: ServerEvent) {
        if let Some(tx) = &self.events {
            match tx.try_send(event) {
                Ok(()) | Err(TrySendError::Closed(_)) => {}
                Err(TrySendError::Full(event)) => {
                    debug!(?event, "event dropped, subscriber lagging");
                }
            }
        }
    }
}
