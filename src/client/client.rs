//! High-level FERRY client API.
//!
//! Provides `FerryClient<P, K>` for fetching the payload from a FERRY
//! producer, polling its host with a `ReachabilityProbe` `P` and persisting
//! the result through a `PayloadSink` `K`.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::core::{
    CancelToken, DEFAULT_CONNECT_TIMEOUT, DEFAULT_HOST, DEFAULT_PAYLOAD_FILE, DEFAULT_POLL_INTERVAL,
    DEFAULT_PORT, DEFAULT_PROBE_TIMEOUT, DEFAULT_READ_TIMEOUT, DEFAULT_RETRY_DELAY, PayloadSink,
    ReachabilityProbe, TransferError, TransferResult,
};
use crate::storage::FileSink;
use crate::transport::{Backoff, Framing, PayloadReceiver, RetryPolicy, TcpProbe};

/// Errors that can occur in the FERRY client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The reachability policy ran out before the host answered.
    #[error("host {host} still unreachable after {polls} probes")]
    Unreachable {
        /// Probed host.
        host: String,
        /// Probes sent.
        polls: u32,
        /// Bytes received by the last failed attempt, 0 if none ran.
        received: u64,
        /// Expected payload size, if configured.
        expected: Option<u64>,
    },

    /// The retry policy ran out before a transfer succeeded.
    #[error("transfer failed after {attempts} attempts ({received} bytes in last attempt): {last}")]
    Exhausted {
        /// Attempts made.
        attempts: u32,
        /// Bytes received by the last attempt.
        received: u64,
        /// Expected payload size, if configured.
        expected: Option<u64>,
        /// Error that ended the last attempt.
        #[source]
        last: TransferError,
    },

    /// The configuration can never produce a transfer.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The fetch was cancelled.
    #[error("fetch cancelled ({received} bytes in last attempt)")]
    Cancelled {
        /// Bytes received by the interrupted or last failed attempt.
        received: u64,
        /// Expected payload size, if configured.
        expected: Option<u64>,
    },
}

impl ClientError {
    /// Partial byte count and expected size of the last attempt.
    ///
    /// `None` when the fetch never got past configuration checks.
    pub fn progress(&self) -> Option<(u64, Option<u64>)> {
        match self {
            Self::Unreachable {
                received, expected, ..
            }
            | Self::Exhausted {
                received, expected, ..
            }
            | Self::Cancelled { received, expected } => Some((*received, *expected)),
            Self::InvalidConfig(_) => None,
        }
    }
}

/// Why waiting for the next attempt stopped.
enum Halt {
    Cancelled,
    Unreachable { polls: u32 },
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Producer host name or address.
    pub host: String,

    /// Producer port.
    pub port: u16,

    /// Where the received payload is persisted.
    pub destination: PathBuf,

    /// Completion signal agreed with the producer.
    pub framing: Framing,

    /// Expected payload size (verification and pre-allocation hint).
    pub expected_size: Option<u64>,

    /// Limit for a single reachability probe.
    pub probe_timeout: Duration,

    /// Limit for a single TCP connect.
    pub connect_timeout: Duration,

    /// Per-read inactivity limit (`None` waits forever).
    pub read_timeout: Option<Duration>,

    /// Probes allowed per attempt; the backoff is the poll interval.
    pub reachability: RetryPolicy,

    /// Transfer attempts allowed.
    pub retry: RetryPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            destination: PathBuf::from(DEFAULT_PAYLOAD_FILE),
            framing: Framing::default(),
            expected_size: None,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: Some(DEFAULT_READ_TIMEOUT),
            reachability: RetryPolicy::unbounded(Backoff::Constant(DEFAULT_POLL_INTERVAL)),
            retry: RetryPolicy::unbounded(Backoff::Constant(DEFAULT_RETRY_DELAY)),
        }
    }
}

impl ClientConfig {
    /// Check that the configuration can produce a transfer.
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.host.is_empty() {
            return Err(ClientError::InvalidConfig("host is empty".into()));
        }
        if self.port == 0 {
            return Err(ClientError::InvalidConfig("port 0 is not connectable".into()));
        }
        if !self.reachability.is_satisfiable() {
            return Err(ClientError::InvalidConfig(
                "reachability policy allows no probes".into(),
            ));
        }
        if !self.retry.is_satisfiable() {
            return Err(ClientError::InvalidConfig(
                "retry policy allows no attempts".into(),
            ));
        }
        if let (Some(fixed), Some(expected)) = (self.framing.fixed_len(), self.expected_size) {
            if fixed != expected {
                return Err(ClientError::InvalidConfig(format!(
                    "expected size {expected} disagrees with framing {}",
                    self.framing
                )));
            }
        }
        Ok(())
    }

    /// `host:port` string to connect to.
    pub fn server_addr(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// Builder for creating a `ClientConfig`.
#[derive(Debug)]
pub struct FerryClientBuilder {
    config: ClientConfig,
}

impl FerryClientBuilder {
    /// Create a new client builder.
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
        }
    }

    /// Set the producer host.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Set the producer port.
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set the destination path.
    pub fn destination(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.destination = path.into();
        self
    }

    /// Set the framing.
    pub fn framing(mut self, framing: Framing) -> Self {
        self.config.framing = framing;
        self
    }

    /// Set the expected payload size.
    pub fn expected_size(mut self, size: Option<u64>) -> Self {
        self.config.expected_size = size;
        self
    }

    /// Set the per-probe timeout.
    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.config.probe_timeout = timeout;
        self
    }

    /// Set the delay between reachability probes.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        let reachability = self.config.reachability;
        self.config.reachability = match reachability.max_attempts() {
            Some(max) => RetryPolicy::bounded(max, Backoff::Constant(interval)),
            None => RetryPolicy::unbounded(Backoff::Constant(interval)),
        };
        self
    }

    /// Set the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the per-read inactivity limit.
    pub fn read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    /// Set the reachability polling policy.
    pub fn reachability(mut self, policy: RetryPolicy) -> Self {
        self.config.reachability = policy;
        self
    }

    /// Set the transfer retry policy.
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = policy;
        self
    }

    /// Build the client configuration.
    pub fn build(self) -> ClientConfig {
        self.config
    }
}

impl Default for FerryClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Where a fetch currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientPhase {
    /// No fetch started.
    Idle,
    /// Waiting for the producer host to answer probes.
    PollingReachability,
    /// Opening the data connection.
    Connecting,
    /// Reading the payload.
    Receiving,
    /// Payload received and persisted.
    Succeeded,
    /// Last attempt failed.
    Failed,
}

/// A failed transfer attempt.
#[derive(Debug)]
pub struct AttemptFailure {
    /// Attempt number (1-based).
    pub attempt: u32,
    /// Bytes received before the failure.
    pub received: u64,
    /// What ended the attempt.
    pub error: TransferError,
}

/// Outcome of a successful fetch.
#[derive(Debug)]
pub struct TransferReport {
    /// Bytes received and persisted.
    pub bytes: u64,
    /// Expected size, if configured.
    pub expected: Option<u64>,
    /// Attempts made, including the successful one.
    pub attempts: u32,
    /// Reachability probes sent across all attempts.
    pub polls: u32,
    /// Wall time of the whole fetch.
    pub elapsed: Duration,
    /// Attempts that failed before the successful one.
    pub failed_attempts: Vec<AttemptFailure>,
}

/// A FERRY consumer.
///
/// # Example
///
/// ```ignore
/// use ferry_protocol::client::{FerryClient, FerryClientBuilder};
///
/// let config = FerryClientBuilder::new()
///     .host("producer.local")
///     .destination("maintenance_data.txt")
///     .expected_size(Some(10))
///     .build();
///
/// let client = FerryClient::new(config);
/// let report = client.fetch().await?;
/// println!("received {} bytes in {} attempts", report.bytes, report.attempts);
/// ```
pub struct FerryClient<P: ReachabilityProbe = TcpProbe, K: PayloadSink = FileSink> {
    /// Client configuration.
    config: ClientConfig,

    /// Host liveness check.
    probe: P,

    /// Where received payloads go.
    sink: K,

    /// Current phase.
    phase: watch::Sender<ClientPhase>,

    /// Cancellation signal.
    cancel: CancelToken,
}

impl FerryClient<TcpProbe, FileSink> {
    /// Create a client that probes the echo port and writes to
    /// `config.destination`.
    pub fn new(config: ClientConfig) -> Self {
        let sink = FileSink::new(config.destination.clone());
        Self::with_parts(config, TcpProbe::new(), sink)
    }
}

impl<P: ReachabilityProbe, K: PayloadSink> FerryClient<P, K> {
    /// Create a client with explicit collaborators.
    pub fn with_parts(config: ClientConfig, probe: P, sink: K) -> Self {
        let (phase, _) = watch::channel(ClientPhase::Idle);
        Self {
            config,
            probe,
            sink,
            phase,
            cancel: CancelToken::new(),
        }
    }

    /// Get the client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Get the current phase.
    pub fn phase(&self) -> ClientPhase {
        *self.phase.borrow()
    }

    /// Subscribe to phase changes.
    pub fn watch_phase(&self) -> watch::Receiver<ClientPhase> {
        self.phase.subscribe()
    }

    /// Token that aborts a running fetch when cancelled.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Fetch the payload, retrying per the configured policies.
    pub async fn fetch(&self) -> Result<TransferReport, ClientError> {
        self.config.validate()?;

        let started = Instant::now();
        let addr = self.config.server_addr();
        let receiver = PayloadReceiver::new(self.config.framing, self.config.expected_size)
            .read_timeout(self.config.read_timeout);
        let mut buf = receiver.allocate();
        let mut attempts = self.config.retry.tracker();
        let mut polls = 0;
        let mut failures: Vec<AttemptFailure> = Vec::new();

        while attempts.should_retry() {
            let last_received = failures.last().map_or(0, |f| f.received);
            self.pause(attempts.next_delay())
                .await
                .map_err(|halt| self.halted(halt, last_received))?;
            let Some(attempt) = attempts.begin() else {
                break;
            };

            polls += self
                .await_reachable()
                .await
                .map_err(|halt| self.halted(halt, last_received))?;

            let outcome = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Err(TransferError::Cancelled),
                result = self.attempt(&addr, &receiver, &mut buf) => result,
            };
            // Not raced against cancellation: the rename may already be
            // running on the blocking pool.
            let result = match outcome {
                Ok(bytes) => self
                    .sink
                    .persist(&buf[..])
                    .await
                    .map(|()| bytes)
                    .map_err(TransferError::from),
                Err(e) => Err(e),
            };

            match result {
                Ok(bytes) => {
                    self.set_phase(ClientPhase::Succeeded);
                    info!(
                        bytes,
                        expected = ?self.config.expected_size,
                        attempts = attempt,
                        "transfer complete"
                    );
                    return Ok(TransferReport {
                        bytes,
                        expected: self.config.expected_size,
                        attempts: attempt,
                        polls,
                        elapsed: started.elapsed(),
                        failed_attempts: failures,
                    });
                }
                Err(error) => {
                    let received = buf.len() as u64;
                    self.set_phase(ClientPhase::Failed);
                    self.discard().await;

                    if matches!(error, TransferError::Cancelled) {
                        return Err(self.halted(Halt::Cancelled, received));
                    }

                    warn!(
                        attempt,
                        received,
                        expected = ?self.config.expected_size,
                        error = %error,
                        "transfer attempt failed"
                    );
                    failures.push(AttemptFailure {
                        attempt,
                        received,
                        error,
                    });
                }
            }
        }

        match failures.pop() {
            Some(last) => Err(ClientError::Exhausted {
                attempts: attempts.attempts(),
                received: last.received,
                expected: self.config.expected_size,
                last: last.error,
            }),
            None => Err(ClientError::InvalidConfig(
                "retry policy allows no attempts".into(),
            )),
        }
    }

    /// One connection: connect and receive into `buf`.
    async fn attempt(
        &self,
        addr: &str,
        receiver: &PayloadReceiver,
        buf: &mut Vec<u8>,
    ) -> TransferResult<u64> {
        buf.clear();
        self.set_phase(ClientPhase::Connecting);
        let mut stream = self.connect(addr).await?;

        self.set_phase(ClientPhase::Receiving);
        receiver.receive(&mut stream, buf).await
    }

    async fn connect(&self, addr: &str) -> TransferResult<TcpStream> {
        let timeout = self.config.connect_timeout;
        match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => {
                info!(%addr, "connected to producer");
                Ok(stream)
            }
            Ok(Err(e)) => Err(TransferError::from_connect(addr, e)),
            Err(_) => Err(TransferError::ConnectTimeout(timeout)),
        }
    }

    /// Probe until the host answers. Returns the number of probes sent.
    async fn await_reachable(&self) -> Result<u32, Halt> {
        self.set_phase(ClientPhase::PollingReachability);
        let host = self.config.host.as_str();
        let mut polls = self.config.reachability.tracker();

        while polls.should_retry() {
            self.pause(polls.next_delay()).await?;
            let Some(poll) = polls.begin() else {
                break;
            };

            let reachability = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(Halt::Cancelled),
                reachability = self.probe.probe(host, self.config.probe_timeout) => reachability,
            };
            debug!(host, poll, ?reachability, "reachability probe");

            if reachability.is_reachable() {
                return Ok(poll);
            }
        }

        Err(Halt::Unreachable {
            polls: polls.attempts(),
        })
    }

    async fn pause(&self, delay: Duration) -> Result<(), Halt> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Halt::Cancelled),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }

    fn halted(&self, halt: Halt, received: u64) -> ClientError {
        let expected = self.config.expected_size;
        match halt {
            Halt::Cancelled => ClientError::Cancelled { received, expected },
            Halt::Unreachable { polls } => ClientError::Unreachable {
                host: self.config.host.clone(),
                polls,
                received,
                expected,
            },
        }
    }

    async fn discard(&self) {
        if let Err(e) = self.sink.discard().await {
            warn!(error = %e, "failed to discard partial output");
        }
    }

    fn set_phase(&self, phase: ClientPhase) {
        let previous = self.phase.send_replace(phase);
        if previous != phase {
            debug!(?previous, ?phase, "client phase");
        }
    }
}
