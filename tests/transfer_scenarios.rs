//! End-to-end transfers over loopback TCP.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use ferry_protocol::client::{ClientConfig, ClientError, FerryClient, FerryClientBuilder};
use ferry_protocol::core::{CancelToken, Reachability, ReachabilityProbe, TransferError};
use ferry_protocol::server::{
    FerryServer, FerryServerBuilder, ServerConfig, ServerError, ServerEvent, ServerSummary,
    SessionErrorPolicy,
};
use ferry_protocol::storage::FileSink;
use ferry_protocol::transport::{AssumeReachable, Backoff, Framing, RetryPolicy};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const PAYLOAD: &[u8] = b"ABCDEFGHIJ";

struct RunningServer {
    addr: SocketAddr,
    shutdown: CancelToken,
    events: mpsc::Receiver<ServerEvent>,
    handle: JoinHandle<Result<ServerSummary, ServerError>>,
}

impl RunningServer {
    async fn stop(self) -> Result<ServerSummary, ServerError> {
        self.shutdown.cancel();
        self.handle.await.unwrap()
    }

    async fn stop_with_events(mut self) -> (ServerSummary, Vec<ServerEvent>) {
        self.shutdown.cancel();
        let summary = self.handle.await.unwrap().unwrap();
        let mut events = Vec::new();
        while let Some(event) = self.events.recv().await {
            events.push(event);
        }
        (summary, events)
    }
}

async fn start_server(source: &Path, framing: Framing, policy: SessionErrorPolicy) -> RunningServer {
    let config: ServerConfig = FerryServerBuilder::new()
        .bind_addr("127.0.0.1:0".parse().unwrap())
        .source_path(source)
        .framing(framing)
        .error_policy(policy)
        .build();

    let mut server = FerryServer::bind(config).await.unwrap();
    let events = server.events();
    RunningServer {
        addr: server.local_addr(),
        shutdown: server.shutdown_token(),
        events,
        handle: tokio::spawn(server.run()),
    }
}

fn client_config(addr: SocketAddr, destination: &Path) -> FerryClientBuilder {
    FerryClientBuilder::new()
        .host("127.0.0.1")
        .port(addr.port())
        .destination(destination)
        .poll_interval(Duration::from_millis(10))
        .retry(RetryPolicy::bounded(3, Backoff::None))
}

fn fetcher(config: ClientConfig) -> FerryClient<AssumeReachable, FileSink> {
    let sink = FileSink::new(config.destination.clone());
    FerryClient::with_parts(config, AssumeReachable, sink)
}

/// Reports unreachable for the first `down` probes.
#[derive(Clone)]
struct ScriptedProbe {
    down: u32,
    calls: Arc<AtomicU32>,
}

impl ReachabilityProbe for ScriptedProbe {
    async fn probe(&self, _host: &str, _timeout: Duration) -> Reachability {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call > self.down {
            Reachability::Reachable
        } else {
            Reachability::Unreachable
        }
    }
}

/// Serves one canned byte string per accepted connection, then stops.
async fn scripted_producer(responses: Vec<&'static [u8]>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        for response in responses {
            let (mut stream, _) = listener.accept().await.unwrap();
            stream.write_all(response).await.unwrap();
            stream.shutdown().await.unwrap();
        }
    });
    addr
}

#[tokio::test]
async fn test_happy_path() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("maintenance_data.txt");
    let destination = dir.path().join("received.txt");
    tokio::fs::write(&source, PAYLOAD).await.unwrap();

    let server = start_server(&source, Framing::EndOfStream, SessionErrorPolicy::Continue).await;
    let client = fetcher(client_config(server.addr, &destination).build());

    let report = client.fetch().await.unwrap();
    assert_eq!(report.bytes, 10);
    assert_eq!(report.attempts, 1);
    assert_eq!(tokio::fs::read(&destination).await.unwrap(), PAYLOAD);
    assert!(!dir.path().join("received.txt.part").exists());

    let summary = server.stop().await.unwrap();
    assert_eq!(summary, ServerSummary { completed: 1, failed: 0 });
}

#[tokio::test]
async fn test_waits_for_producer_to_become_reachable() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("maintenance_data.txt");
    let destination = dir.path().join("received.txt");
    tokio::fs::write(&source, PAYLOAD).await.unwrap();

    let server = start_server(&source, Framing::EndOfStream, SessionErrorPolicy::Continue).await;
    let probe = ScriptedProbe {
        down: 3,
        calls: Arc::new(AtomicU32::new(0)),
    };
    let config = client_config(server.addr, &destination).build();
    let sink = FileSink::new(config.destination.clone());
    let client = FerryClient::with_parts(config, probe.clone(), sink);

    let report = client.fetch().await.unwrap();
    assert_eq!(probe.calls.load(Ordering::SeqCst), 4);
    assert_eq!(report.polls, 4);
    assert_eq!(report.attempts, 1);
    assert_eq!(tokio::fs::read(&destination).await.unwrap(), PAYLOAD);

    let (summary, events) = server.stop_with_events().await;
    assert_eq!(summary, ServerSummary { completed: 1, failed: 0 });
    let accepted = events
        .iter()
        .filter(|event| matches!(event, ServerEvent::SessionStarted { .. }))
        .count();
    assert_eq!(accepted, 1);
}

#[tokio::test]
async fn test_mid_transfer_disconnect_is_retried() {
    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("received.txt");
    let addr = scripted_producer(vec![&b"ABCD"[..], PAYLOAD]).await;

    let client = fetcher(
        client_config(addr, &destination)
            .expected_size(Some(10))
            .build(),
    );

    let report = client.fetch().await.unwrap();
    assert_eq!(report.attempts, 2);
    assert_eq!(report.failed_attempts.len(), 1);
    assert_eq!(report.failed_attempts[0].received, 4);
    assert!(matches!(
        report.failed_attempts[0].error,
        TransferError::SizeMismatch {
            expected: 10,
            actual: 4
        }
    ));
    assert_eq!(tokio::fs::read(&destination).await.unwrap(), PAYLOAD);
}

#[tokio::test]
async fn test_failed_attempt_leaves_no_output() {
    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("received.txt");
    let addr = scripted_producer(vec![&b"ABCD"[..]]).await;

    let client = fetcher(
        client_config(addr, &destination)
            .expected_size(Some(10))
            .retry(RetryPolicy::bounded(1, Backoff::None))
            .build(),
    );

    let err = client.fetch().await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::Exhausted {
            attempts: 1,
            received: 4,
            expected: Some(10),
            ..
        }
    ));
    assert!(!destination.exists());
    assert!(!dir.path().join("received.txt.part").exists());
}

#[tokio::test]
async fn test_sequential_clients_each_get_full_payload() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("maintenance_data.txt");
    tokio::fs::write(&source, PAYLOAD).await.unwrap();

    let mut server =
        start_server(&source, Framing::EndOfStream, SessionErrorPolicy::Continue).await;

    let first = fetcher(client_config(server.addr, &dir.path().join("a.txt")).build());
    let second = fetcher(client_config(server.addr, &dir.path().join("b.txt")).build());
    let (a, b) = tokio::join!(first.fetch(), second.fetch());
    assert_eq!(a.unwrap().bytes, 10);
    assert_eq!(b.unwrap().bytes, 10);

    // Sessions never overlap: each start is followed by its own completion.
    let mut order = Vec::new();
    for _ in 0..4 {
        match server.events.recv().await.unwrap() {
            ServerEvent::SessionStarted { id, .. } => order.push(("start", id.as_u64())),
            ServerEvent::SessionCompleted { id, .. } => order.push(("done", id.as_u64())),
            other => panic!("unexpected event: {other:?}"),
        }
    }
    assert_eq!(order, [("start", 1), ("done", 1), ("start", 2), ("done", 2)]);

    assert_eq!(tokio::fs::read(dir.path().join("a.txt")).await.unwrap(), PAYLOAD);
    assert_eq!(tokio::fs::read(dir.path().join("b.txt")).await.unwrap(), PAYLOAD);
    assert_eq!(server.stop().await.unwrap().completed, 2);
}

#[tokio::test]
async fn test_producer_survives_missing_source() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("maintenance_data.txt");
    let destination = dir.path().join("received.txt");

    let server = start_server(&source, Framing::EndOfStream, SessionErrorPolicy::Continue).await;
    let config = client_config(server.addr, &destination)
        .expected_size(Some(10))
        .retry(RetryPolicy::bounded(1, Backoff::None))
        .build();

    let err = fetcher(config.clone()).fetch().await.unwrap_err();
    assert!(matches!(err, ClientError::Exhausted { received: 0, .. }));

    tokio::fs::write(&source, PAYLOAD).await.unwrap();
    let report = fetcher(config).fetch().await.unwrap();
    assert_eq!(report.bytes, 10);

    let summary = server.stop().await.unwrap();
    assert_eq!(summary, ServerSummary { completed: 1, failed: 1 });
}

#[tokio::test]
async fn test_missing_source_stops_producer_when_configured() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("maintenance_data.txt");
    let destination = dir.path().join("received.txt");

    let server = start_server(
        &source,
        Framing::EndOfStream,
        SessionErrorPolicy::ShutdownOnFileError,
    )
    .await;
    let client = fetcher(
        client_config(server.addr, &destination)
            .expected_size(Some(10))
            .retry(RetryPolicy::bounded(1, Backoff::None))
            .build(),
    );

    assert!(client.fetch().await.is_err());
    let err = server.handle.await.unwrap().unwrap_err();
    assert!(matches!(
        err,
        ServerError::Fatal(TransferError::FileUnavailable(_))
    ));
}

#[tokio::test]
async fn test_length_prefixed_framing() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("maintenance_data.txt");
    let destination = dir.path().join("received.txt");
    tokio::fs::write(&source, PAYLOAD).await.unwrap();

    let server =
        start_server(&source, Framing::LengthPrefixed, SessionErrorPolicy::Continue).await;
    let client = fetcher(
        client_config(server.addr, &destination)
            .framing(Framing::LengthPrefixed)
            .build(),
    );

    assert_eq!(client.fetch().await.unwrap().bytes, 10);
    assert_eq!(tokio::fs::read(&destination).await.unwrap(), PAYLOAD);
    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_fixed_size_framing() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("maintenance_data.txt");
    let destination = dir.path().join("received.txt");
    tokio::fs::write(&source, PAYLOAD).await.unwrap();

    let server = start_server(&source, Framing::FixedSize(10), SessionErrorPolicy::Continue).await;
    let client = fetcher(
        client_config(server.addr, &destination)
            .framing(Framing::FixedSize(10))
            .build(),
    );

    assert_eq!(client.fetch().await.unwrap().bytes, 10);
    assert_eq!(tokio::fs::read(&destination).await.unwrap(), PAYLOAD);
    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_fixed_size_disagreement_fails_session() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("maintenance_data.txt");
    let destination = dir.path().join("received.txt");
    tokio::fs::write(&source, b"short").await.unwrap();

    let server = start_server(&source, Framing::FixedSize(10), SessionErrorPolicy::Continue).await;
    let client = fetcher(
        client_config(server.addr, &destination)
            .framing(Framing::FixedSize(10))
            .retry(RetryPolicy::bounded(1, Backoff::None))
            .build(),
    );

    let err = client.fetch().await.unwrap_err();
    assert!(matches!(err, ClientError::Exhausted { received: 0, .. }));
    assert!(!destination.exists());

    let summary = server.stop().await.unwrap();
    assert_eq!(summary.failed, 1);
}
