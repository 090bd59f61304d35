//! ferry binary entry point.
//!
//! `ferry serve` runs a producer until Ctrl-C, `ferry fetch` runs a
//! consumer until the payload is persisted or its policies give up, and
//! `ferry generate` writes a sample payload.
//!
//! Environment variables:
//! - FERRY_HOST, FERRY_PORT: producer address (fetch) or listen port (serve)
//! - FERRY_FILE, FERRY_OUTPUT: served file and destination file
//! - FERRY_FRAMING: eof, fixed:N or length-prefixed
//! - RUST_LOG: overrides the `-v` level

mod cli;

use std::process::ExitCode;

use clap::Parser;
use ferry_protocol::client::{ClientError, FerryClient};
use ferry_protocol::core::{CancelToken, ReachabilityProbe, StorageError};
use ferry_protocol::logging::init_logging;
use ferry_protocol::server::{FerryServer, ServerError};
use ferry_protocol::storage::{FileSink, generate_sample};
use ferry_protocol::transport::{AssumeReachable, TcpProbe};
use thiserror::Error;
use tracing::{error, info, warn};

use cli::{Cli, Command, FetchArgs, GenerateArgs, ServeArgs};

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Server(#[from] ServerError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("filler {0:?} is not an ASCII character")]
    Filler(char),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.log_level(), cli.log_file.as_deref(), cli.log_format.into()) {
        eprintln!("Failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    info!(version = env!("CARGO_PKG_VERSION"), "ferry starting");

    let result = match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Fetch(args) => fetch(args).await,
        Command::Generate(args) => generate(args).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "ferry failed");
            ExitCode::FAILURE
        }
    }
}

async fn serve(args: ServeArgs) -> Result<(), CliError> {
    let server = FerryServer::bind(args.server_config()).await?;
    cancel_on_ctrl_c(server.shutdown_token());

    let summary = server.run().await?;
    println!(
        "served {} sessions ({} completed, {} failed)",
        summary.sessions(),
        summary.completed,
        summary.failed
    );
    Ok(())
}

async fn fetch(args: FetchArgs) -> Result<(), CliError> {
    let config = args.client_config();
    let sink = FileSink::new(config.destination.clone());

    if args.no_probe {
        fetch_with(FerryClient::with_parts(config, AssumeReachable, sink)).await
    } else {
        let probe = TcpProbe::with_port(args.probe_port);
        fetch_with(FerryClient::with_parts(config, probe, sink)).await
    }
}

async fn fetch_with<P: ReachabilityProbe>(client: FerryClient<P, FileSink>) -> Result<(), CliError> {
    cancel_on_ctrl_c(client.cancel_token());
    let expected = describe(client.config().expected_size);

    match client.fetch().await {
        Ok(report) => {
            println!(
                "received {} of {} bytes into {} ({} attempts, {:.2?})",
                report.bytes,
                expected,
                client.config().destination.display(),
                report.attempts,
                report.elapsed
            );
            Ok(())
        }
        Err(e) => {
            if let Some((received, _)) = e.progress() {
                println!("received {received} of {expected} bytes");
            }
            Err(e.into())
        }
    }
}

async fn generate(args: GenerateArgs) -> Result<(), CliError> {
    let filler = args.filler_byte().ok_or(CliError::Filler(args.filler))?;
    let size = generate_sample(&args.output, args.size, filler).await?;
    println!("wrote {size} bytes to {}", args.output.display());
    Ok(())
}

fn describe(expected: Option<u64>) -> String {
    expected.map_or_else(|| "unknown".to_string(), |n| n.to_string())
}

fn cancel_on_ctrl_c(token: CancelToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("shutdown requested");
                token.cancel();
            }
            Err(e) => warn!(error = %e, "cannot listen for Ctrl-C"),
        }
    });
}
