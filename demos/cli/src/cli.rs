//! Command-line interface for the `ferry` binary.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use ferry_protocol::client::{ClientConfig, FerryClientBuilder};
use ferry_protocol::core::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_PAYLOAD_FILE, DEFAULT_POLL_INTERVAL, DEFAULT_PORT,
    DEFAULT_PROBE_TIMEOUT, DEFAULT_READ_TIMEOUT, DEFAULT_RETRY_DELAY, DEFAULT_SAMPLE_FILLER,
    DEFAULT_SAMPLE_SIZE, DEFAULT_WRITE_TIMEOUT, ECHO_PORT,
};
use ferry_protocol::logging::LogFormat;
use ferry_protocol::server::{FerryServerBuilder, ServerConfig, SessionErrorPolicy};
use ferry_protocol::transport::{Backoff, Framing, RetryPolicy};

/// Log output format for CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum CliLogFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// Structured JSON output.
    Json,
}

impl From<CliLogFormat> for LogFormat {
    fn from(fmt: CliLogFormat) -> Self {
        match fmt {
            CliLogFormat::Text => LogFormat::Text,
            CliLogFormat::Json => LogFormat::Json,
        }
    }
}

/// ferry - move one payload file from a producer to a consumer over TCP.
#[derive(Debug, Parser)]
#[command(name = "ferry", version, about)]
pub struct Cli {
    /// Increase verbosity (can be repeated: -v, -vv)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Log to file instead of stderr
    #[arg(long = "log-file", value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,

    /// Log output format
    #[arg(long = "log-format", default_value = "text", global = true)]
    pub log_format: CliLogFormat,

    /// What to do.
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Verbosity passed to the logger; info is shown without `-v`.
    pub fn log_level(&self) -> u8 {
        self.verbose.saturating_add(2)
    }
}

/// Subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve a payload file to every consumer that connects
    Serve(ServeArgs),
    /// Fetch the payload from a producer
    Fetch(FetchArgs),
    /// Write a sample payload file
    Generate(GenerateArgs),
}

/// Arguments for `ferry serve`.
#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Address to listen on
    #[arg(short = 'b', long = "bind", default_value = "0.0.0.0", env = "FERRY_BIND")]
    pub bind_addr: IpAddr,

    /// Port to listen on
    #[arg(short = 'p', long = "port", default_value_t = DEFAULT_PORT, env = "FERRY_PORT")]
    pub port: u16,

    /// File to serve
    #[arg(short = 'f', long = "file", default_value = DEFAULT_PAYLOAD_FILE, env = "FERRY_FILE")]
    pub file: PathBuf,

    /// Completion signal: eof, fixed:N or length-prefixed
    #[arg(long = "framing", default_value = "eof", env = "FERRY_FRAMING")]
    pub framing: Framing,

    /// Per-write inactivity limit in milliseconds (0 = none)
    #[arg(long = "write-timeout-ms", default_value_t = DEFAULT_WRITE_TIMEOUT.as_millis() as u64)]
    pub write_timeout_ms: u64,

    /// Stop the server when the payload file cannot be read
    #[arg(long = "stop-on-file-error")]
    pub stop_on_file_error: bool,
}

impl ServeArgs {
    /// Get the socket address to bind to.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }

    /// Build the server configuration.
    pub fn server_config(&self) -> ServerConfig {
        let policy = if self.stop_on_file_error {
            SessionErrorPolicy::ShutdownOnFileError
        } else {
            SessionErrorPolicy::Continue
        };

        FerryServerBuilder::new()
            .bind_addr(self.socket_addr())
            .source_path(self.file.clone())
            .framing(self.framing)
            .write_timeout(optional_millis(self.write_timeout_ms))
            .error_policy(policy)
            .build()
    }
}

/// Arguments for `ferry fetch`.
#[derive(Debug, Args)]
pub struct FetchArgs {
    /// Producer host
    #[arg(short = 'H', long = "host", default_value = "localhost", env = "FERRY_HOST")]
    pub host: String,

    /// Producer port
    #[arg(short = 'p', long = "port", default_value_t = DEFAULT_PORT, env = "FERRY_PORT")]
    pub port: u16,

    /// Where to write the payload
    #[arg(short = 'o', long = "output", default_value = DEFAULT_PAYLOAD_FILE, env = "FERRY_OUTPUT")]
    pub output: PathBuf,

    /// Completion signal: eof, fixed:N or length-prefixed
    #[arg(long = "framing", default_value = "eof", env = "FERRY_FRAMING")]
    pub framing: Framing,

    /// Expected payload size in bytes
    #[arg(short = 's', long = "expected-size", env = "FERRY_EXPECTED_SIZE")]
    pub expected_size: Option<u64>,

    /// Transfer attempts before giving up (default: unlimited)
    #[arg(long = "max-attempts")]
    pub max_attempts: Option<u32>,

    /// Reachability probes per attempt before giving up (default: unlimited)
    #[arg(long = "max-polls")]
    pub max_polls: Option<u32>,

    /// Delay between reachability probes in milliseconds
    #[arg(long = "poll-interval-ms", default_value_t = DEFAULT_POLL_INTERVAL.as_millis() as u64)]
    pub poll_interval_ms: u64,

    /// Delay between transfer attempts in milliseconds
    #[arg(long = "retry-delay-ms", default_value_t = DEFAULT_RETRY_DELAY.as_millis() as u64)]
    pub retry_delay_ms: u64,

    /// Limit for one reachability probe in milliseconds
    #[arg(long = "probe-timeout-ms", default_value_t = DEFAULT_PROBE_TIMEOUT.as_millis() as u64)]
    pub probe_timeout_ms: u64,

    /// Limit for one connect in milliseconds
    #[arg(long = "connect-timeout-ms", default_value_t = DEFAULT_CONNECT_TIMEOUT.as_millis() as u64)]
    pub connect_timeout_ms: u64,

    /// Per-read inactivity limit in milliseconds (0 = none)
    #[arg(long = "read-timeout-ms", default_value_t = DEFAULT_READ_TIMEOUT.as_millis() as u64)]
    pub read_timeout_ms: u64,

    /// Port probed for reachability
    #[arg(long = "probe-port", default_value_t = ECHO_PORT)]
    pub probe_port: u16,

    /// Skip reachability probing and connect directly
    #[arg(long = "no-probe")]
    pub no_probe: bool,
}

impl FetchArgs {
    /// Build the client configuration.
    pub fn client_config(&self) -> ClientConfig {
        let poll = Backoff::Constant(Duration::from_millis(self.poll_interval_ms));
        let retry = Backoff::Constant(Duration::from_millis(self.retry_delay_ms));

        FerryClientBuilder::new()
            .host(self.host.clone())
            .port(self.port)
            .destination(self.output.clone())
            .framing(self.framing)
            .expected_size(self.expected_size)
            .probe_timeout(Duration::from_millis(self.probe_timeout_ms))
            .connect_timeout(Duration::from_millis(self.connect_timeout_ms))
            .read_timeout(optional_millis(self.read_timeout_ms))
            .reachability(policy(self.max_polls, poll))
            .retry(policy(self.max_attempts, retry))
            .build()
    }
}

/// Arguments for `ferry generate`.
#[derive(Debug, Args)]
pub struct GenerateArgs {
    /// File to write
    #[arg(short = 'o', long = "output", default_value = DEFAULT_PAYLOAD_FILE)]
    pub output: PathBuf,

    /// Size in bytes
    #[arg(short = 's', long = "size", default_value_t = DEFAULT_SAMPLE_SIZE)]
    pub size: u64,

    /// Filler character
    #[arg(long = "filler", default_value_t = DEFAULT_SAMPLE_FILLER as char)]
    pub filler: char,
}

impl GenerateArgs {
    /// Filler as a byte, if it is ASCII.
    pub fn filler_byte(&self) -> Option<u8> {
        u8::try_from(self.filler).ok().filter(u8::is_ascii)
    }
}

fn policy(max_attempts: Option<u32>, backoff: Backoff) -> RetryPolicy {
    match max_attempts {
        Some(max) => RetryPolicy::bounded(max, backoff),
        None => RetryPolicy::unbounded(backoff),
    }
}

fn optional_millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_defaults() {
        let cli = Cli::try_parse_from(["ferry", "fetch"]).unwrap();
        assert_eq!(cli.log_level(), 2);
        let Command::Fetch(args) = cli.command else {
            panic!("expected fetch");
        };

        let config = args.client_config();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.framing, Framing::EndOfStream);
        assert_eq!(config.read_timeout, Some(DEFAULT_READ_TIMEOUT));
        assert_eq!(config.retry.max_attempts(), None);
        assert_eq!(
            config.reachability.backoff(),
            Backoff::Constant(DEFAULT_POLL_INTERVAL)
        );
    }

    #[test]
    fn test_fetch_options() {
        let cli = Cli::try_parse_from([
            "ferry",
            "fetch",
            "--host",
            "10.0.0.5",
            "--framing",
            "fixed:10",
            "--expected-size",
            "10",
            "--max-attempts",
            "3",
            "--read-timeout-ms",
            "0",
            "-vv",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        let Command::Fetch(args) = cli.command else {
            panic!("expected fetch");
        };

        let config = args.client_config();
        assert_eq!(config.server_addr(), "10.0.0.5:1337");
        assert_eq!(config.framing, Framing::FixedSize(10));
        assert_eq!(config.retry.max_attempts(), Some(3));
        assert_eq!(config.read_timeout, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_serve_options() {
        let cli = Cli::try_parse_from([
            "ferry",
            "serve",
            "--port",
            "9000",
            "--file",
            "payload.bin",
            "--framing",
            "length-prefixed",
            "--stop-on-file-error",
        ])
        .unwrap();
        let Command::Serve(args) = cli.command else {
            panic!("expected serve");
        };

        let config = args.server_config();
        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.source_path, PathBuf::from("payload.bin"));
        assert_eq!(config.framing, Framing::LengthPrefixed);
        assert_eq!(config.error_policy, SessionErrorPolicy::ShutdownOnFileError);
    }

    #[test]
    fn test_bad_framing_is_rejected() {
        assert!(Cli::try_parse_from(["ferry", "serve", "--framing", "fixed:abc"]).is_err());
    }

    #[test]
    fn test_generate_filler() {
        let cli = Cli::try_parse_from(["ferry", "generate", "--size", "10"]).unwrap();
        let Command::Generate(args) = cli.command else {
            panic!("expected generate");
        };
        assert_eq!(args.size, 10);
        assert_eq!(args.filler_byte(), Some(b'1'));

        let cli = Cli::try_parse_from(["ferry", "generate", "--filler", "é"]).unwrap();
        let Command::Generate(args) = cli.command else {
            panic!("expected generate");
        };
        assert_eq!(args.filler_byte(), None);
    }
}
