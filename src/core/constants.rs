//! Protocol defaults for FERRY.
//!
//! Every value here is a default for a config field; nothing on the wire
//! depends on them except [`LENGTH_PREFIX_SIZE`].

use std::time::Duration;

// =============================================================================
// NETWORK
// =============================================================================

/// Well-known producer port.
pub const DEFAULT_PORT: u16 = 1337;

/// Default producer host the consumer connects to.
pub const DEFAULT_HOST: &str = "localhost";

/// TCP echo service port used by the reachability probe.
pub const ECHO_PORT: u16 = 7;

// =============================================================================
// STORAGE
// =============================================================================

/// Default payload file name on both sides.
pub const DEFAULT_PAYLOAD_FILE: &str = "maintenance_data.txt";

/// Suffix of the in-progress destination file.
pub const PARTIAL_FILE_SUFFIX: &str = ".part";

/// Default size of a generated sample payload (160 MiB).
pub const DEFAULT_SAMPLE_SIZE: u64 = 160 * 1024 * 1024;

/// Default filler byte of a generated sample payload.
pub const DEFAULT_SAMPLE_FILLER: u8 = b'1';

// =============================================================================
// FRAMING / BUFFERS
// =============================================================================

/// Size of the big-endian length header used by length-prefixed framing.
pub const LENGTH_PREFIX_SIZE: usize = 8;

/// Maximum bytes requested per socket read.
pub const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Maximum bytes handed to the socket per write.
pub const WRITE_CHUNK_SIZE: usize = 64 * 1024;

/// Upper bound on the receive buffer pre-allocation taken from a size hint.
pub const MAX_PREALLOCATION: usize = 64 * 1024 * 1024;

// =============================================================================
// TIMING
// =============================================================================

/// Per-probe reachability timeout.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(500);

/// Delay between two reachability probes.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// TCP connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Read inactivity window; forward progress resets it.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(2000);

/// Write inactivity window per chunk.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Delay between two session attempts on the consumer.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Pause after a failed `accept` before the producer accepts again.
pub const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

// =============================================================================
// EVENTS
// =============================================================================

/// Server events buffered for a subscriber; newer events are dropped when full.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;
