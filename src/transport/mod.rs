//! FERRY Protocol - Transport Layer
//!
//! This module holds everything that touches the wire:
//!
//! - **Framing**: [`Framing`] decides how the consumer knows the payload is complete
//! - **Stream loops**: [`PayloadSender`] and [`PayloadReceiver`] move one payload,
//!   tolerating partial reads and writes
//! - **Reachability**: [`TcpProbe`] checks host liveness before a connect
//! - **Retry**: [`RetryPolicy`] bounds (or not) polling and session attempts
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │      Producer / Consumer sessions       │
//! ├─────────────────────────────────────────┤
//! │         Transport Layer                 │  ← This module
//! │   framing, stream loops, probe, retry   │
//! ├─────────────────────────────────────────┤
//! │              TCP                        │
//! └─────────────────────────────────────────┘
//! ```

mod framing;
mod probe;
mod retry;
mod stream;

pub use framing::*;
pub use probe::*;
pub use retry::*;
pub use stream::*;
