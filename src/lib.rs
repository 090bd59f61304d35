//! # FERRY Protocol
//!
//! **F**ile **E**xchange over **R**eliable **R**aw sockets, **Y**ield on close
//!
//! FERRY moves one payload file from a producer to a consumer over a single
//! TCP connection per attempt. It provides:
//!
//! - **Completion**: configurable framing (end-of-stream, fixed size, length prefix)
//! - **Robustness**: partial-read and partial-write loops with inactivity timeouts
//! - **Patience**: reachability polling and retry policies on the consumer
//! - **Safety**: received bytes are only published once complete
//!
//! ## Feature Flags
//!
//! - `server` (default): Producer API
//! - `client` (default): Consumer API
//! - `logging` (default): `tracing-subscriber` setup
//!
//! ## Modules
//!
//! - [`core`]: Collaborator traits, constants, and error types (always included)
//! - [`transport`]: Framing, stream loops, probes, retry (always included)
//! - [`storage`]: File and in-memory payload sources and sinks (always included)
//! - [`server`]: Producer (requires `server` feature)
//! - [`client`]: Consumer (requires `client` feature)
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use ferry_protocol::prelude::*;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let server_config = FerryServerBuilder::new()
//!     .source_path("maintenance_data.txt")
//!     .build();
//! let server = FerryServer::bind(server_config).await?;
//! tokio::spawn(server.run());
//!
//! let client_config = FerryClientBuilder::new()
//!     .host("localhost")
//!     .destination("received.txt")
//!     .build();
//! let report = FerryClient::new(client_config).fetch().await?;
//! assert_eq!(report.bytes, std::fs::metadata("received.txt")?.len());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Core module (always included)
pub mod core;

// Transport layer
pub mod transport;

// Storage collaborators
pub mod storage;

// Client API (feature-gated)
#[cfg(feature = "client")]
#[cfg_attr(docsrs, doc(cfg(feature = "client")))]
pub mod client;

// Server API (feature-gated)
#[cfg(feature = "server")]
#[cfg_attr(docsrs, doc(cfg(feature = "server")))]
pub mod server;

// Subscriber setup (feature-gated)
#[cfg(feature = "logging")]
#[cfg_attr(docsrs, doc(cfg(feature = "logging")))]
pub mod logging;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::core::*;
    pub use crate::storage::{FileSink, FileSource, MemorySink, MemorySource, generate_sample};
    pub use crate::transport::{
        AssumeReachable, Backoff, Framing, PayloadReceiver, PayloadSender, RetryPolicy, TcpProbe,
    };

    #[cfg(feature = "client")]
    pub use crate::client::{
        ClientConfig, ClientError, ClientPhase, FerryClient, FerryClientBuilder, TransferReport,
    };

    #[cfg(feature = "server")]
    pub use crate::server::{
        FerryServer, FerryServerBuilder, ServerConfig, ServerError, ServerEvent,
        SessionErrorPolicy,
    };
}

// Re-export commonly used items at crate root
pub use crate::core::{StorageError, TransferError, TransferResult};
pub use crate::transport::{Framing, RetryPolicy};

#[cfg(feature = "client")]
pub use crate::client::{FerryClient, FerryClientBuilder};

#[cfg(feature = "server")]
pub use crate::server::{FerryServer, FerryServerBuilder};
