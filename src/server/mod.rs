//! FERRY Protocol - Producer
//!
//! Listens for consumers and serves the payload to each of them in turn.

#[allow(clippy::module_inception)]
mod server;
mod session;

pub use server::*;
pub use session::*;
