//! FERRY Protocol - Consumer
//!
//! Polls the producer host, fetches the payload and persists it.

#[allow(clippy::module_inception)]
mod client;

pub use client::*;
