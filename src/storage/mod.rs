//! FERRY Protocol - Storage collaborators
//!
//! Implementations of [`PayloadSource`](crate::core::PayloadSource) and
//! [`PayloadSink`](crate::core::PayloadSink), plus the sample payload
//! generator used to prepare a producer.

mod file;
mod memory;
mod sample;

pub use file::*;
pub use memory::*;
pub use sample::*;
