//! FERRY Protocol - Core traits and types
//!
//! Constants, error types and the collaborator traits (payload storage,
//! reachability) shared by the producer and the consumer.

mod cancel;
mod constants;
mod error;
mod traits;

pub use cancel::*;
pub use constants::*;
pub use error::*;
pub use traits::*;
