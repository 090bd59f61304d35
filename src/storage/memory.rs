//! In-memory payload source and sink.

use std::io::Cursor;
use std::sync::{Arc, Mutex, PoisonError};

use crate::core::{Payload, PayloadSink, PayloadSource, StorageError};

/// Serves a fixed byte buffer.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    bytes: Arc<[u8]>,
}

impl MemorySource {
    /// Serve `bytes`.
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }
}

impl PayloadSource for MemorySource {
    async fn open(&self) -> Result<Payload, StorageError> {
        let len = self.bytes.len() as u64;
        Ok(Payload::new(len, Cursor::new(Arc::clone(&self.bytes))))
    }
}

/// Collects persisted payloads in memory.
///
/// Clones share the same storage, so a test can keep one handle and give
/// another to a client.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    stored: Arc<Mutex<Option<Vec<u8>>>>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Last persisted payload, if any.
    pub fn contents(&self) -> Option<Vec<u8>> {
        self.stored
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl PayloadSink for MemorySink {
    async fn persist(&self, bytes: &[u8]) -> Result<(), StorageError> {
        *self.stored.lock().unwrap_or_else(PoisonError::into_inner) = Some(bytes.to_vec());
        Ok(())
    }

    async fn discard(&self) -> Result<(), StorageError> {
        Ok(())
    }
}
