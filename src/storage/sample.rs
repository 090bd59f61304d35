//! Sample payload generation.

use std::path::Path;

use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::info;

use crate::core::{StorageError, WRITE_CHUNK_SIZE};

/// Write a payload of `size` bytes, all equal to `filler`, to `path`.
///
/// Any existing file is truncated. Returns the number of bytes written.
pub async fn generate_sample(path: &Path, size: u64, filler: u8) -> Result<u64, StorageError> {
    let file = File::create(path)
        .await
        .map_err(|e| StorageError::unavailable(path, e))?;
    let mut writer = BufWriter::new(file);

    let chunk = vec![filler; WRITE_CHUNK_SIZE];
    let mut remaining = size;
    while remaining > 0 {
        let n = remaining.min(chunk.len() as u64) as usize;
        writer.write_all(&chunk[..n]).await?;
        remaining -= n as u64;
    }
    writer.flush().await?;
    writer.get_ref().sync_data().await?;

    info!(path = %path.display(), size, "sample payload generated");
    Ok(size)
}
