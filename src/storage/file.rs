//! File-system payload source and sink.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufReader};
use tracing::debug;

use crate::core::{PARTIAL_FILE_SUFFIX, Payload, PayloadSink, PayloadSource, StorageError};

/// Serves a file from disk.
///
/// The file is reopened for every session, so edits between sessions are
/// picked up and the announced length is the size at open time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    /// Serve the file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the served file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PayloadSource for FileSource {
    async fn open(&self) -> Result<Payload, StorageError> {
        let file = File::open(&self.path)
            .await
            .map_err(|e| StorageError::unavailable(&self.path, e))?;
        let metadata = file
            .metadata()
            .await
            .map_err(|e| StorageError::unavailable(&self.path, e))?;

        if !metadata.is_file() {
            return Err(StorageError::unavailable(
                &self.path,
                io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"),
            ));
        }

        debug!(path = %self.path.display(), len = metadata.len(), "payload opened");
        Ok(Payload::new(metadata.len(), BufReader::new(file)))
    }
}

/// Persists a payload to disk.
///
/// Bytes go to `<destination>.part` first and are renamed into place once
/// they are on disk, so the destination only ever holds a complete payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSink {
    destination: PathBuf,
    partial: PathBuf,
}

impl FileSink {
    /// Persist to `destination`.
    pub fn new(destination: impl Into<PathBuf>) -> Self {
        let destination = destination.into();
        let mut partial = OsString::from(destination.as_os_str());
        partial.push(PARTIAL_FILE_SUFFIX);
        Self {
            destination,
            partial: PathBuf::from(partial),
        }
    }

    /// Final destination path.
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// In-progress file path.
    pub fn partial_path(&self) -> &Path {
        &self.partial
    }
}

impl PayloadSink for FileSink {
    async fn persist(&self, bytes: &[u8]) -> Result<(), StorageError> {
        let mut file = File::create(&self.partial)
            .await
            .map_err(|e| StorageError::unavailable(&self.partial, e))?;
        file.write_all(bytes).await?;
        file.flush().await?;
        file.sync_data().await?;
        drop(file);

        fs::rename(&self.partial, &self.destination)
            .await
            .map_err(|e| StorageError::unavailable(&self.destination, e))?;

        debug!(path = %self.destination.display(), len = bytes.len(), "payload persisted");
        Ok(())
    }

    async fn discard(&self) -> Result<(), StorageError> {
        match fs::remove_file(&self.partial).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncReadExt;

    use super::*;

    #[tokio::test]
    async fn test_source_reports_current_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("payload.bin");
        fs::write(&path, b"ABCDEFGHIJ").await.unwrap();

        let source = FileSource::new(&path);
        let payload = source.open().await.unwrap();
        assert_eq!(payload.len(), 10);

        let (_, mut reader) = payload.into_parts();
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes).await.unwrap();
        assert_eq!(bytes, b"ABCDEFGHIJ");

        // Size is taken at open time, not at construction.
        fs::write(&path, b"ABC").await.unwrap();
        assert_eq!(source.open().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_missing_source_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileSource::new(dir.path().join("missing.bin"));

        let err = source.open().await.unwrap_err();
        assert!(matches!(err, StorageError::Unavailable { .. }));
    }

    #[tokio::test]
    async fn test_directory_source_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let err = FileSource::new(dir.path()).open().await.unwrap_err();
        assert!(matches!(err, StorageError::Unavailable { .. }));
    }

    #[tokio::test]
    async fn test_sink_renames_into_place() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path().join("out.txt"));
        assert_eq!(sink.partial_path(), dir.path().join("out.txt.part"));

        sink.persist(b"ABCDEFGHIJ").await.unwrap();

        assert_eq!(fs::read(sink.destination()).await.unwrap(), b"ABCDEFGHIJ");
        assert!(!sink.partial_path().exists());
    }

    #[tokio::test]
    async fn test_discard_removes_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path().join("out.txt"));

        // Nothing to discard is fine.
        sink.discard().await.unwrap();

        fs::write(sink.partial_path(), b"ABCD").await.unwrap();
        sink.discard().await.unwrap();
        assert!(!sink.partial_path().exists());
        assert!(!sink.destination().exists());
    }

    #[tokio::test]
    async fn test_sink_into_missing_directory_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path().join("no/such/dir/out.txt"));

        let err = sink.persist(b"x").await.unwrap_err();
        assert!(matches!(err, StorageError::Unavailable { .. }));
    }
}
