use crate::domain::jobs::StorageLocation;
use async_trait::async_trait;
use std::pin::Pin;
use thiserror::Error;
use tokio::io::AsyncRead;

/// Owned byte stream handed between storage and the transcoder.
pub type ByteReader = Pin<Box<dyn AsyncRead + Send>>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object {0} not found")]
    NotFound(String),
    #[error("storage backend error: {0}")]
    Backend(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Open an object for streaming reads
    async fn open(&self, location: &StorageLocation) -> Result<ByteReader, StorageError>;

    /// Stream `body` into a new object at `location`
    /// Returns the number of bytes written
    async fn put_stream(
        &self,
        location: &StorageLocation,
        body: ByteReader,
    ) -> Result<u64, StorageError>;

    /// Server-side copy of an object
    async fn copy(&self, from: &StorageLocation, to: &StorageLocation) -> Result<(), StorageError>;

    async fn delete(&self, location: &StorageLocation) -> Result<(), StorageError>;
}
