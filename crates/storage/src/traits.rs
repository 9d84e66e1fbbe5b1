//! Storage trait definitions.

use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;

/// A boxed stream of bytes for streaming reads.
pub type ByteStream = Pin<Box<dyn Stream<Item = StorageResult<Bytes>> + Send>>;

/// Content-addressed blob storage keyed by gitoid.
#[async_trait]
pub trait BlobStore: Send + Sync + 'static {
    /// Store a blob. Writing the same key twice with the same bytes is a no-op
    /// from the caller's point of view.
    async fn store(&self, key: &str, data: Bytes) -> StorageResult<()>;

    /// Read a whole blob.
    async fn get(&self, key: &str) -> StorageResult<Bytes>;

    /// Read a blob as a byte stream.
    async fn get_stream(&self, key: &str) -> StorageResult<ByteStream>;

    /// Check if a blob exists.
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Get the name of this storage backend, for logs and health output.
    fn backend_name(&self) -> &'static str;

    /// Verify the backend is reachable and configured.
    ///
    /// Called at startup and from the health endpoint.
    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}
