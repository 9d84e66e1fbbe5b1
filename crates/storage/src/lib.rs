//! Blob storage for raw attestation uploads.
//!
//! Uploads are stored verbatim under their gitoid so they can be served
//! back byte-for-byte. Backends: local filesystem and S3-compatible.

pub mod backends;
pub mod error;
pub mod traits;

pub use backends::{filesystem::FilesystemBackend, s3::S3Backend};
pub use error::{StorageError, StorageResult};
pub use traits::{BlobStore, ByteStream};

use archivista_core::config::StorageConfig;
use std::sync::Arc;

/// Create a blob store from configuration. `None` when storage is disabled.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Option<Arc<dyn BlobStore>>> {
    match config {
        StorageConfig::Disabled => Ok(None),
        StorageConfig::Filesystem { path } => {
            let backend = FilesystemBackend::new(path).await?;
            tracing::info!(path = %path.display(), "using filesystem blob store");
            Ok(Some(Arc::new(backend)))
        }
        StorageConfig::S3 {
            bucket,
            endpoint,
            region,
            credentials,
        } => {
            let credentials = credentials
                .as_ref()
                .map(|c| (c.access_key_id.clone(), c.secret_access_key.clone()));
            let backend = S3Backend::new(bucket, endpoint, region, credentials)?;
            tracing::info!(bucket = %bucket, endpoint = %endpoint, "using S3 blob store");
            Ok(Some(Arc::new(backend)))
        }
    }
}
