//! Application state shared across handlers.

use crate::graphql::{ArchivistaSchema, build_schema};
use crate::publisher::{self, Publisher};
use archivista_core::FormatRouter;
use archivista_core::config::AppConfig;
use archivista_metadata::MetadataStore;
use archivista_storage::BlobStore;
use std::sync::Arc;

/// Application state.
#[derive(Clone)]
pub struct AppState {
    /// Configuration.
    pub config: Arc<AppConfig>,
    /// Blob store. `None` when `STORAGE_BACKEND` is empty.
    pub blobs: Option<Arc<dyn BlobStore>>,
    /// Metadata store. `None` when the SQL store is disabled.
    pub metadata: Option<Arc<dyn MetadataStore>>,
    /// Upload classifier with the configured bundle limits.
    pub router: Arc<FormatRouter>,
    /// Notified after every new upload, in order.
    pub publishers: Arc<Vec<Arc<dyn Publisher>>>,
    /// GraphQL schema. `None` when GraphQL is disabled or there is no
    /// metadata store to query.
    pub schema: Option<ArchivistaSchema>,
}

impl AppState {
    /// Create new application state with publishers built from `config`.
    pub fn new(
        config: AppConfig,
        blobs: Option<Arc<dyn BlobStore>>,
        metadata: Option<Arc<dyn MetadataStore>>,
    ) -> Self {
        let publishers = publisher::from_config(&config);
        Self::with_publishers(config, blobs, metadata, publishers)
    }

    pub fn with_publishers(
        config: AppConfig,
        blobs: Option<Arc<dyn BlobStore>>,
        metadata: Option<Arc<dyn MetadataStore>>,
        publishers: Vec<Arc<dyn Publisher>>,
    ) -> Self {
        let router = FormatRouter::new(config.bundle_limits());
        let schema = match &metadata {
            Some(store) if config.enable_graphql => Some(build_schema(store.clone())),
            _ => None,
        };
        Self {
            config: Arc::new(config),
            blobs,
            metadata,
            router: Arc::new(router),
            publishers: Arc::new(publishers),
            schema,
        }
    }

    /// Largest request body the upload endpoint accepts.
    ///
    /// Base64 and JSON framing inflate a payload by about a third, so the
    /// body may be larger than the decoded payload limit.
    pub fn upload_body_limit(&self) -> usize {
        self.router.limits().max_payload_size.saturating_mul(2)
    }
}
