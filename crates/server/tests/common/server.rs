//! Server test utilities.

use crate::common::metadata::TestMetadata;
use archivista_core::config::AppConfig;
use archivista_metadata::{MetadataStore, SqlStore};
use archivista_server::publisher::Publisher;
use archivista_server::{AppState, create_router};
use archivista_storage::{BlobStore, FilesystemBackend};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    pub sql: Arc<SqlStore>,
    _metadata: TestMetadata,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Filesystem blob store and SQLite metadata in a temporary directory.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server with custom config modifications.
    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        Self::build(modifier, Vec::new()).await
    }

    pub async fn with_publishers(publishers: Vec<Arc<dyn Publisher>>) -> Self {
        Self::build(|_| {}, publishers).await
    }

    async fn build<F>(modifier: F, publishers: Vec<Arc<dyn Publisher>>) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let blob_dir = temp_dir.path().join("blobs");

        let mut config = AppConfig {
            storage_backend: "FILE".to_string(),
            file_dir: blob_dir.clone(),
            ..AppConfig::for_testing()
        };
        modifier(&mut config);

        let blobs: Arc<dyn BlobStore> = Arc::new(
            FilesystemBackend::new(&blob_dir)
                .await
                .expect("Failed to create storage backend"),
        );
        let metadata = TestMetadata::with_limits(config.bundle_limits())
            .await
            .expect("Failed to create metadata store");
        let sql = metadata.store.clone();

        let state = AppState::with_publishers(
            config,
            Some(blobs),
            Some(metadata.store()),
            publishers,
        );
        let router = create_router(state.clone());

        Self {
            router,
            state,
            sql,
            _metadata: metadata,
            _temp_dir: temp_dir,
        }
    }

    pub fn metadata(&self) -> Arc<dyn MetadataStore> {
        self.sql.clone()
    }

    /// POST raw bytes to `uri`.
    pub async fn post_bytes(&self, uri: &str, body: Vec<u8>) -> (StatusCode, Vec<u8>) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .body(Body::from(body))
            .unwrap();
        send(&self.router, request).await
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Vec<u8>) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        send(&self.router, request).await
    }

    /// Upload and return the gitoid, asserting success.
    pub async fn upload(&self, body: Vec<u8>) -> String {
        let (status, bytes) = self.post_bytes("/v1/upload", body).await;
        assert_eq!(
            status,
            StatusCode::OK,
            "upload failed: {}",
            String::from_utf8_lossy(&bytes)
        );
        let json: Value = serde_json::from_slice(&bytes).unwrap();
        json["gitoid"].as_str().unwrap().to_string()
    }

    /// Run a GraphQL query and return the `data` object, asserting no errors.
    pub async fn graphql(&self, query: &str, variables: Value) -> Value {
        let body = serde_json::json!({"query": query, "variables": variables});
        let request = Request::builder()
            .method("POST")
            .uri("/v1/query")
            .header("Content-Type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap();
        let (status, bytes) = send(&self.router, request).await;
        assert_eq!(status, StatusCode::OK);
        let json: Value = serde_json::from_slice(&bytes).unwrap();
        assert!(json.get("errors").is_none(), "graphql errors: {json}");
        json["data"].clone()
    }
}

async fn send(router: &axum::Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}
