//! Downstream notification after a successful ingest.
//!
//! Publishers run one after another once the metadata transaction commits.
//! Their failures are logged and counted, never returned to the uploader.

pub mod dapr;
pub mod rstuf;

pub use dapr::DaprPublisher;
pub use rstuf::RstufPublisher;

use archivista_core::config::{AppConfig, PublisherKind};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },
}

/// A target notified about stored attestations.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Short name used in logs and metrics.
    fn name(&self) -> &'static str;

    /// Announce `payload`, the bytes uploaded under `gitoid`.
    async fn publish(&self, gitoid: &str, payload: &[u8]) -> Result<(), PublishError>;
}

/// Build the configured publishers, sharing one HTTP client.
pub fn from_config(config: &AppConfig) -> Vec<Arc<dyn Publisher>> {
    let client = reqwest::Client::new();
    config
        .publishers()
        .into_iter()
        .map(|kind| -> Arc<dyn Publisher> {
            match kind {
                PublisherKind::Dapr => Arc::new(DaprPublisher::from_config(client.clone(), config)),
                PublisherKind::Rstuf => Arc::new(RstufPublisher::new(
                    client.clone(),
                    &config.publisher_rstuf_host,
                )),
            }
        })
        .collect()
}

/// Read the body of an unexpected response for the error message.
async fn status_error(response: reqwest::Response) -> PublishError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    PublishError::Status { status, body }
}
