//! Upload orchestration.
//!
//! An upload is classified, written to the blob store, shredded into the
//! metadata store and announced to publishers, in that order. Only the first
//! two steps can fail the request.

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;
use archivista_core::{Gitoid, Payload};
use archivista_metadata::MetadataError;
use bytes::Bytes;
use std::time::Instant;

/// What happened to an accepted upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// New rows were written.
    Stored,
    /// The gitoid was already present; nothing new was written.
    Duplicate,
}

#[derive(Debug, Clone)]
pub struct IngestReceipt {
    pub gitoid: String,
    pub outcome: IngestOutcome,
}

/// Store one upload.
#[tracing::instrument(skip_all, fields(size = raw.len(), gitoid))]
pub async fn upload(state: &AppState, raw: Bytes) -> ApiResult<IngestReceipt> {
    let started = Instant::now();
    metrics::UPLOAD_BYTES.inc_by(raw.len() as u64);

    let result = store(state, &raw).await;
    match &result {
        Ok(receipt) => {
            metrics::INGEST_DURATION.observe(started.elapsed().as_secs_f64());
            match receipt.outcome {
                IngestOutcome::Stored => metrics::UPLOADS.inc(),
                IngestOutcome::Duplicate => metrics::DUPLICATE_UPLOADS.inc(),
            }
        }
        Err(e) => metrics::record_upload_failure(e.code()),
    }
    let receipt = result?;

    if receipt.outcome == IngestOutcome::Stored {
        publish(state, &receipt.gitoid, &raw).await;
    }
    Ok(receipt)
}

async fn store(state: &AppState, raw: &Bytes) -> ApiResult<IngestReceipt> {
    let gitoid = Gitoid::compute(raw).to_hex();
    tracing::Span::current().record("gitoid", gitoid.as_str());

    let payload = state.router.classify(raw)?;
    if let Payload::MessageSignature(bundle) = &payload {
        tracing::info!(
            gitoid = %gitoid,
            media_type = %bundle.media_type,
            "message signature bundle has no envelope, storing blob only"
        );
    }

    if let Some(blobs) = &state.blobs {
        let canonical = payload.canonical_bytes(raw)?;
        let data = match canonical {
            std::borrow::Cow::Borrowed(_) => raw.clone(),
            std::borrow::Cow::Owned(bytes) => Bytes::from(bytes),
        };
        blobs.store(&gitoid, data).await?;
    }

    let mut outcome = IngestOutcome::Stored;
    if let Some(metadata) = &state.metadata {
        match metadata.store_payload(&gitoid, &payload).await {
            Ok(()) => {}
            Err(MetadataError::Duplicate(_)) => {
                tracing::info!(gitoid = %gitoid, "attestation already stored");
                outcome = IngestOutcome::Duplicate;
            }
            Err(e) => return Err(ApiError::from(e)),
        }
    }

    tracing::info!(gitoid = %gitoid, ?outcome, "upload accepted");
    Ok(IngestReceipt { gitoid, outcome })
}

/// Notify every publisher. Failures are logged and counted only.
async fn publish(state: &AppState, gitoid: &str, raw: &[u8]) {
    for publisher in state.publishers.iter() {
        if let Err(e) = publisher.publish(gitoid, raw).await {
            metrics::record_publisher_failure(publisher.name());
            tracing::warn!(
                gitoid = %gitoid,
                publisher = publisher.name(),
                error = %e,
                "failed to publish attestation"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publisher::{PublishError, Publisher};
    use archivista_core::config::AppConfig;
    use archivista_core::encoding::b64_encode;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    #[async_trait]
    impl Publisher for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }

        async fn publish(&self, gitoid: &str, _payload: &[u8]) -> Result<(), PublishError> {
            self.0.lock().unwrap().push(gitoid.to_string());
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl Publisher for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn publish(&self, _gitoid: &str, _payload: &[u8]) -> Result<(), PublishError> {
            Err(PublishError::Status {
                status: 500,
                body: "down".to_string(),
            })
        }
    }

    fn envelope_bytes() -> Bytes {
        let statement = br#"{"_type":"https://in-toto.io/Statement/v0.1","predicateType":"https://example.com/none","subject":[],"predicate":{}}"#;
        Bytes::from(
            serde_json::json!({
                "payload": b64_encode(statement),
                "payloadType": "application/vnd.in-toto+json",
                "signatures": [{"keyid": "k", "sig": b64_encode(b"sig")}]
            })
            .to_string(),
        )
    }

    #[tokio::test]
    async fn stateless_upload_still_computes_gitoid_and_publishes() {
        let recorder = Arc::new(Recorder::default());
        let state = AppState::with_publishers(
            AppConfig::for_testing(),
            None,
            None,
            vec![Arc::new(Failing), recorder.clone()],
        );

        let raw = envelope_bytes();
        let receipt = upload(&state, raw.clone()).await.unwrap();
        assert_eq!(receipt.gitoid, Gitoid::compute(&raw).to_hex());
        assert_eq!(receipt.outcome, IngestOutcome::Stored);
        assert_eq!(*recorder.0.lock().unwrap(), vec![receipt.gitoid]);
    }

    #[tokio::test]
    async fn garbage_is_rejected_before_publishing() {
        let recorder = Arc::new(Recorder::default());
        let state =
            AppState::with_publishers(AppConfig::for_testing(), None, None, vec![recorder.clone()]);

        let err = upload(&state, Bytes::from_static(b"not json")).await.unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
        assert!(recorder.0.lock().unwrap().is_empty());
    }
}
