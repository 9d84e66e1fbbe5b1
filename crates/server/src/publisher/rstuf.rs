//! Repository Service for TUF publisher.
//!
//! Registers each stored attestation as a TUF target so it can be
//! distributed with signed metadata.

use super::{PublishError, Publisher, status_error};
use archivista_core::gitoid::sha256_hex;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
struct ArtifactPayload<'a> {
    artifacts: Vec<Artifact<'a>>,
    add_task_id_to_custom: bool,
    publish_targets: bool,
}

#[derive(Debug, Serialize)]
struct Artifact<'a> {
    path: &'a str,
    info: ArtifactInfo,
}

#[derive(Debug, Serialize)]
struct ArtifactInfo {
    length: usize,
    hashes: Hashes,
}

#[derive(Debug, Serialize)]
struct Hashes {
    sha256: String,
}

#[derive(Debug, Default, Deserialize)]
struct TaskResponse {
    #[serde(default)]
    data: TaskData,
}

#[derive(Debug, Default, Deserialize)]
struct TaskData {
    #[serde(default)]
    task_id: String,
}

pub struct RstufPublisher {
    client: reqwest::Client,
    url: String,
}

impl RstufPublisher {
    pub fn new(client: reqwest::Client, host: &str) -> Self {
        Self {
            client,
            url: format!("{}/api/v1/artifacts", host.trim_end_matches('/')),
        }
    }
}

#[async_trait]
impl Publisher for RstufPublisher {
    fn name(&self) -> &'static str {
        "rstuf"
    }

    async fn publish(&self, gitoid: &str, payload: &[u8]) -> Result<(), PublishError> {
        let body = ArtifactPayload {
            artifacts: vec![Artifact {
                path: gitoid,
                info: ArtifactInfo {
                    length: payload.len(),
                    hashes: Hashes {
                        sha256: sha256_hex(payload),
                    },
                },
            }],
            add_task_id_to_custom: false,
            publish_targets: true,
        };

        let response = self.client.post(&self.url).json(&body).send().await?;
        if response.status() != StatusCode::ACCEPTED {
            return Err(status_error(response).await);
        }

        // The task id is informational; a body we cannot read is not a failure.
        let task = response.json::<TaskResponse>().await.unwrap_or_default();
        tracing::debug!(gitoid, task_id = %task.data.task_id, "RSTUF accepted artifact");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    #[tokio::test]
    async fn posts_artifact_and_accepts_202() {
        let server = MockServer::start_async().await;
        let payload = b"{\"payload\":\"x\"}";
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/api/v1/artifacts").json_body(json!({
                    "artifacts": [{
                        "path": "abc123",
                        "info": {"length": payload.len(), "hashes": {"sha256": sha256_hex(payload)}}
                    }],
                    "add_task_id_to_custom": false,
                    "publish_targets": true
                }));
                then.status(202)
                    .json_body(json!({"data": {"task_id": "t-1"}}));
            })
            .await;

        let publisher = RstufPublisher::new(reqwest::Client::new(), &server.base_url());
        publisher.publish("abc123", payload).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn other_statuses_are_errors() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/v1/artifacts");
                then.status(200).body("ok");
            })
            .await;

        let publisher = RstufPublisher::new(reqwest::Client::new(), &server.base_url());
        let err = publisher.publish("abc123", b"x").await.unwrap_err();
        assert!(matches!(err, PublishError::Status { status: 200, .. }));
    }
}
