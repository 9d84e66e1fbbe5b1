//! Dapr pub/sub publisher.

use super::{PublishError, Publisher, status_error};
use archivista_core::config::AppConfig;
use archivista_core::encoding::b64_encode;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct Message<'a> {
    #[serde(rename = "Gitoid")]
    gitoid: &'a str,
    #[serde(rename = "Payload")]
    payload: String,
}

pub struct DaprPublisher {
    client: reqwest::Client,
    url: String,
}

impl DaprPublisher {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    /// An explicit `PUBLISHER_DAPR_URL` wins over host, port, component
    /// and topic.
    pub fn from_config(client: reqwest::Client, config: &AppConfig) -> Self {
        let url = if config.publisher_dapr_url.is_empty() {
            format!(
                "{}:{}/v1.0/publish/{}/{}",
                config.publisher_dapr_host.trim_end_matches('/'),
                config.publisher_dapr_port,
                config.publisher_dapr_component_name,
                config.publisher_dapr_topic
            )
        } else {
            config.publisher_dapr_url.clone()
        };
        Self::new(client, url)
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Publisher for DaprPublisher {
    fn name(&self) -> &'static str {
        "dapr"
    }

    async fn publish(&self, gitoid: &str, payload: &[u8]) -> Result<(), PublishError> {
        let message = Message {
            gitoid,
            payload: b64_encode(payload),
        };
        let response = self.client.post(&self.url).json(&message).send().await?;
        if response.status() != StatusCode::NO_CONTENT {
            return Err(status_error(response).await);
        }
        tracing::debug!(gitoid, "published to dapr");
        Ok(())
    }
}
