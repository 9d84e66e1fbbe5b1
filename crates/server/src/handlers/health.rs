//! Health check.

use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    /// `None` when the component is not configured.
    pub blob_store: Option<ComponentHealth>,
    pub metadata_store: Option<ComponentHealth>,
}

#[derive(Debug, Serialize)]
pub struct ComponentHealth {
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ComponentHealth {
    fn from_result<E: std::fmt::Display>(result: Result<(), E>) -> Self {
        match result {
            Ok(()) => Self {
                healthy: true,
                error: None,
            },
            Err(e) => Self {
                healthy: false,
                error: Some(e.to_string()),
            },
        }
    }
}

/// GET /v1/health - Check the configured stores.
///
/// Unauthenticated so load balancers and health checkers can call it. 503 when any
/// configured store fails its check.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let blob_store = match &state.blobs {
        Some(blobs) => Some(ComponentHealth::from_result(blobs.health_check().await)),
        None => None,
    };
    let metadata_store = match &state.metadata {
        Some(metadata) => Some(ComponentHealth::from_result(metadata.health_check().await)),
        None => None,
    };

    let healthy = [&blob_store, &metadata_store]
        .into_iter()
        .flatten()
        .all(|c| c.healthy);
    if !healthy {
        tracing::warn!(?blob_store, ?metadata_store, "health check failed");
    }

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(HealthResponse {
            status: if healthy { "ok" } else { "unhealthy" },
            version: env!("CARGO_PKG_VERSION"),
            blob_store,
            metadata_store,
        }),
    )
}
