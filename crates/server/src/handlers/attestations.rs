//! Upload and download of raw attestations.

use crate::error::{ApiError, ApiResult};
use crate::ingest;
use crate::state::AppState;
use axum::Json;
use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};

/// Upload response.
#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub gitoid: String,
}

/// POST /v1/upload - Store a DSSE envelope or Sigstore bundle.
///
/// Uploading bytes that are already stored succeeds with the existing gitoid.
pub async fn upload(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<UploadResponse>> {
    let receipt = ingest::upload(&state, body).await?;
    Ok(Json(UploadResponse {
        gitoid: receipt.gitoid,
    }))
}

/// GET /v1/download/{gitoid} - Stream the stored bytes for a gitoid.
pub async fn download(
    State(state): State<AppState>,
    Path(gitoid): Path<String>,
) -> ApiResult<Response> {
    let gitoid = gitoid.trim();
    if gitoid.is_empty() {
        return Err(ApiError::BadRequest("gitoid is required".to_string()));
    }
    let blobs = state
        .blobs
        .as_ref()
        .ok_or_else(|| ApiError::Internal("no blob store configured".to_string()))?;

    let stream = blobs.get_stream(gitoid).await?;
    let stream = stream.map_err(|e| {
        tracing::error!(error = %e, "download failed mid-transfer");
        std::io::Error::other(e.to_string())
    });

    Ok((
        StatusCode::OK,
        [(CONTENT_TYPE, "application/json")],
        Body::from_stream(stream),
    )
        .into_response())
}
