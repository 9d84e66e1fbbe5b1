//! Bundle export.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use archivista_core::Envelope;
use archivista_core::export::{full_envelope, reconstruct_bundle, reconstruct_bundle_with_media_type};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// A Sigstore bundle with the first signature.
    #[default]
    Bundle,
    /// The stored envelope with every signature.
    Dsse,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExportParams {
    #[serde(default)]
    pub format: ExportFormat,
}

/// GET /v1/export/{gitoid} - Rebuild a stored attestation for verifiers.
///
/// Signatures, certificates and timestamps come from the metadata rows; the
/// payload comes from the blob store.
pub async fn export(
    State(state): State<AppState>,
    Path(gitoid): Path<String>,
    Query(params): Query<ExportParams>,
) -> ApiResult<Response> {
    let gitoid = gitoid.trim();
    if gitoid.is_empty() {
        return Err(ApiError::BadRequest("gitoid is required".to_string()));
    }
    let (Some(blobs), Some(metadata)) = (&state.blobs, &state.metadata) else {
        return Err(ApiError::Unavailable(
            "export needs both a blob store and a metadata store".to_string(),
        ));
    };

    if metadata.get_dsse_by_gitoid(gitoid).await?.is_none() {
        return Err(ApiError::NotFound(format!("no envelope with gitoid {gitoid}")));
    }
    let stored = blobs.get(gitoid).await?;
    let envelope = Envelope::from_json(&stored)?;
    let loaded = metadata
        .load_envelope(gitoid, envelope.payload)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("no envelope with gitoid {gitoid}")))?;

    let body = match params.format {
        ExportFormat::Dsse => full_envelope(&loaded.envelope)?,
        ExportFormat::Bundle => {
            let bundle = match &loaded.bundle {
                Some(row) => reconstruct_bundle_with_media_type(&loaded.envelope, &row.media_type),
                None => reconstruct_bundle(&loaded.envelope),
            };
            bundle.to_json()?
        }
    };
    tracing::debug!(gitoid = %gitoid, format = ?params.format, "exported attestation");

    Ok((StatusCode::OK, [(CONTENT_TYPE, "application/json")], body).into_response())
}
