//! GraphQL endpoint and web client.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use async_graphql::http::GraphiQLSource;
use axum::Json;
use axum::extract::State;
use axum::response::Html;

/// POST /v1/query - Execute a GraphQL request.
pub async fn graphql_handler(
    State(state): State<AppState>,
    Json(request): Json<async_graphql::Request>,
) -> ApiResult<Json<async_graphql::Response>> {
    let schema = state
        .schema
        .as_ref()
        .ok_or_else(|| ApiError::Unavailable("GraphQL is disabled".to_string()))?;
    Ok(Json(schema.execute(request).await))
}

/// GET /v1/query - Interactive GraphQL client.
pub async fn graphql_playground() -> Html<String> {
    Html(GraphiQLSource::build().endpoint("/v1/query").finish())
}
