//! Route configuration.

use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method};
use axum::routing::{get, post};
use std::time::Duration;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let upload_limit = DefaultBodyLimit::max(state.upload_body_limit());

    let mut router = Router::new()
        .route("/v1/upload", post(handlers::upload).layer(upload_limit))
        .route("/v1/download/{gitoid}", get(handlers::download))
        .route("/v1/export/{gitoid}", get(handlers::export))
        .route("/v1/health", get(handlers::health_check))
        // Deprecated unversioned paths
        .route("/upload", post(handlers::upload).layer(upload_limit))
        .route("/download/{gitoid}", get(handlers::download));

    if state.schema.is_some() {
        let query = if state.config.graphql_web_client_enable {
            get(handlers::graphql_playground).post(handlers::graphql_handler)
        } else {
            post(handlers::graphql_handler)
        };
        router = router
            .route("/v1/query", query)
            .route("/query", post(handlers::graphql_handler));
    }

    // Unauthenticated; restrict at the network layer.
    if state.config.enable_metrics {
        router = router.route("/metrics", get(metrics_handler));
    }

    let timeout = Duration::from_secs(state.config.read_timeout + state.config.write_timeout);

    router
        .layer(cors_layer(&state.config.cors_allow_origins))
        .layer(TimeoutLayer::new(timeout))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    if origins.iter().any(|o| o.trim() == "*") {
        return layer.allow_origin(Any);
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin.trim()) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(allowed))
}
