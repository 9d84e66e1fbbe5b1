//! Archivista server binary.

use anyhow::{Context, Result};
use archivista_core::config::{AppConfig, ListenAddr, StorageConfig};
use archivista_server::{AppState, create_router};
use axum::Router;
use clap::Parser;
use std::path::PathBuf;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Archivista - an attestation store
#[derive(Parser, Debug)]
#[command(name = "archivista")]
#[command(version, about, long_about = None)]
struct Args {
    /// Optional TOML configuration file, merged under environment variables
    #[arg(short, long, env = "ARCHIVISTA_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // The log level is itself configuration; peek at it before the full load
    // so warnings emitted while loading are not lost.
    let default_filter = AppConfig::figment(args.config.as_deref())
        .extract::<AppConfig>()
        .map(|c| c.log_filter())
        .unwrap_or_else(|_| "info,tower_http=info".to_string());
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Archivista v{}", env!("CARGO_PKG_VERSION"));

    let config =
        AppConfig::load(args.config.as_deref()).context("failed to load configuration")?;

    if config.enable_spiffe {
        tracing::warn!(
            spiffe_address = %config.spiffe_address,
            "SPIFFE mTLS is not supported by this build, serving without it"
        );
    }

    archivista_server::metrics::register_metrics();

    let storage_config = config.storage().context("invalid storage configuration")?;
    let blobs = archivista_storage::from_config(&storage_config)
        .await
        .context("failed to initialize blob store")?;
    match &blobs {
        Some(store) => {
            store
                .health_check()
                .await
                .context("blob store health check failed")?;
            tracing::info!(backend = store.backend_name(), "blob store ready");
        }
        None => tracing::warn!("no blob store configured, uploads will not be downloadable"),
    }

    let metadata = match config.metadata().context("invalid SQL store configuration")? {
        Some(metadata_config) => {
            let store = archivista_metadata::from_config(&metadata_config, config.bundle_limits())
                .await
                .context("failed to initialize metadata store")?;
            tracing::info!(
                backend = metadata_config.backend.dialect.as_str(),
                "metadata store ready"
            );
            Some(store)
        }
        None => {
            tracing::warn!("SQL store disabled, uploads will not be indexed");
            None
        }
    };

    if !config.file_serve_on.is_empty() {
        if let StorageConfig::Filesystem { path } = &storage_config {
            spawn_file_server(config.file_serve_on.clone(), path.clone()).await?;
        } else {
            tracing::warn!("FILE_SERVE_ON is only used with the FILE storage backend");
        }
    }

    let listen = config.listen_addr()?;
    let state = AppState::new(config, blobs, metadata);
    for publisher in state.publishers.iter() {
        tracing::info!(publisher = publisher.name(), "publisher enabled");
    }
    let app = create_router(state);

    match listen {
        ListenAddr::Tcp(addr) => {
            let listener = tokio::net::TcpListener::bind(&addr)
                .await
                .with_context(|| format!("failed to bind to {addr}"))?;
            tracing::info!("Listening on {}", listener.local_addr()?);
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }
        ListenAddr::Unix(path) => {
            // A socket left behind by a previous run blocks the bind.
            if path.exists() {
                tokio::fs::remove_file(&path)
                    .await
                    .with_context(|| format!("failed to remove stale socket {}", path.display()))?;
            }
            let listener = tokio::net::UnixListener::bind(&path)
                .with_context(|| format!("failed to bind to {}", path.display()))?;
            tracing::info!("Listening on unix://{}", path.display());
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }
    }

    tracing::info!("shut down");
    Ok(())
}

/// Serve the filesystem blob directory read-only on a second address.
async fn spawn_file_server(addr: String, dir: PathBuf) -> Result<()> {
    let addr = addr.strip_prefix("tcp://").unwrap_or(&addr).to_string();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind file server to {addr}"))?;
    tracing::info!(dir = %dir.display(), "serving blob files on {}", listener.local_addr()?);

    let app = Router::new()
        .fallback_service(ServeDir::new(dir))
        .layer(TraceLayer::new_for_http());
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "file server stopped");
        }
    });
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
