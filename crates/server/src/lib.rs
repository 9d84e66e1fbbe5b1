//! HTTP and GraphQL API for the Archivista attestation store.
//!
//! This crate provides:
//! - Upload of DSSE envelopes and Sigstore bundles
//! - Download and bundle export by gitoid
//! - A GraphQL read API over the metadata store
//! - Downstream publishers notified after each new upload

pub mod error;
pub mod graphql;
pub mod handlers;
pub mod ingest;
pub mod metrics;
pub mod publisher;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use ingest::{IngestOutcome, IngestReceipt};
pub use routes::create_router;
pub use state::AppState;
