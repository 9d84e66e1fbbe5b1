//! Relational metadata store for Archivista.
//!
//! Every ingested envelope is shredded into rows:
//! - the DSSE envelope, its signatures, timestamps and payload digests
//! - the in-toto statement with its subjects and subject digests
//! - typed predicate rows written by registered parsers
//!
//! The same schema runs on SQLite, Postgres and MySQL through sqlx's `Any`
//! driver. Reads back the GraphQL API and bundle export.

pub mod dialect;
pub mod error;
pub mod iam;
pub mod ingest;
pub mod models;
pub mod parsers;
pub mod query;
pub mod repos;
pub mod store;
pub mod tx;

pub use error::{MetadataError, MetadataResult};
pub use query::{Connection, Edge, Page, PageInfo};
pub use repos::{EnvelopeRepo, IngestRepo, PredicateRepo, StatementRepo, StoredEnvelope};
pub use store::{MetadataStore, SqlStore};
pub use tx::IngestTx;

use archivista_core::BundleLimits;
use archivista_core::config::MetadataConfig;
use std::sync::Arc;

/// Create a metadata store from configuration.
pub async fn from_config(
    config: &MetadataConfig,
    limits: BundleLimits,
) -> MetadataResult<Arc<dyn MetadataStore>> {
    let store = SqlStore::connect(config).await?.with_bundle_limits(limits);
    Ok(Arc::new(store))
}
