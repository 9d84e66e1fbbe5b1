//! Predicate parser registries.
//!
//! Two process-wide maps: predicate-type URI to [`PredicateParser`], and
//! attestor-type URI to [`AttestorParser`] for entries nested in an
//! attestation collection. Built-in parsers are present from first use;
//! more can be attached at startup with the `register_*` functions. A
//! missing key means only the generic statement and subject rows are written.

pub mod collection;
pub mod git;
pub mod omnitrail;
pub mod sarif;
pub mod vex;

use crate::error::MetadataResult;
use crate::tx::IngestTx;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock, PoisonError, RwLock};

/// Shreds a statement predicate into typed rows.
#[async_trait]
pub trait PredicateParser: Send + Sync {
    async fn parse(
        &self,
        tx: &mut IngestTx,
        statement_id: &str,
        predicate: &[u8],
    ) -> MetadataResult<()>;
}

/// Where a nested attestation sits.
#[derive(Debug, Clone, Copy)]
pub struct AttestorContext<'a> {
    pub statement_id: &'a str,
    pub attestation_id: &'a str,
    pub attestor_type: &'a str,
}

/// Shreds one attestor's output inside an attestation collection.
#[async_trait]
pub trait AttestorParser: Send + Sync {
    async fn parse(
        &self,
        tx: &mut IngestTx,
        ctx: AttestorContext<'_>,
        attestation: &[u8],
    ) -> MetadataResult<()>;
}

type Registry<P> = RwLock<HashMap<String, Arc<P>>>;

static PREDICATE_PARSERS: LazyLock<Registry<dyn PredicateParser>> = LazyLock::new(|| {
    let mut parsers: HashMap<String, Arc<dyn PredicateParser>> = HashMap::new();
    parsers.insert(
        collection::PREDICATE_TYPE.to_string(),
        Arc::new(collection::CollectionParser),
    );
    for uri in vex::PREDICATE_TYPES {
        parsers.insert(uri.to_string(), Arc::new(vex::VexParser));
    }
    RwLock::new(parsers)
});

static ATTESTOR_PARSERS: LazyLock<Registry<dyn AttestorParser>> = LazyLock::new(|| {
    let mut parsers: HashMap<String, Arc<dyn AttestorParser>> = HashMap::new();
    parsers.insert(git::ATTESTOR_TYPE.to_string(), Arc::new(git::GitParser));
    parsers.insert(sarif::ATTESTOR_TYPE.to_string(), Arc::new(sarif::SarifParser));
    parsers.insert(
        omnitrail::ATTESTOR_TYPE.to_string(),
        Arc::new(omnitrail::OmnitrailParser),
    );
    RwLock::new(parsers)
});

/// Attach a parser for a predicate type, replacing any existing one.
pub fn register_predicate_parser(predicate_type: &str, parser: Arc<dyn PredicateParser>) {
    PREDICATE_PARSERS
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(predicate_type.to_string(), parser);
}

/// Attach a parser for an attestor type, replacing any existing one.
pub fn register_attestor_parser(attestor_type: &str, parser: Arc<dyn AttestorParser>) {
    ATTESTOR_PARSERS
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(attestor_type.to_string(), parser);
}

pub fn predicate_parser(predicate_type: &str) -> Option<Arc<dyn PredicateParser>> {
    PREDICATE_PARSERS
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(predicate_type)
        .cloned()
}

pub fn attestor_parser(attestor_type: &str) -> Option<Arc<dyn AttestorParser>> {
    ATTESTOR_PARSERS
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(attestor_type)
        .cloned()
}
