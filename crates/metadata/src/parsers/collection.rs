//! Attestation collections: a named group of attestor outputs.

use super::{AttestorContext, PredicateParser, attestor_parser};
use crate::error::MetadataResult;
use crate::tx::IngestTx;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::value::RawValue;

pub const PREDICATE_TYPE: &str = "https://witness.testifysec.com/attestation-collection/v0.1";

#[derive(Debug, Default, Deserialize)]
struct Collection {
    #[serde(default)]
    name: String,
    #[serde(default)]
    attestations: Vec<CollectionEntry>,
}

#[derive(Debug, Deserialize)]
struct CollectionEntry {
    #[serde(rename = "type", default)]
    attestor_type: String,
    #[serde(default)]
    attestation: Option<Box<RawValue>>,
}

pub struct CollectionParser;

#[async_trait]
impl PredicateParser for CollectionParser {
    async fn parse(
        &self,
        tx: &mut IngestTx,
        statement_id: &str,
        predicate: &[u8],
    ) -> MetadataResult<()> {
        let collection: Collection =
            serde_json::from_slice::<Option<Collection>>(predicate)?.unwrap_or_default();

        let collection_id = tx
            .insert_attestation_collection(statement_id, &collection.name)
            .await?;

        for entry in &collection.attestations {
            let attestation_id = tx
                .insert_attestation(&collection_id, &entry.attestor_type)
                .await?;

            let Some(parser) = attestor_parser(&entry.attestor_type) else {
                continue;
            };
            let raw = entry
                .attestation
                .as_deref()
                .map(|raw| raw.get().as_bytes())
                .unwrap_or(b"null");
            let ctx = AttestorContext {
                statement_id,
                attestation_id: &attestation_id,
                attestor_type: &entry.attestor_type,
            };
            if let Err(e) = parser.parse(tx, ctx, raw).await {
                tracing::error!(
                    attestor_type = %entry.attestor_type,
                    error = %e,
                    "failed to parse attestation"
                );
                return Err(e);
            }
        }

        tracing::debug!(
            name = %collection.name,
            attestations = collection.attestations.len(),
            "stored attestation collection"
        );
        Ok(())
    }
}
