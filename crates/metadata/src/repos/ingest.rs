//! Ingest repository.

use crate::error::MetadataResult;
use archivista_core::{Bundle, Envelope, Payload};
use async_trait::async_trait;

/// Writes and removes envelopes.
#[async_trait]
pub trait IngestRepo: Send + Sync {
    /// Classify raw upload bytes and store them.
    ///
    /// Bundles carrying only a message signature are logged and skipped.
    async fn store(&self, gitoid: &str, raw: &[u8]) -> MetadataResult<()>;

    /// Store an already classified upload.
    async fn store_payload(&self, gitoid: &str, payload: &Payload) -> MetadataResult<()>;

    /// Store one envelope in a single transaction.
    ///
    /// `bundle` is set when the envelope arrived as a Sigstore bundle; its
    /// media type and version are recorded next to the envelope. Returns
    /// `MetadataError::Duplicate` if the gitoid is already present, in which
    /// case nothing is written.
    async fn store_envelope(
        &self,
        gitoid: &str,
        envelope: &Envelope,
        bundle: Option<&Bundle>,
    ) -> MetadataResult<()>;

    /// Remove an envelope and everything only it references.
    ///
    /// Returns `Ok(false)` if the gitoid is unknown.
    async fn delete_dsse(&self, gitoid: &str) -> MetadataResult<bool>;
}
