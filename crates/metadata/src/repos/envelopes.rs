//! Envelope repository.

use crate::error::MetadataResult;
use crate::models::{DsseRow, PayloadDigestRow, SignatureRow, SigstoreBundleRow, TimestampRow};
use crate::query::{Connection, DsseFilter, Page};
use archivista_core::{Envelope, Signature, SignatureTimestamp};
use async_trait::async_trait;

/// An envelope rebuilt from its rows and stored payload.
#[derive(Debug, Clone)]
pub struct StoredEnvelope {
    pub dsse: DsseRow,
    pub envelope: Envelope,
    pub bundle: Option<SigstoreBundleRow>,
}

/// Read access to envelopes and their signatures.
#[async_trait]
pub trait EnvelopeRepo: Send + Sync {
    async fn get_dsse(&self, id: &str) -> MetadataResult<Option<DsseRow>>;

    async fn get_dsse_by_gitoid(&self, gitoid: &str) -> MetadataResult<Option<DsseRow>>;

    /// Page through envelopes matching `filter`, ordered by id.
    async fn list_dsses(&self, filter: &DsseFilter, page: &Page)
    -> MetadataResult<Connection<DsseRow>>;

    async fn dsses_for_statement(&self, statement_id: &str) -> MetadataResult<Vec<DsseRow>>;

    async fn signatures_for_dsse(&self, dsse_id: &str) -> MetadataResult<Vec<SignatureRow>>;

    async fn timestamps_for_signature(
        &self,
        signature_id: &str,
    ) -> MetadataResult<Vec<TimestampRow>>;

    async fn payload_digests_for_dsse(
        &self,
        dsse_id: &str,
    ) -> MetadataResult<Vec<PayloadDigestRow>>;

    async fn bundle_for_dsse(&self, dsse_id: &str) -> MetadataResult<Option<SigstoreBundleRow>>;

    /// Rebuild an envelope from its rows.
    ///
    /// The payload is not kept in the database; callers pass the bytes read
    /// from the blob store. Signatures come back in insertion order with
    /// their certificates, intermediates and timestamp tokens.
    async fn load_envelope(
        &self,
        gitoid: &str,
        payload: Vec<u8>,
    ) -> MetadataResult<Option<StoredEnvelope>> {
        let Some(dsse) = self.get_dsse_by_gitoid(gitoid).await? else {
            return Ok(None);
        };

        let mut signatures = Vec::new();
        for row in self.signatures_for_dsse(&dsse.id).await? {
            let timestamps = self
                .timestamps_for_signature(&row.id)
                .await?
                .into_iter()
                .map(|ts| SignatureTimestamp {
                    kind: ts.timestamp_type,
                    data: ts.data,
                })
                .collect();
            signatures.push(Signature {
                key_id: row.key_id.clone(),
                signature: row.signature_bytes()?,
                certificate: row.certificate.clone().unwrap_or_default(),
                intermediates: row.intermediate_certs()?,
                timestamps,
            });
        }

        let bundle = self.bundle_for_dsse(&dsse.id).await?;
        let envelope = Envelope {
            payload,
            payload_type: dsse.payload_type.clone(),
            signatures,
        };
        Ok(Some(StoredEnvelope {
            dsse,
            envelope,
            bundle,
        }))
    }
}
