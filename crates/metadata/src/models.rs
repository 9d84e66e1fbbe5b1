//! Database rows mapping to the metadata schema.
//!
//! Identifiers are UUIDv7 strings so they sort by creation time and work
//! unchanged across SQLite, Postgres and MySQL.

use crate::error::{MetadataError, MetadataResult};
use archivista_core::encoding::{b64_decode, b64_encode};
use sqlx::FromRow;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

/// Generate a new row identifier.
pub fn new_id() -> String {
    Uuid::now_v7().to_string()
}

/// Render an instant the way it is stored.
pub fn format_instant(instant: OffsetDateTime) -> MetadataResult<String> {
    instant
        .format(&Rfc3339)
        .map_err(|e| MetadataError::MalformedTimestamp(e.to_string()))
}

/// Parse a stored instant.
pub fn parse_instant(value: &str) -> MetadataResult<OffsetDateTime> {
    OffsetDateTime::parse(value, &Rfc3339)
        .map_err(|e| MetadataError::MalformedTimestamp(format!("{value}: {e}")))
}

// =============================================================================
// Envelopes
// =============================================================================

/// One ingested DSSE envelope.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct DsseRow {
    pub id: String,
    pub gitoid_sha256: String,
    pub payload_type: String,
    pub statement_id: Option<String>,
}

/// A signature over an envelope, with its certificate chain.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct SignatureRow {
    pub id: String,
    pub dsse_id: String,
    pub key_id: String,
    /// Base64 of the raw signature bytes.
    pub signature: String,
    /// DER leaf certificate.
    pub certificate: Option<Vec<u8>>,
    /// JSON array of base64 DER certificates, leaf side first.
    pub intermediates: Option<String>,
}

impl SignatureRow {
    /// Raw signature bytes.
    pub fn signature_bytes(&self) -> MetadataResult<Vec<u8>> {
        b64_decode(&self.signature).map_err(|e| {
            MetadataError::Payload(archivista_core::Error::InvalidBase64 {
                field: "signature".to_string(),
                reason: e.to_string(),
            })
        })
    }

    /// Decoded intermediates in chain order.
    pub fn intermediate_certs(&self) -> MetadataResult<Vec<Vec<u8>>> {
        let Some(raw) = self.intermediates.as_deref() else {
            return Ok(Vec::new());
        };
        let encoded: Vec<String> = serde_json::from_str(raw)?;
        encoded
            .iter()
            .map(|cert| {
                b64_decode(cert).map_err(|e| {
                    MetadataError::Payload(archivista_core::Error::InvalidBase64 {
                        field: "intermediates".to_string(),
                        reason: e.to_string(),
                    })
                })
            })
            .collect()
    }

    /// Encode intermediates for storage. An empty chain is stored as NULL.
    pub fn encode_intermediates(certs: &[Vec<u8>]) -> MetadataResult<Option<String>> {
        if certs.is_empty() {
            return Ok(None);
        }
        let encoded: Vec<String> = certs.iter().map(|c| b64_encode(c)).collect();
        Ok(Some(serde_json::to_string(&encoded)?))
    }
}

/// A timestamp token attached to a signature.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct TimestampRow {
    pub id: String,
    pub signature_id: String,
    #[sqlx(rename = "type")]
    pub timestamp_type: String,
    pub data: Vec<u8>,
    /// RFC3339 UTC instant extracted from the token.
    pub timestamp: String,
}

/// A digest of the envelope payload.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct PayloadDigestRow {
    pub id: String,
    pub dsse_id: String,
    pub algorithm: String,
    pub value: String,
}

/// Bundle metadata for envelopes that arrived as Sigstore bundles.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct SigstoreBundleRow {
    pub id: String,
    pub gitoid_sha256: String,
    pub media_type: String,
    pub version: Option<String>,
    pub created_at: String,
    pub dsse_id: String,
}

// =============================================================================
// Statements
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct StatementRow {
    pub id: String,
    pub predicate: String,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct SubjectRow {
    pub id: String,
    pub statement_id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct SubjectDigestRow {
    pub id: String,
    pub subject_id: String,
    pub algorithm: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct AttestationCollectionRow {
    pub id: String,
    pub statement_id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct AttestationRow {
    pub id: String,
    pub attestation_collection_id: String,
    #[sqlx(rename = "type")]
    pub attestation_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct AttestationPolicyRow {
    pub id: String,
    pub statement_id: String,
    pub name: String,
}

// =============================================================================
// Predicate rows
// =============================================================================

/// Commit facts from a Git attestor. List and map fields are JSON text.
#[derive(Debug, Clone, Default, PartialEq, Eq, FromRow)]
pub struct GitAttestationRow {
    pub id: String,
    pub attestation_id: String,
    pub commit_hash: String,
    pub author: String,
    pub author_email: String,
    pub committer_name: String,
    pub committer_email: String,
    pub commit_date: String,
    pub commit_message: String,
    pub status: String,
    pub commit_type: String,
    pub commit_digest: String,
    pub signature: String,
    pub parent_hashes: String,
    pub tree_hash: String,
    pub refs: String,
    pub remotes: String,
}

impl GitAttestationRow {
    pub fn parent_hash_list(&self) -> Vec<String> {
        serde_json::from_str(&self.parent_hashes).unwrap_or_default()
    }

    pub fn ref_list(&self) -> Vec<String> {
        serde_json::from_str(&self.refs).unwrap_or_default()
    }

    pub fn remote_list(&self) -> Vec<String> {
        serde_json::from_str(&self.remotes).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct SarifRow {
    pub id: String,
    pub statement_id: String,
    pub attestation_id: Option<String>,
    pub report_file_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct SarifRuleRow {
    pub id: String,
    pub sarif_id: String,
    pub rule_id: String,
    pub rule_name: String,
    pub short_description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct OmnitrailRow {
    pub id: String,
    pub attestation_id: String,
}

/// One path in an OmniTrail file tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, FromRow)]
pub struct MappingRow {
    pub id: String,
    pub omnitrail_id: String,
    pub path: String,
    #[sqlx(rename = "type")]
    pub mapping_type: String,
    pub sha1: Option<String>,
    pub sha256: Option<String>,
    pub gitoid_sha1: Option<String>,
    pub gitoid_sha256: Option<String>,
}

/// POSIX file attributes of a mapping, kept as the attestor reported them.
#[derive(Debug, Clone, Default, PartialEq, Eq, FromRow)]
pub struct PosixRow {
    pub id: String,
    pub mapping_id: String,
    pub atime: Option<String>,
    pub ctime: Option<String>,
    pub creation_time: Option<String>,
    pub extended_attributes: Option<String>,
    pub file_device_id: Option<String>,
    pub file_flags: Option<String>,
    pub file_inode: Option<String>,
    pub file_system_id: Option<String>,
    pub file_type: Option<String>,
    pub hard_link_count: Option<String>,
    pub mtime: Option<String>,
    pub metadata_ctime: Option<String>,
    pub owner_gid: Option<String>,
    pub owner_uid: Option<String>,
    pub permissions: Option<String>,
    pub size: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct VexDocumentRow {
    pub id: String,
    pub statement_id: String,
    pub vex_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct VexStatementRow {
    pub id: String,
    pub vex_document_id: String,
    pub vuln_id: String,
}
