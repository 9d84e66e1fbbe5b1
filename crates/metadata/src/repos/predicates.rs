//! Predicate repository.
//!
//! Typed rows written by the attestor parsers, keyed by attestation.

use crate::error::MetadataResult;
use crate::models::{
    GitAttestationRow, MappingRow, OmnitrailRow, PosixRow, SarifRow, SarifRuleRow,
};
use async_trait::async_trait;

#[async_trait]
pub trait PredicateRepo: Send + Sync {
    async fn git_attestation(
        &self,
        attestation_id: &str,
    ) -> MetadataResult<Option<GitAttestationRow>>;

    async fn sarif_for_attestation(&self, attestation_id: &str)
    -> MetadataResult<Option<SarifRow>>;

    async fn sarif_rules(&self, sarif_id: &str) -> MetadataResult<Vec<SarifRuleRow>>;

    async fn omnitrail(&self, attestation_id: &str) -> MetadataResult<Option<OmnitrailRow>>;

    async fn mappings(&self, omnitrail_id: &str) -> MetadataResult<Vec<MappingRow>>;

    async fn posix(&self, mapping_id: &str) -> MetadataResult<Option<PosixRow>>;
}
