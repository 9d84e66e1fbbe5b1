//! `where` arguments.
//!
//! Each input maps one-to-one onto a metadata filter. Edge predicates
//! (`has*With`) nest, so a query can filter envelopes by a subject digest
//! three hops away.

use archivista_metadata::query::{
    AttestationFilter, CollectionFilter, DigestFilter, DsseFilter, PolicyFilter, SignatureFilter,
    StatementFilter, SubjectFilter,
};
use async_graphql::InputObject;

#[derive(InputObject, Default)]
pub struct DsseWhereInput {
    pub id: Option<String>,
    pub gitoid_sha256: Option<String>,
    pub payload_type: Option<String>,
    pub has_statement_with: Option<Box<StatementWhereInput>>,
    pub has_signatures_with: Option<SignatureWhereInput>,
    pub has_payload_digests_with: Option<DigestWhereInput>,
}

#[derive(InputObject, Default)]
pub struct StatementWhereInput {
    pub id: Option<String>,
    pub predicate: Option<String>,
    pub has_subjects_with: Option<Box<SubjectWhereInput>>,
    pub has_attestation_collections_with: Option<AttestationCollectionWhereInput>,
    pub has_policy_with: Option<AttestationPolicyWhereInput>,
    pub has_dsse_with: Option<Box<DsseWhereInput>>,
}

#[derive(InputObject, Default)]
pub struct SubjectWhereInput {
    pub id: Option<String>,
    pub name: Option<String>,
    pub name_contains: Option<String>,
    pub has_subject_digests_with: Option<DigestWhereInput>,
    pub has_statement_with: Option<Box<StatementWhereInput>>,
}

/// Shared by subject digests and payload digests.
#[derive(InputObject, Default)]
pub struct DigestWhereInput {
    pub algorithm: Option<String>,
    pub value: Option<String>,
}

#[derive(InputObject, Default)]
pub struct SignatureWhereInput {
    #[graphql(name = "keyID")]
    pub key_id: Option<String>,
}

#[derive(InputObject, Default)]
pub struct AttestationCollectionWhereInput {
    pub name: Option<String>,
    pub has_attestations_with: Option<AttestationWhereInput>,
}

#[derive(InputObject, Default)]
pub struct AttestationWhereInput {
    #[graphql(name = "type")]
    pub attestation_type: Option<String>,
}

#[derive(InputObject, Default)]
pub struct AttestationPolicyWhereInput {
    pub name: Option<String>,
}

impl From<DsseWhereInput> for DsseFilter {
    fn from(input: DsseWhereInput) -> Self {
        Self {
            id: input.id,
            gitoid_sha256: input.gitoid_sha256,
            payload_type: input.payload_type,
            has_statement_with: input.has_statement_with.map(|s| Box::new((*s).into())),
            has_signatures_with: input.has_signatures_with.map(|s| Box::new(s.into())),
            has_payload_digests_with: input.has_payload_digests_with.map(|d| Box::new(d.into())),
        }
    }
}

impl From<StatementWhereInput> for StatementFilter {
    fn from(input: StatementWhereInput) -> Self {
        Self {
            id: input.id,
            predicate: input.predicate,
            has_subjects_with: input.has_subjects_with.map(|s| Box::new((*s).into())),
            has_attestation_collections_with: input
                .has_attestation_collections_with
                .map(|c| Box::new(c.into())),
            has_policy_with: input.has_policy_with.map(|p| Box::new(p.into())),
            has_dsse_with: input.has_dsse_with.map(|d| Box::new((*d).into())),
        }
    }
}

impl From<SubjectWhereInput> for SubjectFilter {
    fn from(input: SubjectWhereInput) -> Self {
        Self {
            id: input.id,
            name: input.name,
            name_contains: input.name_contains,
            has_subject_digests_with: input.has_subject_digests_with.map(|d| Box::new(d.into())),
            has_statement_with: input.has_statement_with.map(|s| Box::new((*s).into())),
        }
    }
}

impl From<DigestWhereInput> for DigestFilter {
    fn from(input: DigestWhereInput) -> Self {
        Self {
            algorithm: input.algorithm,
            value: input.value,
        }
    }
}

impl From<SignatureWhereInput> for SignatureFilter {
    fn from(input: SignatureWhereInput) -> Self {
        Self {
            key_id: input.key_id,
        }
    }
}

impl From<AttestationCollectionWhereInput> for CollectionFilter {
    fn from(input: AttestationCollectionWhereInput) -> Self {
        Self {
            name: input.name,
            has_attestations_with: input.has_attestations_with.map(|a| Box::new(a.into())),
        }
    }
}

impl From<AttestationWhereInput> for AttestationFilter {
    fn from(input: AttestationWhereInput) -> Self {
        Self {
            attestation_type: input.attestation_type,
        }
    }
}

impl From<AttestationPolicyWhereInput> for PolicyFilter {
    fn from(input: AttestationPolicyWhereInput) -> Self {
        Self { name: input.name }
    }
}
