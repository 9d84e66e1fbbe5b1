//! GraphQL object types.
//!
//! Objects wrap metadata rows and resolve their edges lazily through the
//! store in the schema context.

use super::store;
use archivista_core::encoding::b64_encode;
use archivista_metadata::models::{
    AttestationCollectionRow, AttestationPolicyRow, AttestationRow, DsseRow, GitAttestationRow,
    MappingRow, OmnitrailRow, PayloadDigestRow, PosixRow, SarifRow, SarifRuleRow, SignatureRow,
    SigstoreBundleRow, StatementRow, SubjectDigestRow, SubjectRow, TimestampRow, VexDocumentRow,
    VexStatementRow,
};
use archivista_metadata::query;
use async_graphql::{Context, ID, Object, Result, SimpleObject};

/// Relay page information.
#[derive(SimpleObject, Clone, Default)]
pub struct PageInfo {
    pub has_next_page: bool,
    pub has_previous_page: bool,
    pub start_cursor: Option<String>,
    pub end_cursor: Option<String>,
}

impl From<query::PageInfo> for PageInfo {
    fn from(info: query::PageInfo) -> Self {
        Self {
            has_next_page: info.has_next_page,
            has_previous_page: info.has_previous_page,
            start_cursor: info.start_cursor,
            end_cursor: info.end_cursor,
        }
    }
}

macro_rules! connection {
    ($conn:ident, $edge:ident, $node:ident, $row:ty) => {
        #[derive(SimpleObject)]
        pub struct $edge {
            pub node: $node,
            pub cursor: String,
        }

        #[derive(SimpleObject)]
        pub struct $conn {
            pub edges: Vec<$edge>,
            pub page_info: PageInfo,
            pub total_count: i32,
        }

        impl From<query::Connection<$row>> for $conn {
            fn from(conn: query::Connection<$row>) -> Self {
                Self {
                    edges: conn
                        .edges
                        .into_iter()
                        .map(|edge| $edge {
                            node: $node(edge.node),
                            cursor: edge.cursor,
                        })
                        .collect(),
                    page_info: conn.page_info.into(),
                    total_count: i32::try_from(conn.total_count).unwrap_or(i32::MAX),
                }
            }
        }
    };
}

connection!(DsseConnection, DsseEdge, Dsse, DsseRow);
connection!(StatementConnection, StatementEdge, Statement, StatementRow);
connection!(SubjectConnection, SubjectEdge, Subject, SubjectRow);

/// A stored DSSE envelope.
pub struct Dsse(pub DsseRow);

#[Object]
impl Dsse {
    async fn id(&self) -> ID {
        ID(self.0.id.clone())
    }

    async fn gitoid_sha256(&self) -> &str {
        &self.0.gitoid_sha256
    }

    async fn payload_type(&self) -> &str {
        &self.0.payload_type
    }

    async fn statement(&self, ctx: &Context<'_>) -> Result<Option<Statement>> {
        let Some(id) = &self.0.statement_id else {
            return Ok(None);
        };
        Ok(store(ctx)?.get_statement(id).await?.map(Statement))
    }

    async fn signatures(&self, ctx: &Context<'_>) -> Result<Vec<Signature>> {
        let rows = store(ctx)?.signatures_for_dsse(&self.0.id).await?;
        Ok(rows.into_iter().map(Signature).collect())
    }

    async fn payload_digests(&self, ctx: &Context<'_>) -> Result<Vec<PayloadDigest>> {
        let rows = store(ctx)?.payload_digests_for_dsse(&self.0.id).await?;
        Ok(rows.into_iter().map(PayloadDigest::from).collect())
    }

    /// Set when the envelope was uploaded inside a Sigstore bundle.
    async fn sigstore_bundle(&self, ctx: &Context<'_>) -> Result<Option<SigstoreBundle>> {
        let row = store(ctx)?.bundle_for_dsse(&self.0.id).await?;
        Ok(row.map(SigstoreBundle::from))
    }
}

pub struct Signature(pub SignatureRow);

#[Object]
impl Signature {
    async fn id(&self) -> ID {
        ID(self.0.id.clone())
    }

    #[graphql(name = "keyID")]
    async fn key_id(&self) -> &str {
        &self.0.key_id
    }

    /// Base64 signature bytes.
    async fn signature(&self) -> &str {
        &self.0.signature
    }

    /// Base64 DER leaf certificate.
    async fn certificate(&self) -> Option<String> {
        self.0.certificate.as_deref().map(b64_encode)
    }

    /// Base64 DER intermediates, leaf side first.
    async fn intermediates(&self) -> Result<Vec<String>> {
        let certs = self.0.intermediate_certs()?;
        Ok(certs.iter().map(|c| b64_encode(c)).collect())
    }

    async fn timestamps(&self, ctx: &Context<'_>) -> Result<Vec<Timestamp>> {
        let rows = store(ctx)?.timestamps_for_signature(&self.0.id).await?;
        Ok(rows.into_iter().map(Timestamp::from).collect())
    }

    async fn dsse(&self, ctx: &Context<'_>) -> Result<Option<Dsse>> {
        Ok(store(ctx)?.get_dsse(&self.0.dsse_id).await?.map(Dsse))
    }
}

#[derive(SimpleObject)]
pub struct Timestamp {
    pub id: ID,
    #[graphql(name = "type")]
    pub timestamp_type: String,
    /// RFC3339 instant the token attests to.
    pub timestamp: String,
}

impl From<TimestampRow> for Timestamp {
    fn from(row: TimestampRow) -> Self {
        Self {
            id: ID(row.id),
            timestamp_type: row.timestamp_type,
            timestamp: row.timestamp,
        }
    }
}

#[derive(SimpleObject)]
pub struct PayloadDigest {
    pub id: ID,
    pub algorithm: String,
    pub value: String,
}

impl From<PayloadDigestRow> for PayloadDigest {
    fn from(row: PayloadDigestRow) -> Self {
        Self {
            id: ID(row.id),
            algorithm: row.algorithm,
            value: row.value,
        }
    }
}

#[derive(SimpleObject)]
pub struct SigstoreBundle {
    pub id: ID,
    pub gitoid_sha256: String,
    pub media_type: String,
    pub version: Option<String>,
    pub created_at: String,
}

impl From<SigstoreBundleRow> for SigstoreBundle {
    fn from(row: SigstoreBundleRow) -> Self {
        Self {
            id: ID(row.id),
            gitoid_sha256: row.gitoid_sha256,
            media_type: row.media_type,
            version: row.version,
            created_at: row.created_at,
        }
    }
}

/// An in-toto statement or a witness policy.
pub struct Statement(pub StatementRow);

#[Object]
impl Statement {
    async fn id(&self) -> ID {
        ID(self.0.id.clone())
    }

    async fn predicate(&self) -> &str {
        &self.0.predicate
    }

    async fn subjects(
        &self,
        ctx: &Context<'_>,
        after: Option<String>,
        first: Option<i32>,
        before: Option<String>,
        last: Option<i32>,
    ) -> Result<SubjectConnection> {
        let page = super::page(after, first, before, last)?;
        let conn = store(ctx)?.subjects_for_statement(&self.0.id, &page).await?;
        Ok(conn.into())
    }

    async fn attestation_collections(
        &self,
        ctx: &Context<'_>,
    ) -> Result<Option<AttestationCollection>> {
        let row = store(ctx)?.collection_for_statement(&self.0.id).await?;
        Ok(row.map(AttestationCollection))
    }

    async fn policy(&self, ctx: &Context<'_>) -> Result<Option<AttestationPolicy>> {
        let row = store(ctx)?.policy_for_statement(&self.0.id).await?;
        Ok(row.map(AttestationPolicy::from))
    }

    async fn dsse(&self, ctx: &Context<'_>) -> Result<Vec<Dsse>> {
        let rows = store(ctx)?.dsses_for_statement(&self.0.id).await?;
        Ok(rows.into_iter().map(Dsse).collect())
    }

    async fn sarif(&self, ctx: &Context<'_>) -> Result<Vec<Sarif>> {
        let rows = store(ctx)?.sarifs_for_statement(&self.0.id).await?;
        Ok(rows.into_iter().map(Sarif).collect())
    }

    async fn vex_documents(&self, ctx: &Context<'_>) -> Result<Vec<VexDocument>> {
        let rows = store(ctx)?.vex_documents_for_statement(&self.0.id).await?;
        Ok(rows.into_iter().map(VexDocument).collect())
    }
}

pub struct Subject(pub SubjectRow);

#[Object]
impl Subject {
    async fn id(&self) -> ID {
        ID(self.0.id.clone())
    }

    async fn name(&self) -> &str {
        &self.0.name
    }

    async fn subject_digests(&self, ctx: &Context<'_>) -> Result<Vec<SubjectDigest>> {
        let rows = store(ctx)?.subject_digests(&self.0.id).await?;
        Ok(rows.into_iter().map(SubjectDigest::from).collect())
    }

    async fn statement(&self, ctx: &Context<'_>) -> Result<Option<Statement>> {
        let row = store(ctx)?.get_statement(&self.0.statement_id).await?;
        Ok(row.map(Statement))
    }
}

#[derive(SimpleObject)]
pub struct SubjectDigest {
    pub id: ID,
    pub algorithm: String,
    pub value: String,
}

impl From<SubjectDigestRow> for SubjectDigest {
    fn from(row: SubjectDigestRow) -> Self {
        Self {
            id: ID(row.id),
            algorithm: row.algorithm,
            value: row.value,
        }
    }
}

pub struct AttestationCollection(pub AttestationCollectionRow);

#[Object]
impl AttestationCollection {
    async fn id(&self) -> ID {
        ID(self.0.id.clone())
    }

    async fn name(&self) -> &str {
        &self.0.name
    }

    async fn attestations(&self, ctx: &Context<'_>) -> Result<Vec<Attestation>> {
        let rows = store(ctx)?.attestations_for_collection(&self.0.id).await?;
        Ok(rows.into_iter().map(Attestation).collect())
    }

    async fn statement(&self, ctx: &Context<'_>) -> Result<Option<Statement>> {
        let row = store(ctx)?.get_statement(&self.0.statement_id).await?;
        Ok(row.map(Statement))
    }
}

pub struct Attestation(pub AttestationRow);

#[Object]
impl Attestation {
    async fn id(&self) -> ID {
        ID(self.0.id.clone())
    }

    #[graphql(name = "type")]
    async fn attestation_type(&self) -> &str {
        &self.0.attestation_type
    }

    async fn git_attestation(&self, ctx: &Context<'_>) -> Result<Option<GitAttestation>> {
        let row = store(ctx)?.git_attestation(&self.0.id).await?;
        Ok(row.map(GitAttestation::from))
    }

    async fn sarif(&self, ctx: &Context<'_>) -> Result<Option<Sarif>> {
        let row = store(ctx)?.sarif_for_attestation(&self.0.id).await?;
        Ok(row.map(Sarif))
    }

    async fn omnitrail(&self, ctx: &Context<'_>) -> Result<Option<Omnitrail>> {
        let row = store(ctx)?.omnitrail(&self.0.id).await?;
        Ok(row.map(Omnitrail))
    }
}

#[derive(SimpleObject)]
pub struct AttestationPolicy {
    pub id: ID,
    pub name: String,
}

impl From<AttestationPolicyRow> for AttestationPolicy {
    fn from(row: AttestationPolicyRow) -> Self {
        Self {
            id: ID(row.id),
            name: row.name,
        }
    }
}

#[derive(SimpleObject)]
pub struct GitAttestation {
    pub id: ID,
    pub commit_hash: String,
    pub author: String,
    pub author_email: String,
    pub committer_name: String,
    pub committer_email: String,
    pub commit_date: String,
    pub commit_message: String,
    /// JSON object of path to staging and worktree state.
    pub status: String,
    pub commit_type: String,
    pub commit_digest: String,
    pub signature: String,
    pub parent_hashes: Vec<String>,
    pub tree_hash: String,
    pub refs: Vec<String>,
    pub remotes: Vec<String>,
}

impl From<GitAttestationRow> for GitAttestation {
    fn from(row: GitAttestationRow) -> Self {
        let parent_hashes = row.parent_hash_list();
        let refs = row.ref_list();
        let remotes = row.remote_list();
        Self {
            id: ID(row.id),
            commit_hash: row.commit_hash,
            author: row.author,
            author_email: row.author_email,
            committer_name: row.committer_name,
            committer_email: row.committer_email,
            commit_date: row.commit_date,
            commit_message: row.commit_message,
            status: row.status,
            commit_type: row.commit_type,
            commit_digest: row.commit_digest,
            signature: row.signature,
            parent_hashes,
            tree_hash: row.tree_hash,
            refs,
            remotes,
        }
    }
}

pub struct Sarif(pub SarifRow);

#[Object]
impl Sarif {
    async fn id(&self) -> ID {
        ID(self.0.id.clone())
    }

    async fn report_file_name(&self) -> &str {
        &self.0.report_file_name
    }

    async fn sarif_rules(&self, ctx: &Context<'_>) -> Result<Vec<SarifRule>> {
        let rows = store(ctx)?.sarif_rules(&self.0.id).await?;
        Ok(rows.into_iter().map(SarifRule::from).collect())
    }

    async fn statement(&self, ctx: &Context<'_>) -> Result<Option<Statement>> {
        let row = store(ctx)?.get_statement(&self.0.statement_id).await?;
        Ok(row.map(Statement))
    }
}

#[derive(SimpleObject)]
pub struct SarifRule {
    pub id: ID,
    #[graphql(name = "ruleID")]
    pub rule_id: String,
    pub rule_name: String,
    pub short_description: String,
}

impl From<SarifRuleRow> for SarifRule {
    fn from(row: SarifRuleRow) -> Self {
        Self {
            id: ID(row.id),
            rule_id: row.rule_id,
            rule_name: row.rule_name,
            short_description: row.short_description,
        }
    }
}

pub struct Omnitrail(pub OmnitrailRow);

#[Object]
impl Omnitrail {
    async fn id(&self) -> ID {
        ID(self.0.id.clone())
    }

    async fn mappings(&self, ctx: &Context<'_>) -> Result<Vec<Mapping>> {
        let rows = store(ctx)?.mappings(&self.0.id).await?;
        Ok(rows.into_iter().map(Mapping).collect())
    }
}

/// One file or directory recorded by an omnitrail attestation.
pub struct Mapping(pub MappingRow);

#[Object]
impl Mapping {
    async fn id(&self) -> ID {
        ID(self.0.id.clone())
    }

    async fn path(&self) -> &str {
        &self.0.path
    }

    #[graphql(name = "type")]
    async fn mapping_type(&self) -> &str {
        &self.0.mapping_type
    }

    async fn sha1(&self) -> Option<&str> {
        self.0.sha1.as_deref()
    }

    async fn sha256(&self) -> Option<&str> {
        self.0.sha256.as_deref()
    }

    async fn gitoid_sha1(&self) -> Option<&str> {
        self.0.gitoid_sha1.as_deref()
    }

    async fn gitoid_sha256(&self) -> Option<&str> {
        self.0.gitoid_sha256.as_deref()
    }

    async fn posix(&self, ctx: &Context<'_>) -> Result<Option<Posix>> {
        let row = store(ctx)?.posix(&self.0.id).await?;
        Ok(row.map(Posix::from))
    }
}

#[derive(SimpleObject)]
pub struct Posix {
    pub id: ID,
    pub atime: Option<String>,
    pub ctime: Option<String>,
    pub creation_time: Option<String>,
    pub extended_attributes: Option<String>,
    #[graphql(name = "fileDeviceID")]
    pub file_device_id: Option<String>,
    pub file_flags: Option<String>,
    pub file_inode: Option<String>,
    #[graphql(name = "fileSystemID")]
    pub file_system_id: Option<String>,
    pub file_type: Option<String>,
    pub hard_link_count: Option<String>,
    pub mtime: Option<String>,
    pub metadata_ctime: Option<String>,
    #[graphql(name = "ownerGID")]
    pub owner_gid: Option<String>,
    #[graphql(name = "ownerUID")]
    pub owner_uid: Option<String>,
    pub permissions: Option<String>,
    pub size: Option<String>,
}

impl From<PosixRow> for Posix {
    fn from(row: PosixRow) -> Self {
        Self {
            id: ID(row.id),
            atime: row.atime,
            ctime: row.ctime,
            creation_time: row.creation_time,
            extended_attributes: row.extended_attributes,
            file_device_id: row.file_device_id,
            file_flags: row.file_flags,
            file_inode: row.file_inode,
            file_system_id: row.file_system_id,
            file_type: row.file_type,
            hard_link_count: row.hard_link_count,
            mtime: row.mtime,
            metadata_ctime: row.metadata_ctime,
            owner_gid: row.owner_gid,
            owner_uid: row.owner_uid,
            permissions: row.permissions,
            size: row.size,
        }
    }
}

pub struct VexDocument(pub VexDocumentRow);

#[Object]
impl VexDocument {
    async fn id(&self) -> ID {
        ID(self.0.id.clone())
    }

    #[graphql(name = "vexID")]
    async fn vex_id(&self) -> &str {
        &self.0.vex_id
    }

    async fn vex_statements(&self, ctx: &Context<'_>) -> Result<Vec<VexStatement>> {
        let rows = store(ctx)?.vex_statements_for_document(&self.0.id).await?;
        Ok(rows.into_iter().map(VexStatement::from).collect())
    }
}

#[derive(SimpleObject)]
pub struct VexStatement {
    pub id: ID,
    #[graphql(name = "vulnID")]
    pub vuln_id: String,
}

impl From<VexStatementRow> for VexStatement {
    fn from(row: VexStatementRow) -> Self {
        Self {
            id: ID(row.id),
            vuln_id: row.vuln_id,
        }
    }
}
