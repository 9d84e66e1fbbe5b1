//! Statement repository.

use crate::error::MetadataResult;
use crate::models::{
    AttestationCollectionRow, AttestationPolicyRow, AttestationRow, SarifRow, StatementRow,
    SubjectDigestRow, SubjectRow, VexDocumentRow, VexStatementRow,
};
use crate::query::{Connection, Page, StatementFilter, SubjectFilter};
use async_trait::async_trait;

/// Read access to statements, subjects and what hangs off a statement.
#[async_trait]
pub trait StatementRepo: Send + Sync {
    async fn get_statement(&self, id: &str) -> MetadataResult<Option<StatementRow>>;

    async fn list_statements(
        &self,
        filter: &StatementFilter,
        page: &Page,
    ) -> MetadataResult<Connection<StatementRow>>;

    async fn list_subjects(
        &self,
        filter: &SubjectFilter,
        page: &Page,
    ) -> MetadataResult<Connection<SubjectRow>>;

    /// Subjects of a statement in insertion order.
    async fn subjects_for_statement(
        &self,
        statement_id: &str,
        page: &Page,
    ) -> MetadataResult<Connection<SubjectRow>> {
        let filter = SubjectFilter {
            has_statement_with: Some(Box::new(StatementFilter {
                id: Some(statement_id.to_string()),
                ..Default::default()
            })),
            ..Default::default()
        };
        self.list_subjects(&filter, page).await
    }

    async fn subject_digests(&self, subject_id: &str) -> MetadataResult<Vec<SubjectDigestRow>>;

    async fn collection_for_statement(
        &self,
        statement_id: &str,
    ) -> MetadataResult<Option<AttestationCollectionRow>>;

    async fn attestations_for_collection(
        &self,
        collection_id: &str,
    ) -> MetadataResult<Vec<AttestationRow>>;

    async fn policy_for_statement(
        &self,
        statement_id: &str,
    ) -> MetadataResult<Option<AttestationPolicyRow>>;

    async fn sarifs_for_statement(&self, statement_id: &str) -> MetadataResult<Vec<SarifRow>>;

    async fn vex_documents_for_statement(
        &self,
        statement_id: &str,
    ) -> MetadataResult<Vec<VexDocumentRow>>;

    async fn vex_statements_for_document(
        &self,
        document_id: &str,
    ) -> MetadataResult<Vec<VexStatementRow>>;
}
