//! The ingest transaction handed to predicate parsers.
//!
//! Parsers only add rows. Commit and rollback stay with the store, so a
//! parser error always discards the whole ingest.

use crate::dialect::{batch_rows, rewrite_placeholders};
use crate::error::{MetadataError, MetadataResult, is_unique_violation};
use crate::models::{
    GitAttestationRow, MappingRow, PosixRow, SarifRow, SarifRuleRow, SignatureRow, new_id,
};
use archivista_core::config::SqlDialect;
use archivista_core::intoto::Subject;
use sqlx::{Any, Transaction};

/// Maximum subjects per multi-row insert.
///
/// Each row binds 2 parameters (statement id, name); 30 000 rows stay under
/// the 65 535-parameter limit of Postgres and MySQL with headroom. Drivers
/// with a lower limit are capped further by [`batch_rows`].
pub const SUBJECT_BATCH_SIZE: usize = 30_000;

/// Maximum subject digests per multi-row insert.
///
/// Each row binds 3 parameters (subject id, algorithm, value); 20 000 rows
/// stay under the 65 535-parameter limit.
pub const SUBJECT_DIGEST_BATCH_SIZE: usize = 20_000;

/// An open ingest transaction.
pub struct IngestTx {
    tx: Transaction<'static, Any>,
    dialect: SqlDialect,
}

impl IngestTx {
    pub(crate) fn new(tx: Transaction<'static, Any>, dialect: SqlDialect) -> Self {
        Self { tx, dialect }
    }

    pub(crate) async fn commit(self) -> MetadataResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    pub(crate) async fn rollback(self) -> MetadataResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }

    /// SQL dialect of the underlying connection.
    pub fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    pub(crate) async fn insert_dsse(
        &mut self,
        gitoid: &str,
        payload_type: &str,
    ) -> MetadataResult<String> {
        let id = new_id();
        let sql = rewrite_placeholders(
            self.dialect,
            "INSERT INTO dsses (id, gitoid_sha256, payload_type) VALUES (?, ?, ?)",
        );
        sqlx::query(&sql)
            .bind(&id)
            .bind(gitoid)
            .bind(payload_type)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    MetadataError::Duplicate(gitoid.to_string())
                } else {
                    MetadataError::Database(e)
                }
            })?;
        Ok(id)
    }

    pub(crate) async fn link_statement(
        &mut self,
        dsse_id: &str,
        statement_id: &str,
    ) -> MetadataResult<()> {
        let sql = rewrite_placeholders(self.dialect, "UPDATE dsses SET statement_id = ? WHERE id = ?");
        sqlx::query(&sql)
            .bind(statement_id)
            .bind(dsse_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    pub(crate) async fn insert_signature(&mut self, row: &SignatureRow) -> MetadataResult<()> {
        let sql = rewrite_placeholders(
            self.dialect,
            "INSERT INTO signatures (id, dsse_id, key_id, signature, certificate, intermediates) \
             VALUES (?, ?, ?, ?, ?, ?)",
        );
        sqlx::query(&sql)
            .bind(&row.id)
            .bind(&row.dsse_id)
            .bind(&row.key_id)
            .bind(&row.signature)
            .bind(row.certificate.as_deref())
            .bind(row.intermediates.as_deref())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    pub(crate) async fn insert_timestamp(
        &mut self,
        signature_id: &str,
        timestamp_type: &str,
        data: &[u8],
        timestamp: &str,
    ) -> MetadataResult<()> {
        let sql = rewrite_placeholders(
            self.dialect,
            "INSERT INTO timestamps (id, signature_id, type, data, timestamp) VALUES (?, ?, ?, ?, ?)",
        );
        sqlx::query(&sql)
            .bind(new_id())
            .bind(signature_id)
            .bind(timestamp_type)
            .bind(data)
            .bind(timestamp)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    pub(crate) async fn insert_payload_digest(
        &mut self,
        dsse_id: &str,
        algorithm: &str,
        value: &str,
    ) -> MetadataResult<()> {
        let sql = rewrite_placeholders(
            self.dialect,
            "INSERT INTO payload_digests (id, dsse_id, algorithm, value) VALUES (?, ?, ?, ?)",
        );
        sqlx::query(&sql)
            .bind(new_id())
            .bind(dsse_id)
            .bind(algorithm)
            .bind(value)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    pub(crate) async fn insert_sigstore_bundle(
        &mut self,
        dsse_id: &str,
        gitoid: &str,
        media_type: &str,
        version: Option<&str>,
        created_at: &str,
    ) -> MetadataResult<()> {
        let sql = rewrite_placeholders(
            self.dialect,
            "INSERT INTO sigstore_bundles (id, gitoid_sha256, media_type, version, created_at, dsse_id) \
             VALUES (?, ?, ?, ?, ?, ?)",
        );
        sqlx::query(&sql)
            .bind(new_id())
            .bind(gitoid)
            .bind(media_type)
            .bind(version)
            .bind(created_at)
            .bind(dsse_id)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    MetadataError::Duplicate(gitoid.to_string())
                } else {
                    MetadataError::Database(e)
                }
            })?;
        Ok(())
    }

    /// Insert a statement and return its id.
    pub async fn insert_statement(&mut self, predicate: &str) -> MetadataResult<String> {
        let id = new_id();
        let sql = rewrite_placeholders(self.dialect, "INSERT INTO statements (id, predicate) VALUES (?, ?)");
        sqlx::query(&sql)
            .bind(&id)
            .bind(predicate)
            .execute(&mut *self.tx)
            .await?;
        Ok(id)
    }

    /// Insert subjects and their digests in batches, preserving order.
    ///
    /// Subject ids are generated up front and inlined as literals, so the
    /// digest rows can reference them without reading anything back.
    pub async fn insert_subjects(
        &mut self,
        statement_id: &str,
        subjects: &[Subject],
    ) -> MetadataResult<()> {
        if subjects.is_empty() {
            return Ok(());
        }
        let ids: Vec<String> = subjects.iter().map(|_| new_id()).collect();

        let per_batch = batch_rows(self.dialect, SUBJECT_BATCH_SIZE, 2);
        for (chunk, chunk_ids) in subjects.chunks(per_batch).zip(ids.chunks(per_batch)) {
            let mut sql = String::from("INSERT INTO subjects (id, statement_id, name) VALUES ");
            for (i, id) in chunk_ids.iter().enumerate() {
                if i > 0 {
                    sql.push_str(", ");
                }
                sql.push_str(&format!("('{id}', ?, ?)"));
            }
            let sql = rewrite_placeholders(self.dialect, &sql);
            let mut query = sqlx::query(&sql);
            for subject in chunk {
                query = query.bind(statement_id).bind(subject.name.as_str());
            }
            query.execute(&mut *self.tx).await?;
        }
        tracing::debug!(count = subjects.len(), per_batch, "inserted subjects");

        let digests: Vec<(&str, &str, &str)> = subjects
            .iter()
            .zip(&ids)
            .flat_map(|(subject, id)| {
                subject
                    .digest
                    .iter()
                    .map(move |(alg, value)| (id.as_str(), alg.as_str(), value.as_str()))
            })
            .collect();

        let per_batch = batch_rows(self.dialect, SUBJECT_DIGEST_BATCH_SIZE, 3);
        for chunk in digests.chunks(per_batch) {
            let mut sql =
                String::from("INSERT INTO subject_digests (id, subject_id, algorithm, value) VALUES ");
            for i in 0..chunk.len() {
                if i > 0 {
                    sql.push_str(", ");
                }
                sql.push_str(&format!("('{}', ?, ?, ?)", new_id()));
            }
            let sql = rewrite_placeholders(self.dialect, &sql);
            let mut query = sqlx::query(&sql);
            for (subject_id, algorithm, value) in chunk {
                query = query.bind(*subject_id).bind(*algorithm).bind(*value);
            }
            query.execute(&mut *self.tx).await?;
        }
        tracing::debug!(count = digests.len(), per_batch, "inserted subject digests");
        Ok(())
    }

    /// Insert an attestation collection and return its id.
    pub async fn insert_attestation_collection(
        &mut self,
        statement_id: &str,
        name: &str,
    ) -> MetadataResult<String> {
        let id = new_id();
        let sql = rewrite_placeholders(
            self.dialect,
            "INSERT INTO attestation_collections (id, statement_id, name) VALUES (?, ?, ?)",
        );
        sqlx::query(&sql)
            .bind(&id)
            .bind(statement_id)
            .bind(name)
            .execute(&mut *self.tx)
            .await?;
        Ok(id)
    }

    /// Insert an attestation and return its id.
    pub async fn insert_attestation(
        &mut self,
        collection_id: &str,
        attestation_type: &str,
    ) -> MetadataResult<String> {
        let id = new_id();
        let sql = rewrite_placeholders(
            self.dialect,
            "INSERT INTO attestations (id, attestation_collection_id, type) VALUES (?, ?, ?)",
        );
        sqlx::query(&sql)
            .bind(&id)
            .bind(collection_id)
            .bind(attestation_type)
            .execute(&mut *self.tx)
            .await?;
        Ok(id)
    }

    pub async fn insert_attestation_policy(
        &mut self,
        statement_id: &str,
        name: &str,
    ) -> MetadataResult<String> {
        let id = new_id();
        let sql = rewrite_placeholders(
            self.dialect,
            "INSERT INTO attestation_policies (id, statement_id, name) VALUES (?, ?, ?)",
        );
        sqlx::query(&sql)
            .bind(&id)
            .bind(statement_id)
            .bind(name)
            .execute(&mut *self.tx)
            .await?;
        Ok(id)
    }

    pub async fn insert_git_attestation(&mut self, row: &GitAttestationRow) -> MetadataResult<()> {
        let sql = rewrite_placeholders(
            self.dialect,
            "INSERT INTO git_attestations (id, attestation_id, commit_hash, author, author_email, \
             committer_name, committer_email, commit_date, commit_message, status, commit_type, \
             commit_digest, signature, parent_hashes, tree_hash, refs, remotes) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        );
        sqlx::query(&sql)
            .bind(&row.id)
            .bind(&row.attestation_id)
            .bind(&row.commit_hash)
            .bind(&row.author)
            .bind(&row.author_email)
            .bind(&row.committer_name)
            .bind(&row.committer_email)
            .bind(&row.commit_date)
            .bind(&row.commit_message)
            .bind(&row.status)
            .bind(&row.commit_type)
            .bind(&row.commit_digest)
            .bind(&row.signature)
            .bind(&row.parent_hashes)
            .bind(&row.tree_hash)
            .bind(&row.refs)
            .bind(&row.remotes)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    pub async fn insert_sarif(&mut self, row: &SarifRow) -> MetadataResult<()> {
        let sql = rewrite_placeholders(
            self.dialect,
            "INSERT INTO sarifs (id, statement_id, attestation_id, report_file_name) VALUES (?, ?, ?, ?)",
        );
        sqlx::query(&sql)
            .bind(&row.id)
            .bind(&row.statement_id)
            .bind(row.attestation_id.as_deref())
            .bind(&row.report_file_name)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    pub async fn insert_sarif_rule(&mut self, row: &SarifRuleRow) -> MetadataResult<()> {
        let sql = rewrite_placeholders(
            self.dialect,
            "INSERT INTO sarif_rules (id, sarif_id, rule_id, rule_name, short_description) \
             VALUES (?, ?, ?, ?, ?)",
        );
        sqlx::query(&sql)
            .bind(&row.id)
            .bind(&row.sarif_id)
            .bind(&row.rule_id)
            .bind(&row.rule_name)
            .bind(&row.short_description)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    /// Insert an omnitrail and return its id.
    pub async fn insert_omnitrail(&mut self, attestation_id: &str) -> MetadataResult<String> {
        let id = new_id();
        let sql = rewrite_placeholders(self.dialect, "INSERT INTO omnitrails (id, attestation_id) VALUES (?, ?)");
        sqlx::query(&sql)
            .bind(&id)
            .bind(attestation_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(id)
    }

    pub async fn insert_mapping(&mut self, row: &MappingRow) -> MetadataResult<()> {
        let sql = rewrite_placeholders(
            self.dialect,
            "INSERT INTO mappings (id, omnitrail_id, path, type, sha1, sha256, gitoid_sha1, gitoid_sha256) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        );
        sqlx::query(&sql)
            .bind(&row.id)
            .bind(&row.omnitrail_id)
            .bind(&row.path)
            .bind(&row.mapping_type)
            .bind(row.sha1.as_deref())
            .bind(row.sha256.as_deref())
            .bind(row.gitoid_sha1.as_deref())
            .bind(row.gitoid_sha256.as_deref())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    pub async fn insert_posix(&mut self, row: &PosixRow) -> MetadataResult<()> {
        let sql = rewrite_placeholders(
            self.dialect,
            "INSERT INTO posixes (id, mapping_id, atime, ctime, creation_time, extended_attributes, \
             file_device_id, file_flags, file_inode, file_system_id, file_type, hard_link_count, \
             mtime, metadata_ctime, owner_gid, owner_uid, permissions, size) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        );
        sqlx::query(&sql)
            .bind(&row.id)
            .bind(&row.mapping_id)
            .bind(row.atime.as_deref())
            .bind(row.ctime.as_deref())
            .bind(row.creation_time.as_deref())
            .bind(row.extended_attributes.as_deref())
            .bind(row.file_device_id.as_deref())
            .bind(row.file_flags.as_deref())
            .bind(row.file_inode.as_deref())
            .bind(row.file_system_id.as_deref())
            .bind(row.file_type.as_deref())
            .bind(row.hard_link_count.as_deref())
            .bind(row.mtime.as_deref())
            .bind(row.metadata_ctime.as_deref())
            .bind(row.owner_gid.as_deref())
            .bind(row.owner_uid.as_deref())
            .bind(row.permissions.as_deref())
            .bind(row.size.as_deref())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    /// Insert a VEX document and return its id.
    pub async fn insert_vex_document(
        &mut self,
        statement_id: &str,
        vex_id: &str,
    ) -> MetadataResult<String> {
        let id = new_id();
        let sql = rewrite_placeholders(
            self.dialect,
            "INSERT INTO vex_documents (id, statement_id, vex_id) VALUES (?, ?, ?)",
        );
        sqlx::query(&sql)
            .bind(&id)
            .bind(statement_id)
            .bind(vex_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(id)
    }

    pub async fn insert_vex_statement(
        &mut self,
        document_id: &str,
        vuln_id: &str,
    ) -> MetadataResult<()> {
        let sql = rewrite_placeholders(
            self.dialect,
            "INSERT INTO vex_statements (id, vex_document_id, vuln_id) VALUES (?, ?, ?)",
        );
        sqlx::query(&sql)
            .bind(new_id())
            .bind(document_id)
            .bind(vuln_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }
}
