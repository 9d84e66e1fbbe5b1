//! Metadata store trait and the SQL implementation.

use crate::dialect::{rewrite_placeholders, schema, schema_statements};
use crate::error::{MetadataError, MetadataResult};
use crate::iam::{self, RdsTokenProvider, TOKEN_REFRESH_INTERVAL, TokenProvider};
use crate::ingest::{Body, write_envelope};
use crate::models::*;
use crate::query::{Connection, DsseFilter, Node, Page, SqlFilter, StatementFilter, SubjectFilter, decode_cursor};
use crate::repos::{EnvelopeRepo, IngestRepo, PredicateRepo, StatementRepo};
use crate::tx::IngestTx;
use archivista_core::config::{MetadataConfig, PoolConfig, SqlDialect};
use archivista_core::{Bundle, BundleLimits, Envelope, FormatRouter, Payload};
use async_trait::async_trait;
use sqlx::any::{AnyConnectOptions, AnyPoolOptions, AnyRow};
use sqlx::{AnyPool, FromRow};
use std::borrow::Cow;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore:
    IngestRepo + EnvelopeRepo + StatementRepo + PredicateRepo + Send + Sync
{
    /// Create any missing tables and indexes.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity.
    async fn health_check(&self) -> MetadataResult<()>;

    /// Dialect of the backing database.
    fn dialect(&self) -> SqlDialect;
}

const SQLITE_PRAGMAS: &[&str] = &[
    "PRAGMA foreign_keys = ON",
    "PRAGMA journal_mode = WAL",
    "PRAGMA busy_timeout = 5000",
];

/// Metadata store over SQLite, Postgres or MySQL.
pub struct SqlStore {
    pool: AnyPool,
    dialect: SqlDialect,
    limits: BundleLimits,
}

impl SqlStore {
    /// Connect, start IAM token refresh if configured, and migrate.
    pub async fn connect(config: &MetadataConfig) -> MetadataResult<Self> {
        sqlx::any::install_default_drivers();
        let dialect = config.backend.dialect;
        let base_url = connection_url(dialect, &config.connection_string)?;
        if dialect == SqlDialect::Sqlite {
            ensure_sqlite_parent(&base_url)?;
        }

        let (url, provider) = if config.backend.rds_iam {
            let provider: Arc<dyn TokenProvider> = Arc::new(RdsTokenProvider::from_env(None).await);
            let url = iam::rewrite_connection_string(dialect, &base_url, provider.as_ref()).await?;
            (url, Some(provider))
        } else {
            (base_url.clone(), None)
        };

        let options = AnyConnectOptions::from_str(&url)?;
        let pool = pool_options(dialect, &config.pool)
            .connect_with(options)
            .await?;

        if let Some(provider) = provider {
            spawn_token_refresh(pool.clone(), dialect, base_url, provider);
        }

        let store = Self {
            pool,
            dialect,
            limits: BundleLimits::default(),
        };
        store.migrate().await?;
        tracing::info!(backend = dialect.as_str(), rds_iam = config.backend.rds_iam, "metadata store ready");
        Ok(store)
    }

    /// Limits used when [`IngestRepo::store`] classifies raw bytes.
    pub fn with_bundle_limits(mut self, limits: BundleLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    fn sql<'a>(&self, sql: &'a str) -> Cow<'a, str> {
        rewrite_placeholders(self.dialect, sql)
    }

    async fn fetch_all<T>(&self, sql: &str, key: &str) -> MetadataResult<Vec<T>>
    where
        T: for<'r> FromRow<'r, AnyRow> + Send + Unpin,
    {
        let sql = self.sql(sql);
        Ok(sqlx::query_as::<_, T>(&sql)
            .bind(key)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn fetch_optional<T>(&self, sql: &str, key: &str) -> MetadataResult<Option<T>>
    where
        T: for<'r> FromRow<'r, AnyRow> + Send + Unpin,
    {
        let sql = self.sql(sql);
        Ok(sqlx::query_as::<_, T>(&sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// Count and fetch one page of `table` rows matching `filter`, ordered by
    /// id. Ids are UUIDv7, so id order is insertion order.
    async fn paginate<T>(
        &self,
        table: &str,
        alias: &str,
        filter: SqlFilter,
        page: &Page,
    ) -> MetadataResult<Connection<T>>
    where
        T: for<'r> FromRow<'r, AnyRow> + Node + Send + Unpin,
    {
        let where_sql = filter.where_sql();

        let count_raw = format!("SELECT COUNT(*) FROM {table} {alias} WHERE {where_sql}");
        let count_sql = self.sql(&count_raw);
        let mut count = sqlx::query_scalar::<_, i64>(&count_sql);
        for bind in &filter.binds {
            count = count.bind(bind.as_str());
        }
        let total_count = count.fetch_one(&self.pool).await?;

        let mut binds = filter.binds;
        let mut sql = format!("SELECT {alias}.* FROM {table} {alias} WHERE {where_sql}");
        let (cursor, op, order, limit) = if page.is_backward() {
            (page.before.as_deref(), "<", "DESC", page.last)
        } else {
            (page.after.as_deref(), ">", "ASC", page.first)
        };
        if let Some(cursor) = cursor {
            binds.push(decode_cursor(cursor)?);
            sql.push_str(&format!(" AND {alias}.id {op} ?"));
        }
        sql.push_str(&format!(" ORDER BY {alias}.id {order}"));
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {}", limit.saturating_add(1)));
        }

        let sql = self.sql(&sql);
        let mut query = sqlx::query_as::<_, T>(&sql);
        for bind in &binds {
            query = query.bind(bind.as_str());
        }
        let rows = query.fetch_all(&self.pool).await?;
        Ok(Connection::from_rows(rows, page, total_count))
    }
}

/// Check the connection string matches the backend and apply SQLite
/// defaults. Only URL-form connection strings are accepted.
fn connection_url(dialect: SqlDialect, raw: &str) -> MetadataResult<String> {
    let raw = raw.trim();
    let matches = match dialect {
        SqlDialect::Sqlite => raw.starts_with("sqlite:"),
        SqlDialect::Postgres => raw.starts_with("postgres://") || raw.starts_with("postgresql://"),
        SqlDialect::Mysql => raw.starts_with("mysql://"),
    };
    if !matches {
        return Err(MetadataError::UnsupportedBackend(format!(
            "connection string is not a {} URL",
            dialect.as_str()
        )));
    }

    if dialect == SqlDialect::Sqlite && !raw.contains(":memory:") && !raw.contains("mode=") {
        let sep = if raw.contains('?') { '&' } else { '?' };
        return Ok(format!("{raw}{sep}mode=rwc"));
    }
    Ok(raw.to_string())
}

fn ensure_sqlite_parent(url: &str) -> MetadataResult<()> {
    if url.contains(":memory:") {
        return Ok(());
    }
    let path = url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:");
    let path = path.split('?').next().unwrap_or_default();
    if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            MetadataError::Config(format!("cannot create {}: {e}", parent.display()))
        })?;
    }
    Ok(())
}

fn pool_options(dialect: SqlDialect, config: &PoolConfig) -> AnyPoolOptions {
    match dialect {
        // One long-lived connection: SQLite serializes writers anyway, and
        // an in-memory database lives only as long as its connection.
        SqlDialect::Sqlite => AnyPoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    for pragma in SQLITE_PRAGMAS {
                        sqlx::query(*pragma).execute(&mut *conn).await?;
                    }
                    Ok(())
                })
            }),
        SqlDialect::Postgres | SqlDialect::Mysql => {
            let max_open = if config.max_open == 0 { 10 } else { config.max_open };
            let lifetime = (!config.max_lifetime.is_zero()).then_some(config.max_lifetime);
            AnyPoolOptions::new()
                .max_connections(max_open)
                .min_connections(config.max_idle.min(max_open))
                .max_lifetime(lifetime)
        }
    }
}

/// Regenerate the IAM token for new connections until the pool closes.
fn spawn_token_refresh(
    pool: AnyPool,
    dialect: SqlDialect,
    base_url: String,
    provider: Arc<dyn TokenProvider>,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(TOKEN_REFRESH_INTERVAL);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if pool.is_closed() {
                break;
            }
            let refreshed = iam::rewrite_connection_string(dialect, &base_url, provider.as_ref())
                .await
                .and_then(|url| AnyConnectOptions::from_str(&url).map_err(MetadataError::from));
            match refreshed {
                Ok(options) => {
                    pool.set_connect_options(options);
                    tracing::debug!("refreshed RDS IAM auth token");
                }
                Err(e) => tracing::warn!(error = %e, "failed to refresh RDS IAM auth token"),
            }
        }
    });
}

#[async_trait]
impl MetadataStore for SqlStore {
    async fn migrate(&self) -> MetadataResult<()> {
        for statement in schema_statements(schema(self.dialect)) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn dialect(&self) -> SqlDialect {
        self.dialect
    }
}

mod sql_impl {
    use super::*;

    #[async_trait]
    impl IngestRepo for SqlStore {
        async fn store(&self, gitoid: &str, raw: &[u8]) -> MetadataResult<()> {
            let payload = FormatRouter::new(self.limits).classify(raw)?;
            self.store_payload(gitoid, &payload).await
        }

        async fn store_payload(&self, gitoid: &str, payload: &Payload) -> MetadataResult<()> {
            match payload {
                Payload::Envelope(envelope) => self.store_envelope(gitoid, envelope, None).await,
                Payload::Bundle { bundle, envelope } => {
                    self.store_envelope(gitoid, envelope, Some(bundle)).await
                }
                Payload::MessageSignature(_) => {
                    tracing::warn!(gitoid, "message signature bundles are not indexed");
                    Ok(())
                }
            }
        }

        async fn store_envelope(
            &self,
            gitoid: &str,
            envelope: &Envelope,
            bundle: Option<&Bundle>,
        ) -> MetadataResult<()> {
            let body = Body::prepare(envelope)?;
            let mut tx = IngestTx::new(self.pool.begin().await?, self.dialect);

            match write_envelope(&mut tx, gitoid, envelope, &body, bundle).await {
                Ok(()) => {
                    tx.commit().await?;
                    tracing::info!(
                        gitoid,
                        payload_type = %envelope.payload_type,
                        bundle = bundle.is_some(),
                        "stored envelope metadata"
                    );
                    Ok(())
                }
                Err(e) => {
                    if let Err(rollback) = tx.rollback().await {
                        tracing::warn!(gitoid, error = %rollback, "rollback failed");
                    }
                    Err(e)
                }
            }
        }

        async fn delete_dsse(&self, gitoid: &str) -> MetadataResult<bool> {
            let mut tx = self.pool.begin().await?;

            let sql = self.sql("SELECT * FROM dsses WHERE gitoid_sha256 = ?");
            let Some(dsse) = sqlx::query_as::<_, DsseRow>(&sql)
                .bind(gitoid)
                .fetch_optional(&mut *tx)
                .await?
            else {
                return Ok(false);
            };

            // SARIF reports hang off their own statements, linked back only
            // through the attestation that produced them.
            let sarif_statements: Vec<String> = match dsse.statement_id.as_deref() {
                Some(statement_id) => {
                    let sql = self.sql(
                        "SELECT s.statement_id FROM sarifs s \
                         JOIN attestations a ON a.id = s.attestation_id \
                         JOIN attestation_collections c ON c.id = a.attestation_collection_id \
                         WHERE c.statement_id = ?",
                    );
                    sqlx::query_scalar(&sql)
                        .bind(statement_id)
                        .fetch_all(&mut *tx)
                        .await?
                }
                None => Vec::new(),
            };

            let sql = self.sql("DELETE FROM dsses WHERE id = ?");
            sqlx::query(&sql).bind(&dsse.id).execute(&mut *tx).await?;

            if let Some(statement_id) = dsse.statement_id.as_deref() {
                let sql = self.sql("SELECT COUNT(*) FROM dsses WHERE statement_id = ?");
                let remaining: i64 = sqlx::query_scalar(&sql)
                    .bind(statement_id)
                    .fetch_one(&mut *tx)
                    .await?;
                if remaining == 0 {
                    let sql = self.sql("DELETE FROM statements WHERE id = ?");
                    for id in sarif_statements.iter().map(String::as_str).chain([statement_id]) {
                        sqlx::query(&sql).bind(id).execute(&mut *tx).await?;
                    }
                }
            }

            tx.commit().await?;
            tracing::info!(gitoid, "deleted envelope metadata");
            Ok(true)
        }
    }

    #[async_trait]
    impl EnvelopeRepo for SqlStore {
        async fn get_dsse(&self, id: &str) -> MetadataResult<Option<DsseRow>> {
            self.fetch_optional("SELECT * FROM dsses WHERE id = ?", id).await
        }

        async fn get_dsse_by_gitoid(&self, gitoid: &str) -> MetadataResult<Option<DsseRow>> {
            self.fetch_optional("SELECT * FROM dsses WHERE gitoid_sha256 = ?", gitoid)
                .await
        }

        async fn list_dsses(
            &self,
            filter: &DsseFilter,
            page: &Page,
        ) -> MetadataResult<Connection<DsseRow>> {
            self.paginate("dsses", "d", filter.to_sql("d"), page).await
        }

        async fn dsses_for_statement(&self, statement_id: &str) -> MetadataResult<Vec<DsseRow>> {
            self.fetch_all(
                "SELECT * FROM dsses WHERE statement_id = ? ORDER BY id",
                statement_id,
            )
            .await
        }

        async fn signatures_for_dsse(&self, dsse_id: &str) -> MetadataResult<Vec<SignatureRow>> {
            self.fetch_all("SELECT * FROM signatures WHERE dsse_id = ? ORDER BY id", dsse_id)
                .await
        }

        async fn timestamps_for_signature(
            &self,
            signature_id: &str,
        ) -> MetadataResult<Vec<TimestampRow>> {
            self.fetch_all(
                "SELECT * FROM timestamps WHERE signature_id = ? ORDER BY id",
                signature_id,
            )
            .await
        }

        async fn payload_digests_for_dsse(
            &self,
            dsse_id: &str,
        ) -> MetadataResult<Vec<PayloadDigestRow>> {
            self.fetch_all(
                "SELECT * FROM payload_digests WHERE dsse_id = ? ORDER BY algorithm",
                dsse_id,
            )
            .await
        }

        async fn bundle_for_dsse(
            &self,
            dsse_id: &str,
        ) -> MetadataResult<Option<SigstoreBundleRow>> {
            self.fetch_optional("SELECT * FROM sigstore_bundles WHERE dsse_id = ?", dsse_id)
                .await
        }
    }

    #[async_trait]
    impl StatementRepo for SqlStore {
        async fn get_statement(&self, id: &str) -> MetadataResult<Option<StatementRow>> {
            self.fetch_optional("SELECT * FROM statements WHERE id = ?", id)
                .await
        }

        async fn list_statements(
            &self,
            filter: &StatementFilter,
            page: &Page,
        ) -> MetadataResult<Connection<StatementRow>> {
            self.paginate("statements", "st", filter.to_sql("st"), page)
                .await
        }

        async fn list_subjects(
            &self,
            filter: &SubjectFilter,
            page: &Page,
        ) -> MetadataResult<Connection<SubjectRow>> {
            self.paginate("subjects", "sub", filter.to_sql("sub"), page)
                .await
        }

        async fn subject_digests(&self, subject_id: &str) -> MetadataResult<Vec<SubjectDigestRow>> {
            self.fetch_all(
                "SELECT * FROM subject_digests WHERE subject_id = ? ORDER BY id",
                subject_id,
            )
            .await
        }

        async fn collection_for_statement(
            &self,
            statement_id: &str,
        ) -> MetadataResult<Option<AttestationCollectionRow>> {
            self.fetch_optional(
                "SELECT * FROM attestation_collections WHERE statement_id = ?",
                statement_id,
            )
            .await
        }

        async fn attestations_for_collection(
            &self,
            collection_id: &str,
        ) -> MetadataResult<Vec<AttestationRow>> {
            self.fetch_all(
                "SELECT * FROM attestations WHERE attestation_collection_id = ? ORDER BY id",
                collection_id,
            )
            .await
        }

        async fn policy_for_statement(
            &self,
            statement_id: &str,
        ) -> MetadataResult<Option<AttestationPolicyRow>> {
            self.fetch_optional(
                "SELECT * FROM attestation_policies WHERE statement_id = ?",
                statement_id,
            )
            .await
        }

        async fn sarifs_for_statement(&self, statement_id: &str) -> MetadataResult<Vec<SarifRow>> {
            self.fetch_all(
                "SELECT * FROM sarifs WHERE statement_id = ? ORDER BY id",
                statement_id,
            )
            .await
        }

        async fn vex_documents_for_statement(
            &self,
            statement_id: &str,
        ) -> MetadataResult<Vec<VexDocumentRow>> {
            self.fetch_all(
                "SELECT * FROM vex_documents WHERE statement_id = ? ORDER BY id",
                statement_id,
            )
            .await
        }

        async fn vex_statements_for_document(
            &self,
            document_id: &str,
        ) -> MetadataResult<Vec<VexStatementRow>> {
            self.fetch_all(
                "SELECT * FROM vex_statements WHERE vex_document_id = ? ORDER BY id",
                document_id,
            )
            .await
        }
    }

    #[async_trait]
    impl PredicateRepo for SqlStore {
        async fn git_attestation(
            &self,
            attestation_id: &str,
        ) -> MetadataResult<Option<GitAttestationRow>> {
            self.fetch_optional(
                "SELECT * FROM git_attestations WHERE attestation_id = ?",
                attestation_id,
            )
            .await
        }

        async fn sarif_for_attestation(
            &self,
            attestation_id: &str,
        ) -> MetadataResult<Option<SarifRow>> {
            self.fetch_optional("SELECT * FROM sarifs WHERE attestation_id = ?", attestation_id)
                .await
        }

        async fn sarif_rules(&self, sarif_id: &str) -> MetadataResult<Vec<SarifRuleRow>> {
            self.fetch_all(
                "SELECT * FROM sarif_rules WHERE sarif_id = ? ORDER BY id",
                sarif_id,
            )
            .await
        }

        async fn omnitrail(&self, attestation_id: &str) -> MetadataResult<Option<OmnitrailRow>> {
            self.fetch_optional(
                "SELECT * FROM omnitrails WHERE attestation_id = ?",
                attestation_id,
            )
            .await
        }

        async fn mappings(&self, omnitrail_id: &str) -> MetadataResult<Vec<MappingRow>> {
            self.fetch_all(
                "SELECT * FROM mappings WHERE omnitrail_id = ? ORDER BY path",
                omnitrail_id,
            )
            .await
        }

        async fn posix(&self, mapping_id: &str) -> MetadataResult<Option<PosixRow>> {
            self.fetch_optional("SELECT * FROM posixes WHERE mapping_id = ?", mapping_id)
                .await
        }
    }
}
