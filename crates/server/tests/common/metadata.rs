//! Metadata store test utilities.

use archivista_core::BundleLimits;
use archivista_core::config::{MetadataConfig, PoolConfig, SqlBackend, SqlDialect};
use archivista_metadata::{MetadataError, MetadataResult, MetadataStore, SqlStore};
use sqlx::AnyPool;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use testcontainers::core::{IntoContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage, ImageExt};

/// Stable prefix for Docker/container startup failures in Postgres test setup.
/// Tests use this marker to decide whether to skip due to unavailable Docker.
pub const POSTGRES_CONTAINER_START_ERR_PREFIX: &str = "postgres-container-start:";

/// A SQLite metadata store in a temporary directory.
#[allow(dead_code)]
pub struct TestMetadata {
    pub store: Arc<SqlStore>,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestMetadata {
    pub async fn new() -> MetadataResult<Self> {
        Self::with_limits(BundleLimits::default()).await
    }

    pub async fn with_limits(limits: BundleLimits) -> MetadataResult<Self> {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let config = MetadataConfig::sqlite(&temp_dir.path().join("archivista.db"));
        let store = SqlStore::connect(&config).await?.with_bundle_limits(limits);
        Ok(Self {
            store: Arc::new(store),
            _temp_dir: temp_dir,
        })
    }

    pub fn store(&self) -> Arc<dyn MetadataStore> {
        self.store.clone()
    }

    /// Get a reference to the connection pool for raw queries.
    pub fn pool(&self) -> &AnyPool {
        self.store.pool()
    }
}

/// A Postgres metadata store backed by a throwaway container.
#[allow(dead_code)]
pub struct PostgresTestMetadata {
    pub store: Arc<SqlStore>,
    _container: ContainerAsync<GenericImage>,
}

#[allow(dead_code)]
impl PostgresTestMetadata {
    pub async fn new() -> MetadataResult<Self> {
        let container = GenericImage::new("postgres", "16-alpine")
            .with_exposed_port(5432.tcp())
            .with_wait_for(WaitFor::message_on_stderr(
                "database system is ready to accept connections",
            ))
            .with_env_var("POSTGRES_PASSWORD", "postgres")
            .start()
            .await
            .map_err(|e| {
                MetadataError::Config(format!(
                    "{POSTGRES_CONTAINER_START_ERR_PREFIX} Failed to start PostgreSQL container: {e}"
                ))
            })?;

        let host = container.get_host().await.expect("Failed to get host");
        let port = container
            .get_host_port_ipv4(5432)
            .await
            .expect("Failed to get port");

        let config = MetadataConfig {
            backend: SqlBackend {
                dialect: SqlDialect::Postgres,
                rds_iam: false,
            },
            connection_string: format!("postgres://postgres:postgres@{host}:{port}/postgres"),
            pool: PoolConfig::default(),
        };

        // The image restarts once after initdb; the first ready message can
        // precede a short window where connections are refused.
        let mut attempts = 0;
        let store = loop {
            match SqlStore::connect(&config).await {
                Ok(store) => break store,
                Err(e) if attempts < 20 => {
                    attempts += 1;
                    eprintln!("waiting for postgres: {e}");
                    tokio::time::sleep(Duration::from_millis(500)).await;
                }
                Err(e) => return Err(e),
            }
        };

        Ok(Self {
            store: Arc::new(store),
            _container: container,
        })
    }

    pub fn store(&self) -> Arc<dyn MetadataStore> {
        self.store.clone()
    }

    pub fn pool(&self) -> &AnyPool {
        self.store.pool()
    }
}

/// Run a test against both SQLite and PostgreSQL backends.
#[allow(dead_code)]
pub async fn run_metadata_test_both<F, Fut>(test_fn: F)
where
    F: Fn(Arc<SqlStore>) -> Fut + Clone,
    Fut: std::future::Future<Output = ()>,
{
    let sqlite = TestMetadata::new()
        .await
        .expect("Failed to create SQLite test metadata");
    test_fn.clone()(sqlite.store.clone()).await;

    if std::env::var("SKIP_POSTGRES_TESTS").is_err() {
        match PostgresTestMetadata::new().await {
            Ok(postgres) => {
                test_fn(postgres.store.clone()).await;
            }
            Err(err) => {
                eprintln!("Skipping PostgreSQL metadata tests: {err}");
            }
        }
    }
}

/// Number of rows in `table`.
#[allow(dead_code)]
pub async fn count_rows(pool: &AnyPool, table: &str) -> i64 {
    sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(pool)
        .await
        .unwrap_or_else(|e| panic!("failed to count {table}: {e}"))
}
