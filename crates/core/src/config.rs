//! Configuration types shared across crates.
//!
//! The service is configured through a flat set of keys. Each key can come
//! from a TOML file or from the environment with an `ARCHIVISTA_` prefix
//! (the older `ARCHIVIST_` prefix is still honored, with a warning).

use crate::bundle::{BundleLimits, DEFAULT_MAX_PAYLOAD_SIZE, DEFAULT_MAX_SIGNATURES};
use crate::error::{Error, Result};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment prefix for configuration keys.
pub const ENV_PREFIX: &str = "ARCHIVISTA_";

/// Deprecated environment prefix, accepted with a warning.
pub const DEPRECATED_ENV_PREFIX: &str = "ARCHIVIST_";

/// Environment variable holding the optional config file path.
pub const CONFIG_FILE_ENV: &str = "ARCHIVISTA_CONFIG";

/// Complete application configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// `tcp://host:port` or `unix:///path/to/socket`.
    pub listen_on: String,
    /// Request read timeout in seconds.
    pub read_timeout: u64,
    /// Response write timeout in seconds.
    pub write_timeout: u64,
    /// Log level used when `RUST_LOG` is unset.
    pub log_level: String,
    /// Allowed CORS origins. Empty disables CORS.
    #[serde(deserialize_with = "string_list")]
    pub cors_allow_origins: Vec<String>,

    pub enable_spiffe: bool,
    pub spiffe_address: String,
    pub spiffe_trusted_server_id: String,

    pub enable_sql_store: bool,
    pub sql_store_connection_string: String,
    /// `MYSQL`, `PSQL` or `SQLITE`, optionally suffixed with `_RDS_IAM`.
    pub sql_store_backend: String,
    pub sql_store_max_idle_connections: u32,
    pub sql_store_max_open_connections: u32,
    /// Go-style duration, e.g. `3m` or `1h30m`.
    #[serde(deserialize_with = "lenient_string")]
    pub sql_store_connection_max_lifetime: String,

    /// `FILE`, `BLOB` or empty for no blob store.
    pub storage_backend: String,
    pub file_dir: PathBuf,
    /// Address for a standalone static file server over `file_dir`.
    pub file_serve_on: String,
    pub blob_store_endpoint: String,
    pub blob_store_credential_type: String,
    #[serde(deserialize_with = "lenient_string")]
    pub blob_store_access_key_id: String,
    #[serde(deserialize_with = "lenient_string")]
    pub blob_store_secret_access_key_id: String,
    pub blob_store_use_tls: bool,
    pub blob_store_bucket_name: String,
    pub blob_store_region: String,

    pub enable_graphql: bool,
    pub graphql_web_client_enable: bool,
    pub enable_metrics: bool,

    pub max_payload_size_mib: u64,
    pub max_signatures_per_bundle: usize,

    /// Publishers notified after a successful ingest.
    #[serde(deserialize_with = "string_list")]
    pub publisher: Vec<String>,
    pub publisher_dapr_host: String,
    pub publisher_dapr_port: u16,
    pub publisher_dapr_url: String,
    pub publisher_dapr_component_name: String,
    pub publisher_dapr_topic: String,
    pub publisher_rstuf_host: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen_on: "tcp://127.0.0.1:8082".to_string(),
            read_timeout: 120,
            write_timeout: 120,
            log_level: "INFO".to_string(),
            cors_allow_origins: Vec::new(),
            enable_spiffe: false,
            spiffe_address: "unix:///tmp/spire-agent/public/api.sock".to_string(),
            spiffe_trusted_server_id: String::new(),
            enable_sql_store: true,
            sql_store_connection_string: "sqlite://archivista.db".to_string(),
            sql_store_backend: "SQLITE".to_string(),
            sql_store_max_idle_connections: 10,
            sql_store_max_open_connections: 100,
            sql_store_connection_max_lifetime: "3m".to_string(),
            storage_backend: String::new(),
            file_dir: PathBuf::from("/tmp/archivista/"),
            file_serve_on: String::new(),
            blob_store_endpoint: "127.0.0.1:9000".to_string(),
            blob_store_credential_type: "ACCESS_KEY".to_string(),
            blob_store_access_key_id: String::new(),
            blob_store_secret_access_key_id: String::new(),
            blob_store_use_tls: true,
            blob_store_bucket_name: String::new(),
            blob_store_region: "us-east-1".to_string(),
            enable_graphql: true,
            graphql_web_client_enable: true,
            enable_metrics: false,
            max_payload_size_mib: (DEFAULT_MAX_PAYLOAD_SIZE / (1024 * 1024)) as u64,
            max_signatures_per_bundle: DEFAULT_MAX_SIGNATURES,
            publisher: Vec::new(),
            publisher_dapr_host: "http://127.0.0.1".to_string(),
            publisher_dapr_port: 3500,
            publisher_dapr_url: String::new(),
            publisher_dapr_component_name: "archivista".to_string(),
            publisher_dapr_topic: "attestations".to_string(),
            publisher_rstuf_host: "http://127.0.0.1".to_string(),
        }
    }
}

/// Where the HTTP server listens.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ListenAddr {
    Tcp(String),
    Unix(PathBuf),
}

/// Blob store selection derived from [`AppConfig`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StorageConfig {
    /// Uploads are indexed but their bytes are not kept.
    Disabled,
    /// Local filesystem storage.
    Filesystem {
        /// Root directory for blobs.
        path: PathBuf,
    },
    /// S3-compatible storage.
    S3 {
        bucket: String,
        /// Full endpoint URL including scheme.
        endpoint: String,
        region: String,
        /// `None` means the default AWS credential chain (IAM).
        credentials: Option<S3Credentials>,
    },
}

/// Static S3 credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct S3Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl std::fmt::Debug for S3Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

/// SQL dialect of the metadata store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SqlDialect {
    Sqlite,
    Postgres,
    Mysql,
}

impl SqlDialect {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sqlite => "SQLITE",
            Self::Postgres => "PSQL",
            Self::Mysql => "MYSQL",
        }
    }
}

/// A parsed `SQL_STORE_BACKEND` value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SqlBackend {
    pub dialect: SqlDialect,
    /// Authenticate with short-lived RDS IAM tokens.
    pub rds_iam: bool,
}

impl std::str::FromStr for SqlBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let upper = s.trim().to_ascii_uppercase();
        let (name, rds_iam) = match upper.strip_suffix("_RDS_IAM") {
            Some(name) => (name, true),
            None => (upper.as_str(), false),
        };
        let dialect = match name {
            "MYSQL" => SqlDialect::Mysql,
            "PSQL" => SqlDialect::Postgres,
            "SQLITE" => SqlDialect::Sqlite,
            _ => return Err(Error::Config(format!("unknown sql store backend: {s}"))),
        };
        if rds_iam && dialect == SqlDialect::Sqlite {
            return Err(Error::Config(
                "RDS IAM authentication is not available for SQLITE".to_string(),
            ));
        }
        Ok(Self { dialect, rds_iam })
    }
}

/// Connection pool settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolConfig {
    pub max_idle: u32,
    pub max_open: u32,
    pub max_lifetime: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle: 10,
            max_open: 100,
            max_lifetime: Duration::from_secs(180),
        }
    }
}

/// Metadata store settings derived from [`AppConfig`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetadataConfig {
    pub backend: SqlBackend,
    pub connection_string: String,
    pub pool: PoolConfig,
}

impl MetadataConfig {
    /// SQLite database in a file, for tests and local runs.
    pub fn sqlite(path: &Path) -> Self {
        Self {
            backend: SqlBackend {
                dialect: SqlDialect::Sqlite,
                rds_iam: false,
            },
            connection_string: format!("sqlite://{}?mode=rwc", path.display()),
            pool: PoolConfig::default(),
        }
    }
}

/// Downstream notification targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PublisherKind {
    Dapr,
    Rstuf,
}

impl AppConfig {
    /// Build the figment used to load configuration: defaults, then the
    /// optional TOML file, then deprecated env keys, then current env keys.
    pub fn figment(config_file: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));
        if let Some(path) = config_file {
            figment = figment.merge(Toml::file(path));
        }
        figment
            .merge(Env::prefixed(DEPRECATED_ENV_PREFIX))
            .merge(Env::prefixed(ENV_PREFIX).ignore(&["config"]))
    }

    /// Load configuration from the process environment and an optional file.
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        check_env_prefixes(std::env::vars())?;
        let config: AppConfig = Self::figment(config_file)
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Configuration for tests: SQLite metadata, no blob store.
    pub fn for_testing() -> Self {
        Self {
            listen_on: "tcp://127.0.0.1:0".to_string(),
            sql_store_connection_string: "sqlite::memory:".to_string(),
            ..Self::default()
        }
    }

    /// Check every derived setting. Called once at startup.
    pub fn validate(&self) -> Result<()> {
        self.listen_addr()?;
        self.storage()?;
        self.metadata()?;
        if self.max_payload_size_mib == 0 {
            return Err(Error::Config(
                "MAX_PAYLOAD_SIZE_MIB must be greater than 0".to_string(),
            ));
        }
        if self.max_signatures_per_bundle == 0 {
            return Err(Error::Config(
                "MAX_SIGNATURES_PER_BUNDLE must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> Result<ListenAddr> {
        parse_listen_addr(&self.listen_on)
    }

    pub fn storage(&self) -> Result<StorageConfig> {
        match self.storage_backend.trim().to_ascii_uppercase().as_str() {
            "" => Ok(StorageConfig::Disabled),
            "FILE" => Ok(StorageConfig::Filesystem {
                path: self.file_dir.clone(),
            }),
            "BLOB" => {
                if self.blob_store_bucket_name.is_empty() {
                    return Err(Error::Config(
                        "BLOB_STORE_BUCKET_NAME is required for the BLOB storage backend"
                            .to_string(),
                    ));
                }
                let credentials = match self
                    .blob_store_credential_type
                    .trim()
                    .to_ascii_uppercase()
                    .as_str()
                {
                    "IAM" => None,
                    "ACCESS_KEY" | "" => Some(S3Credentials {
                        access_key_id: self.blob_store_access_key_id.clone(),
                        secret_access_key: self.blob_store_secret_access_key_id.clone(),
                    }),
                    other => {
                        return Err(Error::Config(format!(
                            "unknown blob store credential type: {other}"
                        )));
                    }
                };
                Ok(StorageConfig::S3 {
                    bucket: self.blob_store_bucket_name.clone(),
                    endpoint: endpoint_url(&self.blob_store_endpoint, self.blob_store_use_tls),
                    region: self.blob_store_region.clone(),
                    credentials,
                })
            }
            other => Err(Error::Config(format!("unknown storage backend: {other}"))),
        }
    }

    /// `None` when the SQL store is disabled.
    pub fn metadata(&self) -> Result<Option<MetadataConfig>> {
        if !self.enable_sql_store {
            return Ok(None);
        }
        let backend: SqlBackend = self.sql_store_backend.parse()?;
        let max_lifetime = parse_go_duration(&self.sql_store_connection_max_lifetime)?;
        Ok(Some(MetadataConfig {
            backend,
            connection_string: self.sql_store_connection_string.clone(),
            pool: PoolConfig {
                max_idle: self.sql_store_max_idle_connections,
                max_open: self.sql_store_max_open_connections,
                max_lifetime,
            },
        }))
    }

    pub fn bundle_limits(&self) -> BundleLimits {
        let max_payload_size = usize::try_from(self.max_payload_size_mib)
            .ok()
            .and_then(|mib| mib.checked_mul(1024 * 1024))
            .unwrap_or(usize::MAX);
        BundleLimits {
            max_payload_size,
            max_signatures: self.max_signatures_per_bundle,
        }
    }

    /// Configured publishers. Unknown names are logged and skipped.
    pub fn publishers(&self) -> Vec<PublisherKind> {
        let mut kinds = Vec::new();
        for name in &self.publisher {
            let kind = match name.trim().to_ascii_uppercase().as_str() {
                "DAPR" => PublisherKind::Dapr,
                "RSTUF" => PublisherKind::Rstuf,
                _ => {
                    tracing::warn!(publisher = %name, "unknown publisher, skipping");
                    continue;
                }
            };
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
        kinds
    }

    /// Default tracing filter derived from `LOG_LEVEL`.
    pub fn log_filter(&self) -> String {
        let level = self.log_level.trim().to_ascii_lowercase();
        let level = if level.is_empty() { "info" } else { level.as_str() };
        format!("{level},tower_http={level}")
    }
}

/// Reject environments that mix the current and deprecated prefixes, and
/// warn once per deprecated key.
pub fn check_env_prefixes<I>(vars: I) -> Result<()>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut deprecated = Vec::new();
    let mut current = false;
    for (key, _) in vars {
        if key.starts_with(ENV_PREFIX) {
            if key != CONFIG_FILE_ENV {
                current = true;
            }
        } else if key.starts_with(DEPRECATED_ENV_PREFIX) {
            deprecated.push(key);
        }
    }

    if deprecated.is_empty() {
        return Ok(());
    }
    if current {
        return Err(Error::Config(format!(
            "environment mixes {DEPRECATED_ENV_PREFIX} and {ENV_PREFIX} variables; \
             rename {} to use {ENV_PREFIX}",
            deprecated.join(", ")
        )));
    }
    for key in &deprecated {
        tracing::warn!(
            key = %key,
            "{DEPRECATED_ENV_PREFIX} prefix is deprecated, use {ENV_PREFIX}"
        );
    }
    Ok(())
}

fn parse_listen_addr(value: &str) -> Result<ListenAddr> {
    if let Some(rest) = value.strip_prefix("tcp://") {
        if rest.is_empty() {
            return Err(Error::Config(format!("invalid listen address: {value}")));
        }
        return Ok(ListenAddr::Tcp(rest.to_string()));
    }
    if let Some(rest) = value.strip_prefix("unix://") {
        if rest.is_empty() {
            return Err(Error::Config(format!("invalid listen address: {value}")));
        }
        return Ok(ListenAddr::Unix(PathBuf::from(rest)));
    }
    if value.contains("://") {
        return Err(Error::Config(format!(
            "unsupported listen scheme in {value}, expected tcp:// or unix://"
        )));
    }
    Ok(ListenAddr::Tcp(value.to_string()))
}

fn endpoint_url(endpoint: &str, use_tls: bool) -> String {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.to_string()
    } else if use_tls {
        format!("https://{endpoint}")
    } else {
        format!("http://{endpoint}")
    }
}

/// Parse a Go-style duration such as `90s`, `3m` or `1h30m`.
pub fn parse_go_duration(value: &str) -> Result<Duration> {
    let invalid = || Error::Config(format!("invalid duration: {value:?}"));
    let value = value.trim();
    if value == "0" {
        return Ok(Duration::ZERO);
    }
    if value.is_empty() {
        return Err(invalid());
    }

    let mut total = Duration::ZERO;
    let mut rest = value;
    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(invalid)?;
        if digits == 0 {
            return Err(invalid());
        }
        let amount: f64 = rest[..digits].parse().map_err(|_| invalid())?;
        rest = &rest[digits..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let scale = match &rest[..unit_len] {
            "ns" => 1e-9,
            "us" | "µs" => 1e-6,
            "ms" => 1e-3,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            _ => return Err(invalid()),
        };
        rest = &rest[unit_len..];
        total += Duration::try_from_secs_f64(amount * scale).map_err(|_| invalid())?;
    }
    Ok(total)
}

/// Environment values that look like numbers arrive as numbers.
fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        String(String),
        Int(i64),
        Float(f64),
        Bool(bool),
    }

    Ok(match Scalar::deserialize(deserializer)? {
        Scalar::String(s) => s,
        Scalar::Int(n) => n.to_string(),
        Scalar::Float(n) => n.to_string(),
        Scalar::Bool(b) => b.to_string(),
    })
}

/// Accept either a sequence or a comma separated string.
fn string_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ListOrString {
        List(Vec<String>),
        String(String),
    }

    Ok(match ListOrString::deserialize(deserializer)? {
        ListOrString::List(items) => items,
        ListOrString::String(s) => s
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect(),
    })
}
