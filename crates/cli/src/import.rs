//! Bulk import of envelopes straight into a metadata database.

use anyhow::{Context, Result};
use archivista_core::config::{MetadataConfig, PoolConfig, SqlBackend};
use archivista_core::{BundleLimits, Envelope, Gitoid};
use archivista_metadata::{IngestRepo, MetadataStore};
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use walkdir::WalkDir;

/// What happened to one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    Imported,
    Duplicate,
    NotEnvelope,
    Failed,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub imported: usize,
    pub duplicates: usize,
    pub not_envelopes: usize,
    pub failed: usize,
}

impl ImportSummary {
    fn record(&mut self, outcome: FileOutcome) {
        match outcome {
            FileOutcome::Imported => self.imported += 1,
            FileOutcome::Duplicate => self.duplicates += 1,
            FileOutcome::NotEnvelope => self.not_envelopes += 1,
            FileOutcome::Failed => self.failed += 1,
        }
    }
}

/// Pick the backend from `--db-backend`, falling back to the URI scheme.
pub fn metadata_config(db_uri: &str, db_backend: Option<&str>) -> Result<MetadataConfig> {
    let backend: SqlBackend = match db_backend {
        Some(name) => name.parse()?,
        None => {
            let url = url::Url::parse(db_uri).context("invalid database URI")?;
            match url.scheme() {
                "postgres" | "postgresql" | "psql" => "PSQL".parse()?,
                "mysql" => "MYSQL".parse()?,
                "sqlite" => "SQLITE".parse()?,
                other => anyhow::bail!("unsupported database scheme {other}"),
            }
        }
    };
    let connection_string = match db_uri.strip_prefix("psql://") {
        Some(rest) => format!("postgres://{rest}"),
        None => db_uri.to_string(),
    };
    Ok(MetadataConfig {
        backend,
        connection_string,
        pool: PoolConfig::default(),
    })
}

/// Every regular file under `dir`.
pub fn walk_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.with_context(|| format!("failed to walk {}", dir.display()))?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Ingest every envelope under `dir`, at most `max_concurrent` at a time.
pub async fn import_dir(
    store: Arc<dyn MetadataStore>,
    dir: &Path,
    max_concurrent: usize,
) -> Result<ImportSummary> {
    let root = dir.to_path_buf();
    let files = tokio::task::spawn_blocking(move || walk_files(&root)).await??;
    let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));

    let mut futures = FuturesUnordered::new();
    for path in files {
        let store = store.clone();
        let semaphore = semaphore.clone();
        futures.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await;
            let outcome = import_file(store.as_ref(), &path).await;
            (path, outcome)
        }));
    }

    let mut summary = ImportSummary::default();
    while let Some(joined) = futures.next().await {
        let (path, outcome) = joined.context("import task panicked")?;
        match outcome {
            FileOutcome::Imported => println!("Successfully imported {}", path.display()),
            FileOutcome::Duplicate => {
                println!("Skipping file: {} already stored", path.display())
            }
            FileOutcome::NotEnvelope => {
                println!("Skipping file: {} is not a DSSE envelope", path.display())
            }
            FileOutcome::Failed => println!("Skipping file: {} failed to import", path.display()),
        }
        summary.record(outcome);
    }
    Ok(summary)
}

async fn import_file(store: &dyn MetadataStore, path: &Path) -> FileOutcome {
    let raw = match tokio::fs::read(path).await {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "cannot read file");
            return FileOutcome::Failed;
        }
    };
    match Envelope::from_json(&raw) {
        Ok(envelope) if !envelope.payload_type.is_empty() => {}
        _ => return FileOutcome::NotEnvelope,
    }

    let gitoid = Gitoid::compute(&raw).to_hex();
    match store.store(&gitoid, &raw).await {
        Ok(()) => FileOutcome::Imported,
        Err(e) if e.is_duplicate() => FileOutcome::Duplicate,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "import failed");
            FileOutcome::Failed
        }
    }
}

/// Connect to the database and import `dir`.
pub async fn run(
    dir: &Path,
    db_uri: &str,
    db_backend: Option<&str>,
    max_concurrent: usize,
) -> Result<ImportSummary> {
    let config = metadata_config(db_uri, db_backend)?;
    let store = archivista_metadata::from_config(&config, BundleLimits::default())
        .await
        .context("failed to open metadata store")?;

    println!(
        "Importing envelopes from {} (max concurrent imports: {max_concurrent})",
        dir.display()
    );
    import_dir(store, dir, max_concurrent).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use archivista_core::config::SqlDialect;

    #[test]
    fn backend_follows_scheme() {
        let config = metadata_config("postgres://u:p@db/archivista", None).unwrap();
        assert_eq!(config.backend.dialect, SqlDialect::Postgres);

        let config = metadata_config("psql://u:p@db/archivista", None).unwrap();
        assert_eq!(config.backend.dialect, SqlDialect::Postgres);
        assert_eq!(config.connection_string, "postgres://u:p@db/archivista");

        let config = metadata_config("mysql://u:p@db:3306/archivista", None).unwrap();
        assert_eq!(config.backend.dialect, SqlDialect::Mysql);

        assert!(metadata_config("redis://db", None).is_err());
    }

    #[test]
    fn explicit_backend_wins() {
        let config = metadata_config("postgres://u@db/x", Some("PSQL_RDS_IAM")).unwrap();
        assert!(config.backend.rds_iam);
    }

    #[test]
    fn walk_skips_directories() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::create_dir(temp.path().join("nested")).unwrap();
        std::fs::write(temp.path().join("a.json"), b"{}").unwrap();
        std::fs::write(temp.path().join("nested/b.json"), b"{}").unwrap();

        let files = walk_files(temp.path()).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f.is_file()));
    }

    #[test]
    fn summary_counts_outcomes() {
        let mut summary = ImportSummary::default();
        for outcome in [
            FileOutcome::Imported,
            FileOutcome::Imported,
            FileOutcome::Duplicate,
            FileOutcome::NotEnvelope,
        ] {
            summary.record(outcome);
        }
        assert_eq!(
            summary,
            ImportSummary {
                imported: 2,
                duplicates: 1,
                not_envelopes: 1,
                failed: 0,
            }
        );
    }
}
