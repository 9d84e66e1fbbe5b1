use archivista_storage::traits::BlobStore;
use archivista_storage::{S3Backend, StorageError};
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::Credentials;
use bytes::Bytes;
use futures::StreamExt;
use testcontainers::core::{IntoContainerPort, WaitFor};
use testcontainers::{ContainerAsync, GenericImage, ImageExt, runners::AsyncRunner};

const MINIO_IMAGE: &str = "minio/minio";
const MINIO_TAG: &str = "RELEASE.2024-02-12T21-36-45Z";
const GITOID: &str = "473a0f4c3be8a93681a267e3b1e9a7dcda1185436fe141f7749120a303721813";

fn should_skip_s3_tests() -> bool {
    std::env::var("SKIP_S3_TESTS").is_ok()
}

struct MinioContext {
    _container: ContainerAsync<GenericImage>,
    endpoint: String,
    access_key: String,
    secret_key: String,
}

impl MinioContext {
    async fn new() -> Result<Self, String> {
        let access_key = "minio-access-key".to_string();
        let secret_key = "minio-secret-key".to_string();

        let container: ContainerAsync<GenericImage> = GenericImage::new(MINIO_IMAGE, MINIO_TAG)
            .with_exposed_port(9000.tcp())
            .with_wait_for(WaitFor::message_on_stdout("API:"))
            .with_env_var("MINIO_ROOT_USER", access_key.clone())
            .with_env_var("MINIO_ROOT_PASSWORD", secret_key.clone())
            .with_cmd(vec!["server", "/data"])
            .start()
            .await
            .map_err(|e| format!("failed to start MinIO container: {e}"))?;

        let host = container
            .get_host()
            .await
            .map_err(|e| format!("failed to get host: {e}"))?;
        let port = container
            .get_host_port_ipv4(9000.tcp())
            .await
            .map_err(|e| format!("failed to get port: {e}"))?;

        Ok(Self {
            _container: container,
            endpoint: format!("http://{host}:{port}"),
            access_key,
            secret_key,
        })
    }

    async fn create_bucket(&self, bucket: &str) -> Result<(), String> {
        let credentials = Credentials::new(
            self.access_key.clone(),
            self.secret_key.clone(),
            None,
            None,
            "test",
        );
        let config = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(aws_config::Region::new("us-east-1"))
            .credentials_provider(credentials)
            .endpoint_url(self.endpoint.clone())
            .force_path_style(true)
            .build();

        Client::from_conf(config)
            .create_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| format!("failed to create bucket: {e}"))?;
        Ok(())
    }

    fn backend(&self, bucket: &str) -> S3Backend {
        S3Backend::new(
            bucket,
            &self.endpoint,
            "us-east-1",
            Some((self.access_key.clone(), self.secret_key.clone())),
        )
        .unwrap()
    }
}

#[tokio::test]
async fn test_s3_store_get_stream() {
    if should_skip_s3_tests() {
        return;
    }

    let context = match MinioContext::new().await {
        Ok(context) => context,
        Err(err) => {
            eprintln!("Skipping S3 test: {err}");
            return;
        }
    };
    context.create_bucket("attestations").await.unwrap();
    let backend = context.backend("attestations");
    backend.health_check().await.unwrap();

    let data = Bytes::from(vec![7u8; 256 * 1024]);
    assert!(!backend.exists(GITOID).await.unwrap());
    backend.store(GITOID, data.clone()).await.unwrap();
    backend.store(GITOID, data.clone()).await.unwrap();
    assert!(backend.exists(GITOID).await.unwrap());
    assert_eq!(backend.get(GITOID).await.unwrap(), data);

    let mut stream = backend.get_stream(GITOID).await.unwrap();
    let mut streamed = Vec::new();
    while let Some(chunk) = stream.next().await {
        streamed.extend_from_slice(&chunk.unwrap());
    }
    assert_eq!(streamed, data);

    assert!(matches!(
        backend.get("missing").await,
        Err(StorageError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_s3_missing_bucket_fails_health_check() {
    if should_skip_s3_tests() {
        return;
    }

    let context = match MinioContext::new().await {
        Ok(context) => context,
        Err(err) => {
            eprintln!("Skipping S3 test: {err}");
            return;
        }
    };
    let backend = context.backend("does-not-exist");
    assert!(matches!(
        backend.health_check().await,
        Err(StorageError::BucketNotFound(_))
    ));
}
