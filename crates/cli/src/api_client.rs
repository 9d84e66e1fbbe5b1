use anyhow::{Context, Result};
use reqwest::Url;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::time::Duration;

/// Envelopes whose statement has a subject with the given digest.
pub const SEARCH_QUERY: &str = r#"query($algo: String!, $digest: String!) {
  dsses(where: {hasStatementWith: {hasSubjectsWith: {hasSubjectDigestsWith: {algorithm: $algo, value: $digest}}}}) {
    edges {
      node {
        gitoidSha256
        statement {
          attestationCollections {
            name
            attestations { type }
          }
        }
      }
    }
  }
}"#;

/// Subjects of the statement inside one envelope.
pub const SUBJECTS_QUERY: &str = r#"query($gitoid: String!) {
  subjects(where: {hasStatementWith: {hasDsseWith: {gitoidSha256: $gitoid}}}) {
    edges {
      node {
        name
        subjectDigests { algorithm value }
      }
    }
  }
}"#;

const MAX_RETRIES: u32 = 3;

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    headers: HeaderMap,
}

impl ApiClient {
    pub fn new(base_url: &str, headers: &[String]) -> Result<Self> {
        let base_url = Url::parse(base_url).context("invalid archivista URL")?;
        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
            headers: parse_headers(headers)?,
        })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base_url.join(path).context("failed to build API URL")
    }

    /// Send a request once. Uploads are not retried.
    async fn send(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let response = req.headers(self.headers.clone()).send().await?;
        check_status(response).await
    }

    /// Send a read, retrying transient failures.
    async fn fetch<F>(&self, make_request: F) -> Result<reqwest::Response>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let response =
            retry_request(|| make_request().headers(self.headers.clone()).send()).await?;
        check_status(response).await
    }

    /// Upload an envelope or bundle and return its gitoid.
    pub async fn store(&self, body: Vec<u8>) -> Result<String> {
        let url = self.url("/v1/upload")?;
        let response = self.send(self.http.post(url).body(body)).await?;
        let upload: UploadResponse = response.json().await?;
        Ok(upload.gitoid)
    }

    /// Fetch the stored bytes for a gitoid.
    pub async fn download(&self, gitoid: &str) -> Result<Vec<u8>> {
        let url = self.url(&format!("/v1/download/{gitoid}"))?;
        let response = self.fetch(|| self.http.get(url.clone())).await?;
        Ok(response.bytes().await?.to_vec())
    }

    /// Rebuild a stored attestation. `format` is `bundle` or `dsse`.
    pub async fn export(&self, gitoid: &str, format: &str) -> Result<Vec<u8>> {
        let mut url = self.url(&format!("/v1/export/{gitoid}"))?;
        url.query_pairs_mut().append_pair("format", format);
        let response = self.fetch(|| self.http.get(url.clone())).await?;
        Ok(response.bytes().await?.to_vec())
    }

    pub async fn graphql<V, T>(&self, query: &str, variables: V) -> Result<T>
    where
        V: Serialize,
        T: DeserializeOwned,
    {
        let url = self.url("/v1/query")?;
        let request = GraphQlRequest { query, variables };
        let response = self.fetch(|| self.http.post(url.clone()).json(&request)).await?;
        let body: GraphQlResponse<T> = response.json().await?;

        if let Some(errors) = body.errors.filter(|e| !e.is_empty()) {
            let messages: Vec<String> = errors.into_iter().map(|e| e.message).collect();
            anyhow::bail!("graphql error: {}", messages.join("; "));
        }
        body.data.context("graphql response has no data")
    }

    pub async fn search(&self, algorithm: &str, digest: &str) -> Result<SearchResults> {
        self.graphql(
            SEARCH_QUERY,
            SearchVars {
                algo: algorithm,
                digest,
            },
        )
        .await
    }

    pub async fn subjects(&self, gitoid: &str) -> Result<SubjectResults> {
        self.graphql(SUBJECTS_QUERY, SubjectVars { gitoid }).await
    }
}

/// Parse `Key: Value` header arguments.
pub fn parse_headers(headers: &[String]) -> Result<HeaderMap> {
    let mut map = HeaderMap::new();
    for header in headers {
        let (name, value) = header
            .split_once(':')
            .with_context(|| format!("invalid header: {header}"))?;
        let name = HeaderName::from_bytes(name.trim().as_bytes())
            .with_context(|| format!("invalid header name: {header}"))?;
        let value = HeaderValue::from_str(value.trim())
            .with_context(|| format!("invalid header value: {header}"))?;
        map.insert(name, value);
    }
    Ok(map)
}

/// Pull the message out of a `{code, message}` error body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .map(|e| e.message)
        .unwrap_or_else(|_| body.trim().to_string())
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!("archivista returned {status}: {}", error_message(&body));
    }
    Ok(response)
}

/// Retries an HTTP request with exponential backoff on transient failures.
///
/// Retries on transport errors and 5xx responses. Returns immediately on
/// success or 4xx.
async fn retry_request<F, Fut>(mut make_request: F) -> reqwest::Result<reqwest::Response>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = reqwest::Result<reqwest::Response>>,
{
    let mut attempt = 0;

    loop {
        match make_request().await {
            Ok(response) if response.status().is_server_error() && attempt < MAX_RETRIES => {
                attempt += 1;
                let delay = Duration::from_secs(1 << (attempt - 1)); // 1s, 2s, 4s
                tracing::warn!(status = %response.status(), attempt, "server error, retrying in {}s", delay.as_secs());
                tokio::time::sleep(delay).await;
            }
            Ok(response) => return Ok(response),
            Err(e) if attempt < MAX_RETRIES => {
                attempt += 1;
                let delay = Duration::from_secs(1 << (attempt - 1));
                tracing::warn!(error = %e, attempt, "request error, retrying in {}s", delay.as_secs());
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

// =============================================================================
// Request/response types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct UploadResponse {
    pub gitoid: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Serialize)]
struct GraphQlRequest<'a, V> {
    query: &'a str,
    variables: V,
}

#[derive(Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Serialize)]
struct SearchVars<'a> {
    algo: &'a str,
    digest: &'a str,
}

#[derive(Serialize)]
struct SubjectVars<'a> {
    gitoid: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct Edges<T> {
    pub edges: Vec<Edge<T>>,
}

#[derive(Debug, Deserialize)]
pub struct Edge<T> {
    pub node: T,
}

#[derive(Debug, Deserialize)]
pub struct SearchResults {
    pub dsses: Edges<SearchDsse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchDsse {
    pub gitoid_sha256: String,
    pub statement: Option<SearchStatement>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchStatement {
    pub attestation_collections: Option<SearchCollection>,
}

#[derive(Debug, Deserialize)]
pub struct SearchCollection {
    pub name: String,
    pub attestations: Vec<SearchAttestation>,
}

#[derive(Debug, Deserialize)]
pub struct SearchAttestation {
    #[serde(rename = "type")]
    pub attestation_type: String,
}

#[derive(Debug, Deserialize)]
pub struct SubjectResults {
    pub subjects: Edges<SubjectNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectNode {
    pub name: String,
    pub subject_digests: Vec<SubjectDigest>,
}

#[derive(Debug, Deserialize)]
pub struct SubjectDigest {
    pub algorithm: String,
    pub value: String,
}
