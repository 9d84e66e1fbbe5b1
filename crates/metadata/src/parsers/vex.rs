//! OpenVEX documents: vulnerability exploitability statements.

use super::PredicateParser;
use crate::error::MetadataResult;
use crate::tx::IngestTx;
use async_trait::async_trait;
use serde::Deserialize;

pub const PREDICATE_TYPES: [&str; 2] = ["https://openvex.dev/ns", "https://openvex.dev/ns/v0.2.0"];

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct VexDocument {
    #[serde(rename = "@id")]
    id: String,
    statements: Vec<VexStatement>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct VexStatement {
    vulnerability: Vulnerability,
}

/// Either `{"name": "CVE-..."}` or, in pre-0.2 documents, the bare id.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Vulnerability {
    Named {
        #[serde(default)]
        name: String,
    },
    Plain(String),
}

impl Default for Vulnerability {
    fn default() -> Self {
        Self::Plain(String::new())
    }
}

impl Vulnerability {
    fn name(&self) -> &str {
        match self {
            Self::Named { name } | Self::Plain(name) => name,
        }
    }
}

pub struct VexParser;

#[async_trait]
impl PredicateParser for VexParser {
    async fn parse(
        &self,
        tx: &mut IngestTx,
        statement_id: &str,
        predicate: &[u8],
    ) -> MetadataResult<()> {
        let document: VexDocument =
            serde_json::from_slice::<Option<VexDocument>>(predicate)?.unwrap_or_default();

        let document_id = tx.insert_vex_document(statement_id, &document.id).await?;
        for statement in &document.statements {
            tx.insert_vex_statement(&document_id, statement.vulnerability.name())
                .await?;
        }
        Ok(())
    }
}
