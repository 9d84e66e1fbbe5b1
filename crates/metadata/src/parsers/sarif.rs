//! SARIF attestor: a static-analysis report and its rule catalogue.
//!
//! The report hangs off its own statement whose predicate is the attestor
//! type, so reports are queryable independently of the collection.

use super::{AttestorContext, AttestorParser};
use crate::error::MetadataResult;
use crate::models::{SarifRow, SarifRuleRow, new_id};
use crate::tx::IngestTx;
use async_trait::async_trait;
use serde::Deserialize;

pub const ATTESTOR_TYPE: &str = "https://witness.dev/attestations/sarif/v0.1";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SarifAttestor {
    report: Report,
    #[serde(rename = "reportFileName")]
    report_file_name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Report {
    runs: Vec<Run>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Run {
    tool: Tool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Tool {
    driver: Driver,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Driver {
    rules: Vec<Rule>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Rule {
    id: String,
    name: Option<String>,
    #[serde(rename = "shortDescription")]
    short_description: Option<Message>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Message {
    text: Option<String>,
}

pub struct SarifParser;

#[async_trait]
impl AttestorParser for SarifParser {
    async fn parse(
        &self,
        tx: &mut IngestTx,
        ctx: AttestorContext<'_>,
        attestation: &[u8],
    ) -> MetadataResult<()> {
        let sarif: SarifAttestor =
            serde_json::from_slice::<Option<SarifAttestor>>(attestation)?.unwrap_or_default();

        let statement_id = tx.insert_statement(ctx.attestor_type).await?;
        let report = SarifRow {
            id: new_id(),
            statement_id,
            attestation_id: Some(ctx.attestation_id.to_string()),
            report_file_name: sarif.report_file_name,
        };
        tx.insert_sarif(&report).await?;

        let rules = sarif
            .report
            .runs
            .into_iter()
            .flat_map(|run| run.tool.driver.rules);
        for rule in rules {
            let row = SarifRuleRow {
                id: new_id(),
                sarif_id: report.id.clone(),
                rule_id: rule.id,
                rule_name: rule.name.unwrap_or_default(),
                short_description: rule
                    .short_description
                    .and_then(|m| m.text)
                    .unwrap_or_default(),
            };
            tx.insert_sarif_rule(&row).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_optional_rule_fields_are_tolerated() {
        let raw = br#"{
            "reportFileName": "results.sarif",
            "report": {"runs": [{"tool": {"driver": {"name": "semgrep", "rules": [
                {"id": "R1", "name": "no-eval", "shortDescription": {"text": "avoid eval"}},
                {"id": "R2"}
            ]}}}]}
        }"#;
        let sarif: SarifAttestor = serde_json::from_slice(raw).unwrap();
        let rules = &sarif.report.runs[0].tool.driver.rules;
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].name.as_deref(), Some("no-eval"));
        assert!(rules[1].short_description.is_none());
    }
}
