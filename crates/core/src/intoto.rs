//! in-toto statements.

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use std::collections::BTreeMap;

/// An in-toto Statement carried as a DSSE payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statement {
    #[serde(rename = "_type", default)]
    pub statement_type: String,
    #[serde(rename = "predicateType", default)]
    pub predicate_type: String,
    #[serde(default)]
    pub subject: Vec<Subject>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicate: Option<Box<RawValue>>,
}

/// A statement subject: a name and its digest set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub digest: BTreeMap<String, String>,
}

impl Statement {
    /// Parse a statement from a DSSE payload.
    pub fn from_json(payload: &[u8]) -> crate::Result<Self> {
        Ok(serde_json::from_slice(payload)?)
    }

    /// Raw predicate bytes, or `null` when the statement carries none.
    pub fn predicate_bytes(&self) -> &[u8] {
        self.predicate
            .as_deref()
            .map(|raw| raw.get().as_bytes())
            .unwrap_or(b"null")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_statement_and_keeps_raw_predicate() {
        let payload = br#"{
            "_type": "https://in-toto.io/Statement/v0.1",
            "predicateType": "https://witness.testifysec.com/attestation-collection/v0.1",
            "subject": [
                {"name": "file:a", "digest": {"sha256": "aa", "sha1": "bb"}},
                {"name": "file:b", "digest": {"sha256": "cc"}}
            ],
            "predicate": {"name": "build", "attestations": []},
            "unknownField": true
        }"#;
        let st = Statement::from_json(payload).unwrap();
        assert_eq!(st.subject.len(), 2);
        assert_eq!(st.subject[0].digest.len(), 2);
        let predicate: serde_json::Value = serde_json::from_slice(st.predicate_bytes()).unwrap();
        assert_eq!(predicate["name"], "build");
    }

    #[test]
    fn missing_predicate_is_null() {
        let st = Statement::from_json(br#"{"predicateType": "x"}"#).unwrap();
        assert_eq!(st.predicate_bytes(), b"null");
        assert!(st.subject.is_empty());
    }
}
