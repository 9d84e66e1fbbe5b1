//! Writing one envelope's rows.
//!
//! Everything happens inside a single [`IngestTx`]; the caller commits on
//! success and rolls back on any error, so a failed ingest leaves no rows.

use crate::error::{MetadataError, MetadataResult};
use crate::models::{SignatureRow, format_instant, new_id};
use crate::parsers::{PredicateParser, predicate_parser};
use crate::tx::IngestTx;
use archivista_core::dsse::TIMESTAMP_RFC3161;
use archivista_core::encoding::b64_encode;
use archivista_core::{Bundle, Envelope, Signature, SignatureTimestamp, Statement, Subject, rfc3161};
use std::collections::BTreeMap;
use std::sync::Arc;
use time::OffsetDateTime;

/// Payload types containing this prefix are witness policies, not
/// in-toto statements.
pub const POLICY_PAYLOAD_TYPE: &str = "https://witness.testifysec.com/policy/";

pub fn is_policy(payload_type: &str) -> bool {
    payload_type.contains(POLICY_PAYLOAD_TYPE)
}

/// The decoded envelope body, prepared before the transaction opens.
pub(crate) enum Body {
    Statement {
        statement: Statement,
        parser: Option<Arc<dyn PredicateParser>>,
    },
    Policy,
}

impl Body {
    pub(crate) fn prepare(envelope: &Envelope) -> MetadataResult<Self> {
        if is_policy(&envelope.payload_type) {
            // Policies must at least be a JSON object.
            serde_json::from_slice::<serde_json::Map<String, serde_json::Value>>(&envelope.payload)
                .map_err(archivista_core::Error::from)?;
            return Ok(Self::Policy);
        }
        let statement = Statement::from_json(&envelope.payload)?;
        let parser = predicate_parser(&statement.predicate_type);
        if parser.is_none() {
            tracing::debug!(
                predicate_type = %statement.predicate_type,
                "no predicate parser registered, storing statement only"
            );
        }
        Ok(Self::Statement { statement, parser })
    }
}

pub(crate) async fn write_envelope(
    tx: &mut IngestTx,
    gitoid: &str,
    envelope: &Envelope,
    body: &Body,
    bundle: Option<&Bundle>,
) -> MetadataResult<()> {
    let dsse_id = tx.insert_dsse(gitoid, &envelope.payload_type).await?;

    for sig in &envelope.signatures {
        write_signature(tx, &dsse_id, sig).await?;
    }

    for (algorithm, value) in envelope.payload_digests() {
        tx.insert_payload_digest(&dsse_id, &algorithm, &value).await?;
    }

    if let Some(bundle) = bundle {
        let created_at = format_instant(OffsetDateTime::now_utc())?;
        tx.insert_sigstore_bundle(
            &dsse_id,
            gitoid,
            &bundle.media_type,
            bundle.version().as_deref(),
            &created_at,
        )
        .await?;
    }

    match body {
        Body::Policy => {
            let statement_id = tx.insert_statement(&envelope.payload_type).await?;
            tx.link_statement(&dsse_id, &statement_id).await?;
            let subject = Subject {
                name: gitoid.to_string(),
                digest: BTreeMap::new(),
            };
            tx.insert_subjects(&statement_id, std::slice::from_ref(&subject))
                .await?;
            tx.insert_attestation_policy(&statement_id, gitoid).await?;
        }
        Body::Statement { statement, parser } => {
            let statement_id = tx.insert_statement(&statement.predicate_type).await?;
            tx.link_statement(&dsse_id, &statement_id).await?;
            tx.insert_subjects(&statement_id, &statement.subject).await?;
            if let Some(parser) = parser {
                parser
                    .parse(tx, &statement_id, statement.predicate_bytes())
                    .await?;
            }
        }
    }

    Ok(())
}

async fn write_signature(tx: &mut IngestTx, dsse_id: &str, sig: &Signature) -> MetadataResult<()> {
    let row = SignatureRow {
        id: new_id(),
        dsse_id: dsse_id.to_string(),
        key_id: sig.key_id.clone(),
        signature: b64_encode(&sig.signature),
        certificate: (!sig.certificate.is_empty()).then(|| sig.certificate.clone()),
        intermediates: SignatureRow::encode_intermediates(&sig.intermediates)?,
    };
    tx.insert_signature(&row).await?;

    for ts in &sig.timestamps {
        let instant = timestamp_instant(ts)?;
        tx.insert_timestamp(&row.id, &ts.kind, &ts.data, &instant)
            .await?;
    }
    Ok(())
}

/// The signing time a timestamp token attests to, formatted for storage.
fn timestamp_instant(ts: &SignatureTimestamp) -> MetadataResult<String> {
    match ts.kind.as_str() {
        TIMESTAMP_RFC3161 => {
            let gen_time = rfc3161::gen_time(&ts.data)
                .map_err(|e| MetadataError::MalformedTimestamp(e.to_string()))?;
            format_instant(gen_time)
        }
        other => Err(MetadataError::MalformedTimestamp(format!(
            "unsupported timestamp type {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn policy_payload_types() {
        assert!(is_policy("https://witness.testifysec.com/policy/v0.1"));
        assert!(!is_policy("application/vnd.in-toto+json"));
    }

    #[test]
    fn rfc3161_tokens_yield_gen_time() {
        let token = rfc3161::token_for_testing(datetime!(2024-05-06 07:08:09 UTC));
        let ts = SignatureTimestamp::rfc3161(token);
        assert_eq!(timestamp_instant(&ts).unwrap(), "2024-05-06T07:08:09Z");
    }

    #[test]
    fn bad_tokens_are_malformed() {
        let ts = SignatureTimestamp::rfc3161(b"not der".to_vec());
        assert!(matches!(
            timestamp_instant(&ts),
            Err(MetadataError::MalformedTimestamp(_))
        ));

        let ts = SignatureTimestamp {
            kind: "rekor".to_string(),
            data: b"x".to_vec(),
        };
        assert!(matches!(
            timestamp_instant(&ts),
            Err(MetadataError::MalformedTimestamp(_))
        ));
    }

    #[test]
    fn policies_skip_statement_parsing() {
        let envelope = Envelope {
            payload: br#"{"expires":"2030-01-01T00:00:00Z","steps":{}}"#.to_vec(),
            payload_type: format!("{POLICY_PAYLOAD_TYPE}v0.1"),
            signatures: Vec::new(),
        };
        assert!(matches!(Body::prepare(&envelope), Ok(Body::Policy)));

        let envelope = Envelope {
            payload_type: "application/vnd.in-toto+json".to_string(),
            ..envelope
        };
        assert!(Body::prepare(&envelope).is_err());
    }

    #[test]
    fn policies_must_be_json_objects() {
        for payload in [&b"not json"[..], &b"[1, 2]"[..], &b"\"policy\""[..]] {
            let envelope = Envelope {
                payload: payload.to_vec(),
                payload_type: format!("{POLICY_PAYLOAD_TYPE}v0.1"),
                signatures: Vec::new(),
            };
            let err = Body::prepare(&envelope).err().unwrap();
            assert!(
                matches!(&err, MetadataError::Payload(e) if e.is_validation()),
                "got {err}"
            );
        }
    }
}
