//! Synthesized attestations.
//!
//! Shapes follow what witness and cosign emit; signatures and certificates
//! are opaque bytes since nothing here verifies them.

#![allow(dead_code)]

use archivista_core::encoding::b64_encode;
use archivista_core::rfc3161;
use archivista_metadata::parsers::{collection, git, omnitrail, sarif};
use serde_json::{Value, json};
use time::OffsetDateTime;

pub const INTOTO_PAYLOAD_TYPE: &str = "application/vnd.in-toto+json";
pub const STATEMENT_TYPE: &str = "https://in-toto.io/Statement/v0.1";
pub const BUNDLE_MEDIA_TYPE: &str = "application/vnd.dev.sigstore.bundle.v0.3+json";

/// An in-toto statement. Each subject is `(name, sha256)`.
pub fn statement(predicate_type: &str, subjects: &[(&str, &str)], predicate: Value) -> Vec<u8> {
    let subject: Vec<Value> = subjects
        .iter()
        .map(|(name, digest)| json!({"name": name, "digest": {"sha256": digest}}))
        .collect();
    serde_json::to_vec(&json!({
        "_type": STATEMENT_TYPE,
        "predicateType": predicate_type,
        "subject": subject,
        "predicate": predicate,
    }))
    .unwrap()
}

/// A DSSE envelope with one signature per key id.
pub fn envelope_with_type(payload: &[u8], payload_type: &str, key_ids: &[&str]) -> Vec<u8> {
    let signatures: Vec<Value> = key_ids
        .iter()
        .map(|key_id| json!({"keyid": key_id, "sig": b64_encode(format!("sig-{key_id}").as_bytes())}))
        .collect();
    serde_json::to_vec(&json!({
        "payload": b64_encode(payload),
        "payloadType": payload_type,
        "signatures": signatures,
    }))
    .unwrap()
}

pub fn envelope(payload: &[u8]) -> Vec<u8> {
    envelope_with_type(payload, INTOTO_PAYLOAD_TYPE, &["test-key"])
}

/// A go-witness envelope whose signature carries a certificate chain and a
/// timestamp token.
pub fn envelope_with_material(payload: &[u8], chain: &[Vec<u8>], token: &[u8]) -> Vec<u8> {
    let intermediates: Vec<String> = chain[1..].iter().map(|c| b64_encode(c)).collect();
    serde_json::to_vec(&json!({
        "payload": b64_encode(payload),
        "payloadType": INTOTO_PAYLOAD_TYPE,
        "signatures": [{
            "keyid": "witness-key",
            "sig": b64_encode(b"witness-signature"),
            "certificate": b64_encode(&chain[0]),
            "intermediates": intermediates,
            "timestamps": [{"type": "tsp", "data": b64_encode(token)}],
        }],
    }))
    .unwrap()
}

/// Package attestation: a collection with a git attestor over one artifact.
pub fn package_attestation(artifact: &str, digest: &str) -> Vec<u8> {
    let predicate = json!({
        "name": "package",
        "attestations": [
            {"type": git::ATTESTOR_TYPE, "attestation": git_attestor()},
            {"type": "https://witness.dev/attestations/environment/v0.1", "attestation": {"os": "linux"}},
        ],
    });
    envelope(&statement(collection::PREDICATE_TYPE, &[(artifact, digest)], predicate))
}

/// Build attestation: git, SARIF and omnitrail attestors in one collection.
pub fn build_attestation(subjects: &[(&str, &str)]) -> Vec<u8> {
    let predicate = json!({
        "name": "build",
        "attestations": [
            {"type": git::ATTESTOR_TYPE, "attestation": git_attestor()},
            {"type": sarif::ATTESTOR_TYPE, "attestation": sarif_attestor()},
            {"type": omnitrail::ATTESTOR_TYPE, "attestation": omnitrail_attestor()},
        ],
    });
    envelope(&statement(collection::PREDICATE_TYPE, subjects, predicate))
}

pub fn git_attestor() -> Value {
    json!({
        "commithash": "0f1e2d3c4b5a69788796a5b4c3d2e1f00f1e2d3c",
        "author": "Build Bot",
        "authoremail": "bot@example.com",
        "committername": "Build Bot",
        "committeremail": "bot@example.com",
        "commitdate": "2024-05-06T07:08:09Z",
        "commitmessage": "release v1.2.3",
        "status": {"src/main.rs": {"worktree": "modified"}},
        "committype": "commit",
        "commitdigest": {"sha1": "0f1e2d3c4b5a69788796a5b4c3d2e1f00f1e2d3c"},
        "signature": "",
        "parenthashes": ["aa11", "bb22"],
        "treehash": "cc33",
        "refs": ["refs/heads/main"],
        "remotes": ["https://git.example.com/app.git"],
    })
}

pub fn sarif_attestor() -> Value {
    json!({
        "reportFileName": "scan.sarif",
        "report": {"runs": [{"tool": {"driver": {"rules": [
            {"id": "RS001", "name": "unsafe-block", "shortDescription": {"text": "Avoid unsafe"}},
            {"id": "RS002"},
        ]}}}]},
    })
}

pub fn omnitrail_attestor() -> Value {
    json!({
        "Envelope": {"Mapping": {
            "/src/main.rs": {
                "Type": "file",
                "Sha256": "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08",
                "Sha1Gitoid": "gitoid:blob:sha1:aa",
                "Posix": {"Size": "42", "Permissions": "0644"},
            },
            "/src": {"Type": "directory"},
        }},
    })
}

/// OpenVEX document with two statements.
pub fn vex_attestation(product: &str, digest: &str) -> Vec<u8> {
    let predicate = json!({
        "@id": "https://openvex.dev/docs/example/vex-1",
        "statements": [
            {"vulnerability": {"name": "CVE-2024-0001"}, "status": "not_affected"},
            {"vulnerability": "CVE-2024-0002", "status": "fixed"},
        ],
    });
    envelope(&statement("https://openvex.dev/ns/v0.2.0", &[(product, digest)], predicate))
}

/// A witness policy envelope.
pub fn policy_envelope() -> Vec<u8> {
    envelope_with_type(
        br#"{"expires":"2030-01-01T00:00:00Z","steps":{}}"#,
        "https://witness.testifysec.com/policy/v0.1",
        &["policy-key"],
    )
}

/// Three fake DER certificates, leaf first.
pub fn cert_chain() -> Vec<Vec<u8>> {
    vec![
        b"leaf-certificate-der".to_vec(),
        b"intermediate-certificate-der".to_vec(),
        b"root-certificate-der".to_vec(),
    ]
}

pub fn timestamp_token(gen_time: OffsetDateTime) -> Vec<u8> {
    rfc3161::token_for_testing(gen_time)
}

/// A v0.3 bundle with an x509 chain and one RFC3161 timestamp.
pub fn sigstore_bundle(payload: &[u8], chain: &[Vec<u8>], token: &[u8]) -> Vec<u8> {
    let certificates: Vec<Value> = chain
        .iter()
        .map(|der| json!({"rawBytes": b64_encode(der)}))
        .collect();
    serde_json::to_vec(&json!({
        "mediaType": BUNDLE_MEDIA_TYPE,
        "verificationMaterial": {
            "x509CertificateChain": {"certificates": certificates},
            "timestampVerificationData": {
                "rfc3161Timestamps": [{"signedTimestamp": b64_encode(token)}],
            },
        },
        "dsseEnvelope": {
            "payload": b64_encode(payload),
            "payloadType": INTOTO_PAYLOAD_TYPE,
            "signatures": [{"keyid": "bundle-key", "sig": b64_encode(b"bundle-signature")}],
        },
    }))
    .unwrap()
}

/// A bundle carrying only a message signature.
pub fn message_signature_bundle() -> Vec<u8> {
    serde_json::to_vec(&json!({
        "mediaType": BUNDLE_MEDIA_TYPE,
        "verificationMaterial": {"certificate": {"rawBytes": b64_encode(b"leaf")}},
        "messageSignature": {
            "messageDigest": {"algorithm": "SHA2_256", "digest": b64_encode(&[7u8; 32])},
            "signature": b64_encode(b"message-signature"),
        },
    }))
    .unwrap()
}

/// `count` distinct subjects named `artifact-<i>`.
pub fn many_subjects(count: usize) -> Vec<(String, String)> {
    (0..count)
        .map(|i| (format!("artifact-{i}"), format!("{i:064x}")))
        .collect()
}

pub fn statement_with_subjects(subjects: &[(String, String)]) -> Vec<u8> {
    let borrowed: Vec<(&str, &str)> = subjects
        .iter()
        .map(|(n, d)| (n.as_str(), d.as_str()))
        .collect();
    statement("https://example.com/generic/v1", &borrowed, json!({}))
}
