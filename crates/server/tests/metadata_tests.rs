//! Metadata store integration tests.

mod common;

use archivista_core::gitoid::Gitoid;
use archivista_core::{Envelope, FormatRouter, Payload};
use archivista_metadata::models::format_instant;
use archivista_metadata::query::{DigestFilter, DsseFilter, StatementFilter, SubjectFilter};
use archivista_metadata::tx::{SUBJECT_BATCH_SIZE, SUBJECT_DIGEST_BATCH_SIZE};
use archivista_metadata::{
    EnvelopeRepo, IngestRepo, MetadataError, Page, PredicateRepo, SqlStore, StatementRepo,
};
use common::*;
use serde_json::json;
use std::sync::Arc;
use time::macros::datetime;

const ALL_TABLES: &[&str] = &[
    "dsses",
    "signatures",
    "timestamps",
    "payload_digests",
    "sigstore_bundles",
    "statements",
    "subjects",
    "subject_digests",
    "attestation_collections",
    "attestations",
    "attestation_policies",
    "git_attestations",
    "sarifs",
    "sarif_rules",
    "omnitrails",
    "mappings",
    "posixes",
    "vex_documents",
    "vex_statements",
];

async fn store_raw(store: &SqlStore, raw: &[u8]) -> Result<String, MetadataError> {
    let gitoid = Gitoid::compute(raw).to_hex();
    store.store(&gitoid, raw).await?;
    Ok(gitoid)
}

async fn assert_empty(store: &SqlStore) {
    for table in ALL_TABLES {
        assert_eq!(count_rows(store.pool(), table).await, 0, "{table} not empty");
    }
}

// =============================================================================
// Ingest
// =============================================================================

#[tokio::test]
async fn test_ingest_is_idempotent() {
    run_metadata_test_both(|store| async move {
        let raw = package_attestation("idem.bin", &"11".repeat(32));
        let gitoid = store_raw(&store, &raw).await.unwrap();

        let counts_before: Vec<i64> = table_counts(&store).await;
        let err = store.store(&gitoid, &raw).await.unwrap_err();
        assert!(err.is_duplicate(), "expected duplicate, got {err}");
        assert_eq!(table_counts(&store).await, counts_before);

        store.delete_dsse(&gitoid).await.unwrap();
    })
    .await;
}

async fn table_counts(store: &SqlStore) -> Vec<i64> {
    let mut counts = Vec::new();
    for table in ALL_TABLES {
        counts.push(count_rows(store.pool(), table).await);
    }
    counts
}

#[tokio::test]
async fn test_envelope_rows() {
    let metadata = TestMetadata::new().await.unwrap();
    let store = &metadata.store;
    let payload = statement("https://example.com/generic/v1", &[("a", &"22".repeat(32))], json!({}));
    let raw = envelope_with_type(&payload, INTOTO_PAYLOAD_TYPE, &["k1", "k2"]);
    let gitoid = store_raw(store, &raw).await.unwrap();

    let dsse = store.get_dsse_by_gitoid(&gitoid).await.unwrap().unwrap();
    let signatures = store.signatures_for_dsse(&dsse.id).await.unwrap();
    let keys: Vec<&str> = signatures.iter().map(|s| s.key_id.as_str()).collect();
    assert_eq!(keys, vec!["k1", "k2"]);
    assert_eq!(signatures[0].signature_bytes().unwrap(), b"sig-k1");

    let digests = store.payload_digests_for_dsse(&dsse.id).await.unwrap();
    let sha256 = digests.iter().find(|d| d.algorithm == "sha256").unwrap();
    assert_eq!(sha256.value, archivista_core::gitoid::sha256_hex(&payload));

    let statement = store
        .get_statement(dsse.statement_id.as_deref().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(statement.predicate, "https://example.com/generic/v1");
}

#[tokio::test]
async fn test_subject_batches_cross_boundaries() {
    let metadata = TestMetadata::new().await.unwrap();
    let store = &metadata.store;

    let mut expected_subjects = 0i64;
    let sizes = [
        1,
        SUBJECT_DIGEST_BATCH_SIZE,
        SUBJECT_BATCH_SIZE - 1,
        SUBJECT_BATCH_SIZE,
        SUBJECT_BATCH_SIZE + 1,
        SUBJECT_BATCH_SIZE * 2,
    ];
    for count in sizes {
        let subjects = many_subjects(count);
        let raw = envelope(&statement_with_subjects(&subjects));
        let gitoid = store_raw(store, &raw).await.unwrap();
        expected_subjects += count as i64;

        assert_eq!(count_rows(store.pool(), "subjects").await, expected_subjects);
        assert_eq!(
            count_rows(store.pool(), "subject_digests").await,
            expected_subjects
        );

        let dsse = store.get_dsse_by_gitoid(&gitoid).await.unwrap().unwrap();
        let filter = SubjectFilter {
            has_statement_with: Some(Box::new(StatementFilter {
                id: dsse.statement_id.clone(),
                ..Default::default()
            })),
            ..Default::default()
        };
        let page = Page {
            first: Some(1),
            ..Default::default()
        };
        let connection = store.list_subjects(&filter, &page).await.unwrap();
        assert_eq!(connection.total_count, count as i64);
    }
}

#[tokio::test]
async fn test_policy_envelopes_get_policy_rows() {
    run_metadata_test_both(|store| async move {
        let gitoid = store_raw(&store, &policy_envelope()).await.unwrap();

        let dsse = store.get_dsse_by_gitoid(&gitoid).await.unwrap().unwrap();
        let statement_id = dsse.statement_id.clone().unwrap();
        let statement = store.get_statement(&statement_id).await.unwrap().unwrap();
        assert_eq!(statement.predicate, "https://witness.testifysec.com/policy/v0.1");

        let policy = store.policy_for_statement(&statement_id).await.unwrap().unwrap();
        assert_eq!(policy.name, gitoid);
        assert!(store
            .collection_for_statement(&statement_id)
            .await
            .unwrap()
            .is_none());

        let filter = SubjectFilter {
            name: Some(gitoid.clone()),
            ..Default::default()
        };
        let subjects = store.list_subjects(&filter, &Page::default()).await.unwrap();
        assert_eq!(subjects.total_count, 1);
        let subject_id = &subjects.edges[0].node.id;
        assert!(store.subject_digests(subject_id).await.unwrap().is_empty());

        store.delete_dsse(&gitoid).await.unwrap();
    })
    .await;
}

#[tokio::test]
async fn test_non_json_policy_is_rejected() {
    run_metadata_test_both(|store| async move {
        let raw = envelope_with_type(
            b"expires: tomorrow",
            "https://witness.testifysec.com/policy/v0.1",
            &["policy-key"],
        );

        let err = store_raw(&store, &raw).await.unwrap_err();
        assert!(matches!(err, MetadataError::Payload(_)), "got {err}");
        assert_empty(&store).await;
    })
    .await;
}

#[tokio::test]
async fn test_concurrent_duplicates_store_once() {
    run_metadata_test_both(|store| async move {
        let raw = package_attestation("race.bin", &"33".repeat(32));
        let gitoid = Gitoid::compute(&raw).to_hex();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            let raw = raw.clone();
            let gitoid = gitoid.clone();
            handles.push(tokio::spawn(async move { store.store(&gitoid, &raw).await }));
        }

        let mut stored = 0;
        let mut duplicates = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(()) => stored += 1,
                Err(e) if e.is_duplicate() => duplicates += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(stored, 1);
        assert_eq!(duplicates, 7);

        let filter = DsseFilter {
            gitoid_sha256: Some(gitoid.clone()),
            ..Default::default()
        };
        let dsses = store.list_dsses(&filter, &Page::default()).await.unwrap();
        assert_eq!(dsses.total_count, 1);

        store.delete_dsse(&gitoid).await.unwrap();
    })
    .await;
}

#[tokio::test]
async fn test_malformed_timestamp_rolls_back() {
    run_metadata_test_both(|store| async move {
        let payload = statement("https://example.com/generic/v1", &[("t", &"44".repeat(32))], json!({}));
        let raw = envelope_with_material(&payload, &cert_chain(), b"not a timestamp token");

        let err = store_raw(&store, &raw).await.unwrap_err();
        assert!(matches!(err, MetadataError::MalformedTimestamp(_)), "got {err}");
        assert_empty(&store).await;
    })
    .await;
}

#[tokio::test]
async fn test_timestamps_and_chain_are_kept() {
    let metadata = TestMetadata::new().await.unwrap();
    let store = &metadata.store;
    let gen_time = datetime!(2024-05-06 07:08:09 UTC);
    let token = timestamp_token(gen_time);
    let chain = cert_chain();
    let payload = statement("https://example.com/generic/v1", &[("c", &"55".repeat(32))], json!({}));
    let gitoid = store_raw(store, &envelope_with_material(&payload, &chain, &token))
        .await
        .unwrap();

    let dsse = store.get_dsse_by_gitoid(&gitoid).await.unwrap().unwrap();
    let signature = &store.signatures_for_dsse(&dsse.id).await.unwrap()[0];
    assert_eq!(signature.certificate.as_deref(), Some(chain[0].as_slice()));
    assert_eq!(signature.intermediate_certs().unwrap(), chain[1..].to_vec());

    let timestamps = store.timestamps_for_signature(&signature.id).await.unwrap();
    assert_eq!(timestamps.len(), 1);
    assert_eq!(timestamps[0].timestamp_type, "tsp");
    assert_eq!(timestamps[0].data, token);
    assert_eq!(timestamps[0].timestamp, format_instant(gen_time).unwrap());
}

// =============================================================================
// Predicate parsers
// =============================================================================

#[tokio::test]
async fn test_collection_attestors_are_parsed() {
    run_metadata_test_both(|store| async move {
        let gitoid = store_raw(&store, &build_attestation(&[("out.bin", &"66".repeat(32))]))
            .await
            .unwrap();
        let dsse = store.get_dsse_by_gitoid(&gitoid).await.unwrap().unwrap();
        let statement_id = dsse.statement_id.clone().unwrap();

        let collection = store
            .collection_for_statement(&statement_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(collection.name, "build");
        let attestations = store.attestations_for_collection(&collection.id).await.unwrap();
        assert_eq!(attestations.len(), 3);

        let git_row = attestations
            .iter()
            .find(|a| a.attestation_type == archivista_metadata::parsers::git::ATTESTOR_TYPE)
            .unwrap();
        let git = store.git_attestation(&git_row.id).await.unwrap().unwrap();
        assert_eq!(git.commit_hash, "0f1e2d3c4b5a69788796a5b4c3d2e1f00f1e2d3c");
        assert_eq!(git.author_email, "bot@example.com");
        assert_eq!(git.tree_hash, "cc33");
        let parents: Vec<String> = serde_json::from_str(&git.parent_hashes).unwrap();
        assert_eq!(parents, vec!["aa11", "bb22"]);

        let sarif_row = attestations
            .iter()
            .find(|a| a.attestation_type == archivista_metadata::parsers::sarif::ATTESTOR_TYPE)
            .unwrap();
        let sarif = store.sarif_for_attestation(&sarif_row.id).await.unwrap().unwrap();
        assert_eq!(sarif.report_file_name, "scan.sarif");
        let sarif_statement = store.get_statement(&sarif.statement_id).await.unwrap().unwrap();
        assert_eq!(
            sarif_statement.predicate,
            archivista_metadata::parsers::sarif::ATTESTOR_TYPE
        );
        let rules = store.sarif_rules(&sarif.id).await.unwrap();
        let mut rule_ids: Vec<&str> = rules.iter().map(|r| r.rule_id.as_str()).collect();
        rule_ids.sort();
        assert_eq!(rule_ids, vec!["RS001", "RS002"]);
        let described = rules.iter().find(|r| r.rule_id == "RS001").unwrap();
        assert_eq!(described.rule_name, "unsafe-block");
        assert_eq!(described.short_description, "Avoid unsafe");

        let omnitrail_row = attestations
            .iter()
            .find(|a| a.attestation_type == archivista_metadata::parsers::omnitrail::ATTESTOR_TYPE)
            .unwrap();
        let omnitrail = store.omnitrail(&omnitrail_row.id).await.unwrap().unwrap();
        let mappings = store.mappings(&omnitrail.id).await.unwrap();
        assert_eq!(mappings.len(), 2);
        let file = mappings.iter().find(|m| m.path == "/src/main.rs").unwrap();
        assert_eq!(file.mapping_type, "file");
        let posix = store.posix(&file.id).await.unwrap().unwrap();
        assert_eq!(posix.size.as_deref(), Some("42"));
        assert_eq!(posix.permissions.as_deref(), Some("0644"));
        let dir = mappings.iter().find(|m| m.path == "/src").unwrap();
        assert!(store.posix(&dir.id).await.unwrap().is_none());

        assert!(store.delete_dsse(&gitoid).await.unwrap());
        assert_empty(&store).await;
    })
    .await;
}

#[tokio::test]
async fn test_vex_documents_are_parsed() {
    run_metadata_test_both(|store| async move {
        let gitoid = store_raw(&store, &vex_attestation("pkg:oci/app", &"77".repeat(32)))
            .await
            .unwrap();
        let dsse = store.get_dsse_by_gitoid(&gitoid).await.unwrap().unwrap();
        let statement_id = dsse.statement_id.clone().unwrap();

        let documents = store.vex_documents_for_statement(&statement_id).await.unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].vex_id, "https://openvex.dev/docs/example/vex-1");

        let statements = store
            .vex_statements_for_document(&documents[0].id)
            .await
            .unwrap();
        let mut vulns: Vec<&str> = statements.iter().map(|s| s.vuln_id.as_str()).collect();
        vulns.sort();
        assert_eq!(vulns, vec!["CVE-2024-0001", "CVE-2024-0002"]);

        store.delete_dsse(&gitoid).await.unwrap();
    })
    .await;
}

#[tokio::test]
async fn test_unknown_predicates_store_statement_only() {
    let metadata = TestMetadata::new().await.unwrap();
    let store = &metadata.store;
    let payload = statement(
        "https://slsa.dev/provenance/v1",
        &[("p", &"88".repeat(32))],
        json!({"buildDefinition": {}}),
    );
    store_raw(store, &envelope(&payload)).await.unwrap();

    assert_eq!(count_rows(store.pool(), "statements").await, 1);
    assert_eq!(count_rows(store.pool(), "attestation_collections").await, 0);
    assert_eq!(count_rows(store.pool(), "vex_documents").await, 0);
}

// =============================================================================
// Bundles
// =============================================================================

#[tokio::test]
async fn test_bundle_rows_and_envelope_reload() {
    run_metadata_test_both(|store| async move {
        let chain = cert_chain();
        let token = timestamp_token(datetime!(2024-01-01 00:00:00 UTC));
        let payload = statement("https://example.com/generic/v1", &[("b", &"99".repeat(32))], json!({}));
        let gitoid = store_raw(&store, &sigstore_bundle(&payload, &chain, &token))
            .await
            .unwrap();

        let dsse = store.get_dsse_by_gitoid(&gitoid).await.unwrap().unwrap();
        let bundle = store.bundle_for_dsse(&dsse.id).await.unwrap().unwrap();
        assert_eq!(bundle.media_type, BUNDLE_MEDIA_TYPE);
        assert_eq!(bundle.version.as_deref(), Some("0.3"));

        let loaded = store
            .load_envelope(&gitoid, payload.clone())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.envelope.payload, payload);
        assert_eq!(loaded.envelope.payload_type, INTOTO_PAYLOAD_TYPE);
        let signature = &loaded.envelope.signatures[0];
        assert_eq!(signature.key_id, "bundle-key");
        assert_eq!(signature.signature, b"bundle-signature");
        assert_eq!(signature.certificate, chain[0]);
        assert_eq!(signature.intermediates, chain[1..].to_vec());
        assert_eq!(signature.timestamps[0].data, token);
        assert!(loaded.bundle.is_some());

        store.delete_dsse(&gitoid).await.unwrap();
    })
    .await;
}

#[tokio::test]
async fn test_message_signature_bundles_have_no_rows() {
    let metadata = TestMetadata::new().await.unwrap();
    let store = &metadata.store;
    let raw = message_signature_bundle();
    let payload = FormatRouter::new(Default::default()).classify(&raw).unwrap();
    assert!(matches!(payload, Payload::MessageSignature(_)));

    store_raw(store, &raw).await.unwrap();
    assert_empty(store).await;
}

#[tokio::test]
async fn test_load_envelope_unknown_gitoid() {
    let metadata = TestMetadata::new().await.unwrap();
    let loaded = metadata
        .store
        .load_envelope(&"f".repeat(64), Vec::new())
        .await
        .unwrap();
    assert!(loaded.is_none());
}

// =============================================================================
// Queries and deletion
// =============================================================================

#[tokio::test]
async fn test_filters_follow_edges() {
    run_metadata_test_both(|store| async move {
        let wanted = "ab".repeat(32);
        let kept = store_raw(&store, &package_attestation("wanted.bin", &wanted))
            .await
            .unwrap();
        let other = store_raw(&store, &package_attestation("other.bin", &"ac".repeat(32)))
            .await
            .unwrap();

        let filter = DsseFilter {
            has_statement_with: Some(Box::new(StatementFilter {
                has_subjects_with: Some(Box::new(SubjectFilter {
                    has_subject_digests_with: Some(Box::new(DigestFilter {
                        algorithm: Some("sha256".to_string()),
                        value: Some(wanted.clone()),
                    })),
                    ..Default::default()
                })),
                ..Default::default()
            })),
            ..Default::default()
        };
        let found = store.list_dsses(&filter, &Page::default()).await.unwrap();
        assert_eq!(found.total_count, 1);
        assert_eq!(found.edges[0].node.gitoid_sha256, kept);

        let filter = SubjectFilter {
            name_contains: Some(".bin".to_string()),
            ..Default::default()
        };
        let subjects = store.list_subjects(&filter, &Page::default()).await.unwrap();
        assert_eq!(subjects.total_count, 2);

        store.delete_dsse(&kept).await.unwrap();
        store.delete_dsse(&other).await.unwrap();
    })
    .await;
}

#[tokio::test]
async fn test_name_contains_matches_wildcards_literally() {
    run_metadata_test_both(|store| async move {
        let mut gitoids = Vec::new();
        for (name, digest) in [("lib_a_b.so", "a1"), ("lib_axb.so", "a2"), ("100%.txt", "a3")] {
            let payload = statement(
                "https://example.com/generic/v1",
                &[(name, &digest.repeat(32))],
                json!({}),
            );
            gitoids.push(store_raw(&store, &envelope(&payload)).await.unwrap());
        }

        let names = |needle: &str| SubjectFilter {
            name_contains: Some(needle.to_string()),
            ..Default::default()
        };
        let found = store.list_subjects(&names("a_b"), &Page::default()).await.unwrap();
        assert_eq!(found.total_count, 1);
        assert_eq!(found.edges[0].node.name, "lib_a_b.so");

        let found = store.list_subjects(&names("0%."), &Page::default()).await.unwrap();
        assert_eq!(found.total_count, 1);
        assert_eq!(found.edges[0].node.name, "100%.txt");

        let found = store.list_subjects(&names("lib_"), &Page::default()).await.unwrap();
        assert_eq!(found.total_count, 2);

        for gitoid in gitoids {
            store.delete_dsse(&gitoid).await.unwrap();
        }
    })
    .await;
}

#[tokio::test]
async fn test_pages_walk_backwards() {
    let metadata = TestMetadata::new().await.unwrap();
    let store = &metadata.store;
    for i in 0..4 {
        let payload = statement(
            "https://example.com/generic/v1",
            &[(&format!("p{i}"), &format!("{i:064x}"))],
            json!({}),
        );
        store_raw(store, &envelope(&payload)).await.unwrap();
    }

    let all = store
        .list_dsses(&DsseFilter::default(), &Page::default())
        .await
        .unwrap();
    assert_eq!(all.edges.len(), 4);

    let page = Page {
        last: Some(2),
        before: Some(all.edges[3].cursor.clone()),
        ..Default::default()
    };
    let back = store.list_dsses(&DsseFilter::default(), &page).await.unwrap();
    let ids: Vec<&str> = back.edges.iter().map(|e| e.node.id.as_str()).collect();
    assert_eq!(ids, vec![all.edges[1].node.id.as_str(), all.edges[2].node.id.as_str()]);
    assert!(back.page_info.has_previous_page);
    assert_eq!(back.total_count, 4);
}

#[tokio::test]
async fn test_delete_missing_gitoid_is_false() {
    let metadata = TestMetadata::new().await.unwrap();
    assert!(!metadata.store.delete_dsse(&"0".repeat(64)).await.unwrap());
}

#[tokio::test]
async fn test_delete_keeps_shared_rows() {
    let metadata = TestMetadata::new().await.unwrap();
    let store = &metadata.store;
    let first = store_raw(store, &package_attestation("one.bin", &"cd".repeat(32)))
        .await
        .unwrap();
    let second = store_raw(store, &vex_attestation("two", &"ce".repeat(32)))
        .await
        .unwrap();

    assert!(store.delete_dsse(&first).await.unwrap());
    assert!(store.get_dsse_by_gitoid(&first).await.unwrap().is_none());
    assert!(store.get_dsse_by_gitoid(&second).await.unwrap().is_some());
    assert_eq!(count_rows(store.pool(), "statements").await, 1);
    assert_eq!(count_rows(store.pool(), "vex_statements").await, 2);
}

#[test]
fn test_envelope_fixture_parses() {
    let raw = package_attestation("x", &"00".repeat(32));
    let envelope = Envelope::from_json(&raw).unwrap();
    assert_eq!(envelope.signatures.len(), 1);
}
