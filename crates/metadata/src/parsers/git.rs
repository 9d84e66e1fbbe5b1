//! Git attestor: commit facts for the working tree an attestation ran in.

use super::{AttestorContext, AttestorParser};
use crate::error::MetadataResult;
use crate::models::{GitAttestationRow, new_id};
use crate::tx::IngestTx;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;

pub const ATTESTOR_TYPE: &str = "https://witness.dev/attestations/git/v0.1";

/// The Git attestor's JSON output. Field names follow the attestor.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GitAttestor {
    #[serde(rename = "commithash")]
    commit_hash: String,
    author: String,
    #[serde(rename = "authoremail")]
    author_email: String,
    #[serde(rename = "committername")]
    committer_name: String,
    #[serde(rename = "committeremail")]
    committer_email: String,
    #[serde(rename = "commitdate")]
    commit_date: String,
    #[serde(rename = "commitmessage")]
    commit_message: String,
    status: BTreeMap<String, FileStatus>,
    #[serde(rename = "committype")]
    commit_type: String,
    #[serde(rename = "commitdigest")]
    commit_digest: BTreeMap<String, String>,
    signature: String,
    #[serde(rename = "parenthashes")]
    parent_hashes: Vec<String>,
    #[serde(rename = "treehash")]
    tree_hash: String,
    refs: Vec<String>,
    remotes: Vec<String>,
}

#[derive(Debug, Default, serde::Serialize, Deserialize)]
#[serde(default)]
struct FileStatus {
    #[serde(skip_serializing_if = "String::is_empty")]
    staging: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    worktree: String,
}

pub struct GitParser;

#[async_trait]
impl AttestorParser for GitParser {
    async fn parse(
        &self,
        tx: &mut IngestTx,
        ctx: AttestorContext<'_>,
        attestation: &[u8],
    ) -> MetadataResult<()> {
        let git: GitAttestor =
            serde_json::from_slice::<Option<GitAttestor>>(attestation)?.unwrap_or_default();

        let row = GitAttestationRow {
            id: new_id(),
            attestation_id: ctx.attestation_id.to_string(),
            status: serde_json::to_string(&git.status)?,
            commit_digest: serde_json::to_string(&git.commit_digest)?,
            parent_hashes: serde_json::to_string(&git.parent_hashes)?,
            refs: serde_json::to_string(&git.refs)?,
            remotes: serde_json::to_string(&git.remotes)?,
            commit_hash: git.commit_hash,
            author: git.author,
            author_email: git.author_email,
            committer_name: git.committer_name,
            committer_email: git.committer_email,
            commit_date: git.commit_date,
            commit_message: git.commit_message,
            commit_type: git.commit_type,
            signature: git.signature,
            tree_hash: git.tree_hash,
        };
        tx.insert_git_attestation(&row).await
    }
}
