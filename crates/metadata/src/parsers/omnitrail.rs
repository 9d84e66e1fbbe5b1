//! OmniTrail attestor: a file tree with hashes and POSIX attributes.

use super::{AttestorContext, AttestorParser};
use crate::error::MetadataResult;
use crate::models::{MappingRow, PosixRow, new_id};
use crate::tx::IngestTx;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;

pub const ATTESTOR_TYPE: &str = "https://witness.dev/attestations/omnitrail/v0.1";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OmnitrailAttestor {
    #[serde(alias = "Envelope")]
    envelope: Envelope,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Envelope {
    #[serde(alias = "Mapping")]
    mapping: BTreeMap<String, Element>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Element {
    #[serde(rename = "type", alias = "Type")]
    element_type: String,
    #[serde(alias = "Sha1")]
    sha1: Option<String>,
    #[serde(alias = "Sha256")]
    sha256: Option<String>,
    #[serde(alias = "Sha1Gitoid")]
    sha1_gitoid: Option<String>,
    #[serde(alias = "Sha256Gitoid")]
    sha256_gitoid: Option<String>,
    #[serde(alias = "Posix")]
    posix: Option<Posix>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Posix {
    #[serde(alias = "ATime")]
    atime: Option<String>,
    #[serde(alias = "CTime")]
    ctime: Option<String>,
    #[serde(alias = "CreationTime")]
    creation_time: Option<String>,
    #[serde(alias = "ExtendedAttributes")]
    extended_attributes: Option<String>,
    #[serde(alias = "FileDeviceID")]
    file_device_id: Option<String>,
    #[serde(alias = "FileFlags")]
    file_flags: Option<String>,
    #[serde(alias = "FileInode")]
    file_inode: Option<String>,
    #[serde(alias = "FileSystemID")]
    file_system_id: Option<String>,
    #[serde(alias = "FileType")]
    file_type: Option<String>,
    #[serde(alias = "HardLinkCount")]
    hard_link_count: Option<String>,
    #[serde(alias = "MTime")]
    mtime: Option<String>,
    #[serde(alias = "MetadataCTime")]
    metadata_ctime: Option<String>,
    #[serde(alias = "OwnerGID")]
    owner_gid: Option<String>,
    #[serde(alias = "OwnerUID")]
    owner_uid: Option<String>,
    #[serde(alias = "Permissions")]
    permissions: Option<String>,
    #[serde(alias = "Size")]
    size: Option<String>,
}

pub struct OmnitrailParser;

#[async_trait]
impl AttestorParser for OmnitrailParser {
    async fn parse(
        &self,
        tx: &mut IngestTx,
        ctx: AttestorContext<'_>,
        attestation: &[u8],
    ) -> MetadataResult<()> {
        let omnitrail: OmnitrailAttestor =
            serde_json::from_slice::<Option<OmnitrailAttestor>>(attestation)?.unwrap_or_default();

        let omnitrail_id = tx.insert_omnitrail(ctx.attestation_id).await?;
        for (path, element) in omnitrail.envelope.mapping {
            let mapping = MappingRow {
                id: new_id(),
                omnitrail_id: omnitrail_id.clone(),
                path,
                mapping_type: element.element_type,
                sha1: element.sha1,
                sha256: element.sha256,
                gitoid_sha1: element.sha1_gitoid,
                gitoid_sha256: element.sha256_gitoid,
            };
            tx.insert_mapping(&mapping).await?;

            let posix = element.posix.unwrap_or_default();
            let row = PosixRow {
                id: new_id(),
                mapping_id: mapping.id,
                atime: posix.atime,
                ctime: posix.ctime,
                creation_time: posix.creation_time,
                extended_attributes: posix.extended_attributes,
                file_device_id: posix.file_device_id,
                file_flags: posix.file_flags,
                file_inode: posix.file_inode,
                file_system_id: posix.file_system_id,
                file_type: posix.file_type,
                hard_link_count: posix.hard_link_count,
                mtime: posix.mtime,
                metadata_ctime: posix.metadata_ctime,
                owner_gid: posix.owner_gid,
                owner_uid: posix.owner_uid,
                permissions: posix.permissions,
                size: posix.size,
            };
            tx.insert_posix(&row).await?;
        }
        Ok(())
    }
}
