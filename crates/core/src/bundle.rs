//! Sigstore bundle types and the mapping to canonical DSSE.
//!
//! Only the parts of the bundle that are stored are modelled. Unknown fields
//! are ignored on input.

use crate::dsse::{Envelope, Signature, SignatureTimestamp};
use crate::encoding::{b64_decode, b64_encode};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Media type emitted by the exporter.
pub const MEDIA_TYPE_V0_3: &str = "application/vnd.dev.sigstore.bundle.v0.3+json";

/// Maximum decoded payload size: 100 MiB.
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 100 * 1024 * 1024;

/// Maximum number of signatures accepted per bundle.
pub const DEFAULT_MAX_SIGNATURES: usize = 100;

/// Resource limits applied while mapping a bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BundleLimits {
    pub max_payload_size: usize,
    pub max_signatures: usize,
}

impl Default for BundleLimits {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            max_signatures: DEFAULT_MAX_SIGNATURES,
        }
    }
}

/// A Sigstore bundle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    #[serde(default)]
    pub media_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_material: Option<VerificationMaterial>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_signature: Option<MessageSignature>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dsse_envelope: Option<BundleEnvelope>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationMaterial {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x509_certificate_chain: Option<X509CertificateChain>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<Certificate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_verification_data: Option<TimestampVerificationData>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct X509CertificateChain {
    #[serde(default)]
    pub certificates: Vec<Certificate>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Certificate {
    #[serde(default)]
    pub raw_bytes: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimestampVerificationData {
    #[serde(default)]
    pub rfc3161_timestamps: Vec<Rfc3161Timestamp>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rfc3161Timestamp {
    #[serde(default)]
    pub signed_timestamp: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSignature {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_digest: Option<MessageDigest>,
    #[serde(default)]
    pub signature: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDigest {
    #[serde(default)]
    pub algorithm: String,
    #[serde(default)]
    pub digest: String,
}

/// The DSSE envelope embedded in a bundle. Byte fields stay base64 strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleEnvelope {
    #[serde(default)]
    pub payload: String,
    #[serde(default)]
    pub payload_type: String,
    #[serde(default)]
    pub signatures: Vec<BundleSignature>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleSignature {
    #[serde(default)]
    pub keyid: String,
    #[serde(default)]
    pub sig: String,
}

impl Bundle {
    /// Parse a bundle without applying the detection rules.
    pub fn from_json(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }

    /// Serialize to JSON bytes.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse `data` and return the bundle only if it satisfies the detection
    /// rules.
    pub fn detect(data: &[u8]) -> Option<Self> {
        let bundle = Self::from_json(data).ok()?;
        if !is_bundle_media_type(&bundle.media_type) {
            return None;
        }
        bundle.verification_material.as_ref()?;
        if bundle.dsse_envelope.is_none() && bundle.message_signature.is_none() {
            return None;
        }
        Some(bundle)
    }

    /// Version component of the media type, e.g. `0.3`.
    pub fn version(&self) -> Option<String> {
        bundle_version(&self.media_type)
    }

    /// Normalize to a canonical DSSE envelope, attaching the verification
    /// material to every signature.
    pub fn to_envelope(&self, limits: &BundleLimits) -> Result<Envelope> {
        let dsse = self.dsse_envelope.as_ref().ok_or_else(|| {
            Error::UnrecognizedPayload("bundle missing required field: dsseEnvelope".to_string())
        })?;

        if dsse.payload.is_empty() {
            return Err(Error::EmptyPayload("dsseEnvelope.payload".to_string()));
        }
        let estimated = decoded_len_estimate(&dsse.payload);
        if estimated > limits.max_payload_size {
            return Err(Error::PayloadTooLarge {
                size: estimated,
                max: limits.max_payload_size,
            });
        }
        let payload = b64_decode(&dsse.payload).map_err(|e| Error::InvalidBase64 {
            field: "dsseEnvelope.payload".to_string(),
            reason: e.to_string(),
        })?;
        if payload.is_empty() {
            return Err(Error::EmptyPayload("decoded dsseEnvelope.payload".to_string()));
        }
        if payload.len() > limits.max_payload_size {
            return Err(Error::PayloadTooLarge {
                size: payload.len(),
                max: limits.max_payload_size,
            });
        }

        if dsse.signatures.is_empty() {
            return Err(Error::MissingSignatures);
        }
        if dsse.signatures.len() > limits.max_signatures {
            return Err(Error::TooManySignatures {
                count: dsse.signatures.len(),
                max: limits.max_signatures,
            });
        }

        let material = self
            .verification_material
            .as_ref()
            .map(DecodedMaterial::from_bundle)
            .unwrap_or_default();

        let mut signatures = Vec::with_capacity(dsse.signatures.len());
        for (index, bundle_sig) in dsse.signatures.iter().enumerate() {
            if bundle_sig.sig.is_empty() {
                return Err(Error::EmptySignature { index });
            }
            let sig = b64_decode(&bundle_sig.sig).map_err(|e| Error::InvalidBase64 {
                field: format!("dsseEnvelope.signatures[{index}].sig"),
                reason: e.to_string(),
            })?;
            if sig.is_empty() {
                return Err(Error::EmptySignature { index });
            }
            signatures.push(Signature {
                key_id: bundle_sig.keyid.clone(),
                signature: sig,
                certificate: material.certificate.clone(),
                intermediates: material.intermediates.clone(),
                timestamps: material.timestamps.clone(),
            });
        }

        Ok(Envelope {
            payload,
            payload_type: dsse.payload_type.clone(),
            signatures,
        })
    }
}

/// Verification material decoded once and shared by every signature.
#[derive(Debug, Default)]
struct DecodedMaterial {
    certificate: Vec<u8>,
    intermediates: Vec<Vec<u8>>,
    timestamps: Vec<SignatureTimestamp>,
}

impl DecodedMaterial {
    fn from_bundle(vm: &VerificationMaterial) -> Self {
        let mut out = Self::default();

        match (&vm.x509_certificate_chain, &vm.certificate) {
            (Some(chain), _) if !chain.certificates.is_empty() => {
                if let Some(leaf) = decode_advisory(&chain.certificates[0].raw_bytes, "leaf") {
                    out.certificate = leaf;
                }
                out.intermediates = chain.certificates[1..]
                    .iter()
                    .filter_map(|c| decode_advisory(&c.raw_bytes, "intermediate"))
                    .collect();
            }
            (_, Some(cert)) => {
                if let Some(leaf) = decode_advisory(&cert.raw_bytes, "certificate") {
                    out.certificate = leaf;
                }
            }
            _ => {}
        }

        if let Some(tvd) = &vm.timestamp_verification_data {
            out.timestamps = tvd
                .rfc3161_timestamps
                .iter()
                .filter_map(|ts| decode_advisory(&ts.signed_timestamp, "rfc3161 timestamp"))
                .map(SignatureTimestamp::rfc3161)
                .collect();
        }

        out
    }
}

/// Decode a verification material entry, dropping it when empty or invalid.
fn decode_advisory(value: &str, what: &str) -> Option<Vec<u8>> {
    if value.is_empty() {
        return None;
    }
    match b64_decode(value) {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            tracing::warn!(field = what, error = %e, "dropping undecodable verification material");
            None
        }
    }
}

/// Decoded length of a padded base64 string, computed before decoding.
fn decoded_len_estimate(encoded: &str) -> usize {
    let padding = encoded.bytes().rev().take_while(|b| *b == b'=').count();
    (encoded.len() / 4 * 3).saturating_sub(padding)
}

/// Whether a media type names a Sigstore bundle.
pub fn is_bundle_media_type(media_type: &str) -> bool {
    media_type.starts_with("application/")
        && media_type.ends_with("+json")
        && media_type.contains("bundle")
        && media_type.contains("sigstore")
}

/// Extract the version from `application/vnd.dev.sigstore.bundle.v0.3+json`
/// or `application/vnd.dev.sigstore.bundle+json;version=0.2`.
pub fn bundle_version(media_type: &str) -> Option<String> {
    if let Some((_, v)) = media_type.split_once(";version=") {
        return Some(v.to_string());
    }
    let rest = media_type.split_once("bundle.v")?.1;
    let version = rest.strip_suffix("+json")?;
    (!version.is_empty()).then(|| version.to_string())
}

/// Build a bundle DSSE signature entry.
pub(crate) fn bundle_signature(sig: &Signature) -> BundleSignature {
    BundleSignature {
        keyid: sig.key_id.clone(),
        sig: b64_encode(&sig.signature),
    }
}
