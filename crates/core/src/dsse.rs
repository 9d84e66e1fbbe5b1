//! DSSE envelopes in the go-witness shape.
//!
//! The canonical internal form carries verification material per signature:
//! a leaf certificate, ordered intermediates (leaf side first) and RFC3161
//! timestamp tokens.

use crate::encoding::{base64_bytes, base64_list};
use crate::error::{Error, Result};
use crate::gitoid::sha256_hex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Timestamp type for RFC3161 timestamp tokens.
pub const TIMESTAMP_RFC3161: &str = "tsp";

/// Payload type of in-toto statements.
pub const PAYLOAD_TYPE_INTOTO: &str = "application/vnd.in-toto+json";

/// A DSSE envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(with = "base64_bytes")]
    pub payload: Vec<u8>,
    #[serde(rename = "payloadType", default)]
    pub payload_type: String,
    #[serde(default)]
    pub signatures: Vec<Signature>,
}

/// One signature over the envelope's PAE.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    #[serde(rename = "keyid", default)]
    pub key_id: String,
    #[serde(rename = "sig", with = "base64_bytes", default)]
    pub signature: Vec<u8>,
    #[serde(
        default,
        with = "base64_bytes",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub certificate: Vec<u8>,
    #[serde(default, with = "base64_list", skip_serializing_if = "Vec::is_empty")]
    pub intermediates: Vec<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub timestamps: Vec<SignatureTimestamp>,
}

/// A timestamp token attached to a signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureTimestamp {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

impl SignatureTimestamp {
    /// An RFC3161 timestamp token.
    pub fn rfc3161(data: Vec<u8>) -> Self {
        Self {
            kind: TIMESTAMP_RFC3161.to_string(),
            data,
        }
    }
}

impl Envelope {
    /// Parse and validate an envelope from JSON bytes.
    pub fn from_json(data: &[u8]) -> Result<Self> {
        let envelope: Envelope = serde_json::from_slice(data)?;
        envelope.validate()?;
        Ok(envelope)
    }

    /// Serialize to JSON bytes.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Check the structural requirements every stored envelope must meet.
    pub fn validate(&self) -> Result<()> {
        if self.payload.is_empty() {
            return Err(Error::EmptyPayload("payload".to_string()));
        }
        if self.signatures.is_empty() {
            return Err(Error::MissingSignatures);
        }
        for (index, sig) in self.signatures.iter().enumerate() {
            if sig.signature.is_empty() {
                return Err(Error::EmptySignature { index });
            }
        }
        Ok(())
    }

    /// Digest set of the payload, keyed by algorithm name.
    pub fn payload_digests(&self) -> BTreeMap<String, String> {
        let mut digests = BTreeMap::new();
        digests.insert("sha256".to_string(), sha256_hex(&self.payload));
        digests
    }
}
