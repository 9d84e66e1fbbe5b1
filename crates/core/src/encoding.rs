//! Base64 helpers and serde adapters for byte fields.
//!
//! Byte fields in DSSE envelopes are standard base64 with padding. A JSON
//! `null` decodes to an empty buffer.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Encode bytes as standard base64.
pub fn b64_encode(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Decode standard base64, ignoring embedded line breaks.
pub fn b64_decode(s: &str) -> Result<Vec<u8>, base64::DecodeError> {
    if s.contains(['\n', '\r']) {
        let cleaned: String = s.chars().filter(|c| *c != '\n' && *c != '\r').collect();
        STANDARD.decode(cleaned)
    } else {
        STANDARD.decode(s)
    }
}

/// Serde adapter for a single base64 byte field.
pub mod base64_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::b64_encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let value: Option<String> = Option::deserialize(deserializer)?;
        match value {
            Some(s) => super::b64_decode(&s).map_err(serde::de::Error::custom),
            None => Ok(Vec::new()),
        }
    }
}

/// Serde adapter for a list of base64 byte fields.
pub mod base64_list {
    use serde::ser::SerializeSeq;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(data.len()))?;
        for item in data {
            seq.serialize_element(&super::b64_encode(item))?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<Vec<u8>>, D::Error> {
        let value: Option<Vec<String>> = Option::deserialize(deserializer)?;
        value
            .unwrap_or_default()
            .iter()
            .map(|s| super::b64_decode(s).map_err(serde::de::Error::custom))
            .collect()
    }
}
