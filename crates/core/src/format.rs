//! Payload format routing.
//!
//! Handlers are tried in order and the first one that recognizes the bytes
//! wins. The result is always a canonical DSSE envelope, plus the bundle it
//! came from when the upload was a Sigstore bundle.

use crate::bundle::{Bundle, BundleLimits};
use crate::dsse::Envelope;
use crate::error::{Error, Result};
use std::borrow::Cow;

/// A classified upload.
#[derive(Debug, Clone)]
pub enum Payload {
    /// A bare DSSE envelope.
    Envelope(Envelope),
    /// A Sigstore bundle wrapping a DSSE envelope.
    Bundle { bundle: Bundle, envelope: Envelope },
    /// A Sigstore bundle carrying only a message signature.
    MessageSignature(Bundle),
}

impl Payload {
    /// The canonical envelope, when there is one.
    pub fn envelope(&self) -> Option<&Envelope> {
        match self {
            Self::Envelope(envelope) | Self::Bundle { envelope, .. } => Some(envelope),
            Self::MessageSignature(_) => None,
        }
    }

    /// The bundle the payload arrived in, if any.
    pub fn bundle(&self) -> Option<&Bundle> {
        match self {
            Self::Bundle { bundle, .. } | Self::MessageSignature(bundle) => Some(bundle),
            Self::Envelope(_) => None,
        }
    }

    /// Bytes to persist in the blob store. Bare envelopes are kept verbatim;
    /// DSSE bundles are stored as the canonical envelope.
    pub fn canonical_bytes<'a>(&self, raw: &'a [u8]) -> Result<Cow<'a, [u8]>> {
        match self {
            Self::Bundle { envelope, .. } => Ok(Cow::Owned(envelope.to_json()?)),
            Self::Envelope(_) | Self::MessageSignature(_) => Ok(Cow::Borrowed(raw)),
        }
    }
}

/// A recognizer for one upload format.
pub trait FormatHandler: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// `None` when the bytes are not in this format; otherwise the normalized
    /// payload or the reason it was rejected.
    fn try_normalize(&self, data: &[u8], limits: &BundleLimits) -> Option<Result<Payload>>;
}

/// Sigstore bundles, detected by media type and required fields.
pub struct SigstoreBundleHandler;

impl FormatHandler for SigstoreBundleHandler {
    fn name(&self) -> &'static str {
        "sigstore-bundle"
    }

    fn try_normalize(&self, data: &[u8], limits: &BundleLimits) -> Option<Result<Payload>> {
        let bundle = Bundle::detect(data)?;
        if bundle.dsse_envelope.is_none() {
            return Some(Ok(Payload::MessageSignature(bundle)));
        }
        Some(
            bundle
                .to_envelope(limits)
                .map(|envelope| Payload::Bundle { bundle, envelope }),
        )
    }
}

/// Bare DSSE envelopes.
pub struct DsseHandler;

impl FormatHandler for DsseHandler {
    fn name(&self) -> &'static str {
        "dsse"
    }

    fn try_normalize(&self, data: &[u8], _limits: &BundleLimits) -> Option<Result<Payload>> {
        let envelope: Envelope = serde_json::from_slice(data).ok()?;
        Some(envelope.validate().map(|_| Payload::Envelope(envelope)))
    }
}

/// Ordered set of format handlers.
pub struct FormatRouter {
    handlers: Vec<Box<dyn FormatHandler>>,
    limits: BundleLimits,
}

impl Default for FormatRouter {
    fn default() -> Self {
        Self::new(BundleLimits::default())
    }
}

impl FormatRouter {
    /// Router with the built-in handlers: bundles first, then bare DSSE.
    pub fn new(limits: BundleLimits) -> Self {
        Self {
            handlers: vec![Box::new(SigstoreBundleHandler), Box::new(DsseHandler)],
            limits,
        }
    }

    /// Append a handler after the built-in ones.
    pub fn with_handler(mut self, handler: Box<dyn FormatHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Limits applied to bundles.
    pub fn limits(&self) -> &BundleLimits {
        &self.limits
    }

    /// Classify and normalize an upload.
    pub fn classify(&self, data: &[u8]) -> Result<Payload> {
        for handler in &self.handlers {
            if let Some(result) = handler.try_normalize(data, &self.limits) {
                tracing::debug!(format = handler.name(), "payload format detected");
                return result;
            }
        }
        Err(Error::UnrecognizedPayload(
            "expected a DSSE envelope or a Sigstore bundle".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::MEDIA_TYPE_V0_3;
    use crate::encoding::b64_encode;
    use serde_json::json;

    fn dsse_bytes() -> Vec<u8> {
        serde_json::to_vec(&json!({
            "payload": b64_encode(b"{}"),
            "payloadType": "application/vnd.in-toto+json",
            "signatures": [{"keyid": "k", "sig": b64_encode(b"s")}]
        }))
        .unwrap()
    }

    #[test]
    fn bare_dsse_is_stored_verbatim() {
        let raw = dsse_bytes();
        let payload = FormatRouter::default().classify(&raw).unwrap();
        assert!(matches!(payload, Payload::Envelope(_)));
        assert!(matches!(payload.canonical_bytes(&raw).unwrap(), Cow::Borrowed(_)));
    }

    #[test]
    fn bundle_is_normalized() {
        let raw = serde_json::to_vec(&json!({
            "mediaType": MEDIA_TYPE_V0_3,
            "verificationMaterial": {"certificate": {"rawBytes": b64_encode(b"leaf")}},
            "dsseEnvelope": {
                "payload": b64_encode(b"{}"),
                "payloadType": "application/vnd.in-toto+json",
                "signatures": [{"keyid": "k", "sig": b64_encode(b"s")}]
            }
        }))
        .unwrap();
        let payload = FormatRouter::default().classify(&raw).unwrap();
        let envelope = payload.envelope().unwrap().clone();
        assert_eq!(envelope.signatures[0].certificate, b"leaf");
        let stored = payload.canonical_bytes(&raw).unwrap();
        assert_eq!(Envelope::from_json(&stored).unwrap(), envelope);
    }

    #[test]
    fn message_signature_bundle_has_no_envelope() {
        let raw = serde_json::to_vec(&json!({
            "mediaType": MEDIA_TYPE_V0_3,
            "verificationMaterial": {},
            "messageSignature": {
                "messageDigest": {"algorithm": "SHA2_256", "digest": "abcd"},
                "signature": "c2ln"
            }
        }))
        .unwrap();
        let payload = FormatRouter::default().classify(&raw).unwrap();
        assert!(payload.envelope().is_none());
        assert!(payload.bundle().is_some());
    }

    #[test]
    fn garbage_is_unrecognized() {
        let err = FormatRouter::default().classify(b"hello").unwrap_err();
        assert!(matches!(err, Error::UnrecognizedPayload(_)));
        let err = FormatRouter::default().classify(br#"{"foo": 1}"#).unwrap_err();
        assert!(matches!(err, Error::UnrecognizedPayload(_)));
    }

    #[test]
    fn invalid_dsse_reports_validation_error() {
        let raw = serde_json::to_vec(&json!({
            "payload": "",
            "payloadType": "application/vnd.in-toto+json",
            "signatures": [{"keyid": "k", "sig": b64_encode(b"s")}]
        }))
        .unwrap();
        let err = FormatRouter::default().classify(&raw).unwrap_err();
        assert!(err.to_string().contains("value is less than the required length"));
    }
}
