//! Rebuilding Sigstore bundles from canonical envelopes.

use crate::bundle::{
    Bundle, BundleEnvelope, Certificate, MEDIA_TYPE_V0_3, Rfc3161Timestamp,
    TimestampVerificationData, VerificationMaterial, X509CertificateChain, bundle_signature,
};
use crate::dsse::{Envelope, TIMESTAMP_RFC3161};
use crate::encoding::b64_encode;

/// Reconstruct a v0.3 bundle.
///
/// A bundle carries a single signature, so only the first signature and its
/// verification material are emitted. Use [`full_envelope`] when every
/// signature is needed.
pub fn reconstruct_bundle(envelope: &Envelope) -> Bundle {
    reconstruct_bundle_with_media_type(envelope, MEDIA_TYPE_V0_3)
}

/// Reconstruct a bundle, keeping a media type recorded at ingest.
pub fn reconstruct_bundle_with_media_type(envelope: &Envelope, media_type: &str) -> Bundle {
    let first = envelope.signatures.first();

    let verification_material = first.map(|sig| {
        let mut vm = VerificationMaterial::default();
        if !sig.certificate.is_empty() {
            if sig.intermediates.is_empty() {
                vm.certificate = Some(Certificate {
                    raw_bytes: b64_encode(&sig.certificate),
                });
            } else {
                let certificates = std::iter::once(&sig.certificate)
                    .chain(sig.intermediates.iter())
                    .map(|der| Certificate {
                        raw_bytes: b64_encode(der),
                    })
                    .collect();
                vm.x509_certificate_chain = Some(X509CertificateChain { certificates });
            }
        }
        let rfc3161_timestamps: Vec<_> = sig
            .timestamps
            .iter()
            .filter(|ts| ts.kind == TIMESTAMP_RFC3161)
            .map(|ts| Rfc3161Timestamp {
                signed_timestamp: b64_encode(&ts.data),
            })
            .collect();
        if !rfc3161_timestamps.is_empty() {
            vm.timestamp_verification_data = Some(TimestampVerificationData { rfc3161_timestamps });
        }
        vm
    });

    Bundle {
        media_type: media_type.to_string(),
        verification_material,
        message_signature: None,
        dsse_envelope: Some(BundleEnvelope {
            payload: b64_encode(&envelope.payload),
            payload_type: envelope.payload_type.clone(),
            signatures: first.map(bundle_signature).into_iter().collect(),
        }),
    }
}

/// Full-fidelity export: the canonical envelope with every signature.
pub fn full_envelope(envelope: &Envelope) -> crate::Result<Vec<u8>> {
    envelope.to_json()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::BundleLimits;
    use crate::dsse::{Signature, SignatureTimestamp};

    fn envelope(signatures: Vec<Signature>) -> Envelope {
        Envelope {
            payload: br#"{"_type":"https://in-toto.io/Statement/v0.1"}"#.to_vec(),
            payload_type: "application/vnd.in-toto+json".to_string(),
            signatures,
        }
    }

    fn signature(key: &str, chain_depth: usize) -> Signature {
        Signature {
            key_id: key.to_string(),
            signature: format!("sig-{key}").into_bytes(),
            certificate: if chain_depth > 0 { b"leaf".to_vec() } else { Vec::new() },
            intermediates: (1..chain_depth)
                .map(|i| format!("ca-{i}").into_bytes())
                .collect(),
            timestamps: vec![
                SignatureTimestamp::rfc3161(b"tst".to_vec()),
                SignatureTimestamp {
                    kind: "other".to_string(),
                    data: b"ignored".to_vec(),
                },
            ],
        }
    }

    #[test]
    fn chain_round_trips_through_bundle() {
        let original = envelope(vec![signature("a", 3)]);
        let bundle = reconstruct_bundle(&original);
        assert_eq!(bundle.media_type, MEDIA_TYPE_V0_3);

        let vm = bundle.verification_material.as_ref().unwrap();
        let chain = vm.x509_certificate_chain.as_ref().unwrap();
        assert_eq!(chain.certificates.len(), 3);
        assert!(vm.certificate.is_none());
        assert_eq!(
            vm.timestamp_verification_data
                .as_ref()
                .unwrap()
                .rfc3161_timestamps
                .len(),
            1
        );

        let json = bundle.to_json().unwrap();
        let reparsed = Bundle::detect(&json)
            .unwrap()
            .to_envelope(&BundleLimits::default())
            .unwrap();
        assert_eq!(reparsed.payload, original.payload);
        assert_eq!(reparsed.payload_type, original.payload_type);
        let sig = &reparsed.signatures[0];
        assert_eq!(sig.signature, original.signatures[0].signature);
        assert_eq!(sig.certificate, original.signatures[0].certificate);
        assert_eq!(sig.intermediates, original.signatures[0].intermediates);
        assert_eq!(sig.timestamps, vec![SignatureTimestamp::rfc3161(b"tst".to_vec())]);
    }

    #[test]
    fn leaf_only_uses_standalone_certificate() {
        let bundle = reconstruct_bundle(&envelope(vec![signature("a", 1)]));
        let vm = bundle.verification_material.unwrap();
        assert!(vm.x509_certificate_chain.is_none());
        assert!(vm.certificate.is_some());
    }

    #[test]
    fn bundle_keeps_only_first_signature() {
        let env = envelope(vec![signature("a", 1), signature("b", 0)]);
        let bundle = reconstruct_bundle(&env);
        let dsse = bundle.dsse_envelope.unwrap();
        assert_eq!(dsse.signatures.len(), 1);
        assert_eq!(dsse.signatures[0].keyid, "a");

        let full = Envelope::from_json(&full_envelope(&env).unwrap()).unwrap();
        assert_eq!(full, env);
    }

    #[test]
    fn recorded_media_type_is_kept() {
        let media_type = "application/vnd.dev.sigstore.bundle+json;version=0.2";
        let bundle =
            reconstruct_bundle_with_media_type(&envelope(vec![signature("a", 0)]), media_type);
        assert_eq!(bundle.media_type, media_type);
    }
}
