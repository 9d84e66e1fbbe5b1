//! Minimal RFC3161 decoder.
//!
//! Only `TSTInfo.genTime` is extracted. Signatures and certificate chains in
//! the token are not validated here.
//!
//! ```asn1
//! TimeStampResp ::= SEQUENCE { status PKIStatusInfo, timeStampToken ContentInfo OPTIONAL }
//! ContentInfo   ::= SEQUENCE { contentType OID, content [0] EXPLICIT SignedData }
//! SignedData    ::= SEQUENCE { version, digestAlgorithms SET, encapContentInfo, ... }
//! EncapsulatedContentInfo ::= SEQUENCE { eContentType OID, eContent [0] EXPLICIT OCTET STRING }
//! TSTInfo       ::= SEQUENCE { version, policy, messageImprint, serialNumber, genTime, ... }
//! ```

use crate::error::{Error, Result};
use bcder::decode::{Constructed, DecodeError, Source};
use bcder::{Mode, Oid, Tag};
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

/// id-signedData (1.2.840.113549.1.7.2)
const OID_ID_SIGNED_DATA: Oid<&[u8]> = Oid(&[42, 134, 72, 134, 247, 13, 1, 7, 2]);

/// id-ct-TSTInfo (1.2.840.113549.1.9.16.1.4)
const OID_CONTENT_TYPE_TST_INFO: Oid<&[u8]> = Oid(&[42, 134, 72, 134, 247, 13, 1, 9, 16, 1, 4]);

/// PKIStatus values above this are rejections.
const PKI_STATUS_GRANTED_WITH_MODS: u64 = 1;

/// What the outer structure yielded.
enum Outer {
    /// DER of a `TSTInfo` still wrapped in the token's eContent.
    EncodedTstInfo(Vec<u8>),
    /// The raw `genTime` of a bare `TSTInfo`.
    GenTime(Vec<u8>),
}

fn malformed(reason: &str) -> Error {
    Error::MalformedTimestamp(reason.to_string())
}

/// Extract `genTime` from a DER timestamp token.
///
/// Accepts a `TimeStampResp`, a bare `ContentInfo` timestamp token, or a
/// `TSTInfo` structure.
pub fn gen_time(der: &[u8]) -> Result<OffsetDateTime> {
    let raw = match Constructed::decode(der, Mode::Der, take_outer)
        .map_err(|e| malformed(&e.to_string()))?
    {
        Outer::GenTime(raw) => raw,
        Outer::EncodedTstInfo(tst_info) => {
            Constructed::decode(tst_info.as_slice(), Mode::Der, |cons| {
                cons.take_sequence(take_tst_info_fields)
            })
            .map_err(|e| malformed(&format!("TSTInfo: {e}")))?
        }
    };
    let text = std::str::from_utf8(&raw).map_err(|_| malformed("genTime is not ASCII"))?;
    parse_generalized_time(text)
}

fn take_outer<S: Source>(
    cons: &mut Constructed<S>,
) -> std::result::Result<Outer, DecodeError<S::Error>> {
    cons.take_sequence(|cons| {
        // TimeStampResp: PKIStatusInfo, then the token
        let status = cons.take_opt_sequence(|cons| {
            let status = cons.take_u64()?;
            cons.skip_all()?;
            Ok(status)
        })?;
        if let Some(status) = status {
            if status > PKI_STATUS_GRANTED_WITH_MODS {
                return Err(cons.content_err("timestamp request was not granted"));
            }
            let tst_info = cons.take_sequence(|cons| {
                let content_type = Oid::take_from(cons)?;
                take_signed_data(cons, content_type.as_ref())
            })?;
            return Ok(Outer::EncodedTstInfo(tst_info));
        }

        // ContentInfo starts with its content type
        if let Some(content_type) = cons.take_opt_primitive_if(Tag::OID, |prim| prim.take_all())? {
            let tst_info = take_signed_data(cons, content_type.as_ref())?;
            return Ok(Outer::EncodedTstInfo(tst_info));
        }

        take_tst_info_fields(cons).map(Outer::GenTime)
    })
}

/// `content [0] EXPLICIT SignedData`, returning the encapsulated TSTInfo DER.
fn take_signed_data<S: Source>(
    cons: &mut Constructed<S>,
    content_type: &[u8],
) -> std::result::Result<Vec<u8>, DecodeError<S::Error>> {
    if content_type != OID_ID_SIGNED_DATA.as_ref() {
        return Err(cons.content_err("content type is not signedData"));
    }
    cons.take_constructed_if(Tag::CTX_0, |cons| {
        cons.take_sequence(|cons| {
            cons.take_u64()?;
            // digestAlgorithms
            cons.skip_one()?;
            let e_content = cons.take_sequence(|cons| {
                let e_content_type = Oid::take_from(cons)?;
                if e_content_type.as_ref() != OID_CONTENT_TYPE_TST_INFO.as_ref() {
                    return Err(cons.content_err("eContentType is not TSTInfo"));
                }
                cons.take_constructed_if(Tag::CTX_0, |cons| bcder::OctetString::take_from(cons))
            })?;
            // certificates, crls and signerInfos are not needed
            cons.skip_all()?;
            Ok(e_content.to_bytes().to_vec())
        })
    })
}

/// The fields of a `TSTInfo` sequence up to and including `genTime`.
fn take_tst_info_fields<S: Source>(
    cons: &mut Constructed<S>,
) -> std::result::Result<Vec<u8>, DecodeError<S::Error>> {
    cons.take_u64()?;
    // policy, messageImprint, serialNumber
    cons.skip_one()?;
    cons.skip_one()?;
    cons.skip_one()?;
    let gen_time = cons.take_primitive_if(Tag::GENERALIZED_TIME, |prim| prim.take_all())?;
    cons.skip_all()?;
    Ok(gen_time.to_vec())
}

/// `YYYYMMDDHHMMSS[.fff]Z`. DER forbids local time and offsets.
fn parse_generalized_time(text: &str) -> Result<OffsetDateTime> {
    let format =
        format_description!("[year][month][day][hour][minute][second][optional [.[subsecond]]]Z");
    PrimitiveDateTime::parse(text, format)
        .map(PrimitiveDateTime::assume_utc)
        .map_err(|e| malformed(&format!("invalid genTime {text:?}: {e}")))
}

// Tag octets for the fixture encoder below.
const TAG_INTEGER: u8 = 0x02;
const TAG_OCTET_STRING: u8 = 0x04;
const TAG_OID: u8 = 0x06;
const TAG_GENERALIZED_TIME: u8 = 0x18;
const TAG_SEQUENCE: u8 = 0x30;
const TAG_SET: u8 = 0x31;
const TAG_CONTEXT_0: u8 = 0xa0;

/// Build a structurally valid, unsigned timestamp token for `gen_time`.
///
/// Intended for fixtures: the token carries no signer info or certificates.
pub fn token_for_testing(gen_time: OffsetDateTime) -> Vec<u8> {
    let gen_time = gen_time.to_offset(time::UtcOffset::UTC);
    let stamp = format!(
        "{:04}{:02}{:02}{:02}{:02}{:02}Z",
        gen_time.year(),
        u8::from(gen_time.month()),
        gen_time.day(),
        gen_time.hour(),
        gen_time.minute(),
        gen_time.second()
    );
    // sha256 OID with NULL params, digest of 32 zero bytes
    let algorithm = der(
        TAG_SEQUENCE,
        &[
            der(
                TAG_OID,
                &[0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x01],
            ),
            vec![0x05, 0x00],
        ]
        .concat(),
    );
    let imprint = der(
        TAG_SEQUENCE,
        &[algorithm.clone(), der(TAG_OCTET_STRING, &[0u8; 32])].concat(),
    );
    let tst_info = der(
        TAG_SEQUENCE,
        &[
            der(TAG_INTEGER, &[1]),
            der(TAG_OID, &[0x2a, 0x03, 0x04]),
            imprint,
            der(TAG_INTEGER, &[0x01, 0x02, 0x03]),
            der(TAG_GENERALIZED_TIME, stamp.as_bytes()),
        ]
        .concat(),
    );
    let encap = der(
        TAG_SEQUENCE,
        &[
            der(TAG_OID, OID_CONTENT_TYPE_TST_INFO.0),
            der(TAG_CONTEXT_0, &der(TAG_OCTET_STRING, &tst_info)),
        ]
        .concat(),
    );
    let signed_data = der(
        TAG_SEQUENCE,
        &[
            der(TAG_INTEGER, &[3]),
            der(TAG_SET, &algorithm),
            encap,
            der(TAG_SET, &[]),
        ]
        .concat(),
    );
    der(
        TAG_SEQUENCE,
        &[
            der(TAG_OID, OID_ID_SIGNED_DATA.0),
            der(TAG_CONTEXT_0, &signed_data),
        ]
        .concat(),
    )
}

fn der(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    let len = content.len();
    if len < 0x80 {
        out.push(len as u8);
    } else {
        let bytes: Vec<u8> = len
            .to_be_bytes()
            .into_iter()
            .skip_while(|b| *b == 0)
            .collect();
        out.push(0x80 | bytes.len() as u8);
        out.extend(bytes);
    }
    out.extend_from_slice(content);
    out
}
