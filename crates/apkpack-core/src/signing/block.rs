//! APK signing block encoding for schemes v2 and v3.
//!
//! Block layout:
//!
//! ```text
//! u64 size (excluding this field)
//! repeated: u64 pair_len, u32 id, value
//! u64 size (same value)
//! "APK Sig Block 42"
//! ```
//!
//! Every sequence inside a value is length-prefixed with a u32.

use crate::PackError;
use crate::Result;
use crate::signing::SignatureScheme;
use crate::signing::config::SigningConfig;
use byteorder::LittleEndian;
use byteorder::ReadBytesExt;
use byteorder::WriteBytesExt;
use rsa::Pkcs1v15Sign;
use rsa::RsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use sha2::Digest;
use sha2::Sha256;
use std::io::Read;
use std::io::Write;

pub(crate) const APK_SIGNING_BLOCK_MAGIC: &[u8; 16] = b"APK Sig Block 42";
pub(crate) const V2_BLOCK_ID: u32 = 0x7109_871a;
pub(crate) const V3_BLOCK_ID: u32 = 0xf053_68c0;

/// RSASSA-PKCS1-v1_5 with SHA2-256, chunked SHA2-256 content digest.
pub(crate) const RSA_PKCS1V15_SHA2_256: u32 = 0x0103;

/// v2 signed-data attribute telling verifiers that v3 is also present.
const STRIPPING_PROTECTION_ATTR_ID: u32 = 0xbeef_f00d;
const V3_SCHEME_ID: u32 = 3;

/// Trailer: u64 size + magic.
const BLOCK_TRAILER_LEN: u64 = 8 + 16;

/// Fixed `maxSdk` of a v3 signer (no upper bound).
const V3_MAX_SDK: u32 = i32::MAX as u32;

/// Builds a complete signing block for the enabled schemes.
pub(crate) fn build_signing_block(config: &SigningConfig, content_digest: &[u8; 32]) -> Result<Vec<u8>> {
    let public_key = config.public_key_der()?;
    let mut pairs: Vec<(u32, Vec<u8>)> = Vec::new();

    if config.v2_enabled {
        let mut attributes = Vec::new();
        if config.v3_enabled {
            attributes.push((STRIPPING_PROTECTION_ATTR_ID, V3_SCHEME_ID.to_le_bytes().to_vec()));
        }
        let signed_data = encode_signed_data(content_digest, config.certificates(), None, &attributes);
        let signer = encode_signer(config, &signed_data, None, &public_key, SignatureScheme::V2)?;
        pairs.push((V2_BLOCK_ID, prefixed(&sequence([signer]))));
    }

    if config.v3_enabled {
        let sdk = (config.min_sdk, V3_MAX_SDK);
        let signed_data = encode_signed_data(content_digest, config.certificates(), Some(sdk), &[]);
        let signer = encode_signer(config, &signed_data, Some(sdk), &public_key, SignatureScheme::V3)?;
        pairs.push((V3_BLOCK_ID, prefixed(&sequence([signer]))));
    }

    let pairs_len: u64 = pairs.iter().map(|(_, v)| 8 + 4 + v.len() as u64).sum();
    let size = pairs_len + BLOCK_TRAILER_LEN;

    let mut block = Vec::with_capacity(size as usize + 8);
    block.write_u64::<LittleEndian>(size)?;
    for (id, value) in &pairs {
        block.write_u64::<LittleEndian>(4 + value.len() as u64)?;
        block.write_u32::<LittleEndian>(*id)?;
        block.write_all(value)?;
    }
    block.write_u64::<LittleEndian>(size)?;
    block.write_all(APK_SIGNING_BLOCK_MAGIC)?;
    Ok(block)
}

fn encode_signed_data(
    content_digest: &[u8; 32],
    certificates: &[Vec<u8>],
    sdk: Option<(u32, u32)>,
    attributes: &[(u32, Vec<u8>)],
) -> Vec<u8> {
    let mut digest = RSA_PKCS1V15_SHA2_256.to_le_bytes().to_vec();
    put_bytes(&mut digest, content_digest);

    let mut out = Vec::new();
    put_bytes(&mut out, &sequence([digest]));
    put_bytes(&mut out, &sequence(certificates));
    if let Some((min_sdk, max_sdk)) = sdk {
        out.extend_from_slice(&min_sdk.to_le_bytes());
        out.extend_from_slice(&max_sdk.to_le_bytes());
    }
    let encoded_attributes = attributes.iter().map(|(id, value)| {
        let mut attribute = id.to_le_bytes().to_vec();
        attribute.extend_from_slice(value);
        attribute
    });
    put_bytes(&mut out, &sequence(encoded_attributes));
    out
}

fn encode_signer(
    config: &SigningConfig,
    signed_data: &[u8],
    sdk: Option<(u32, u32)>,
    public_key: &[u8],
    scheme: SignatureScheme,
) -> Result<Vec<u8>> {
    let hashed = Sha256::digest(signed_data);
    let signature = config
        .key()
        .sign(Pkcs1v15Sign::new::<Sha256>(), &hashed)
        .map_err(|e| PackError::signing(scheme.to_string(), format!("RSA signature failed: {e}")))?;

    let mut signature_record = RSA_PKCS1V15_SHA2_256.to_le_bytes().to_vec();
    put_bytes(&mut signature_record, &signature);

    let mut signer = Vec::new();
    put_bytes(&mut signer, signed_data);
    if let Some((min_sdk, max_sdk)) = sdk {
        signer.extend_from_slice(&min_sdk.to_le_bytes());
        signer.extend_from_slice(&max_sdk.to_le_bytes());
    }
    put_bytes(&mut signer, &sequence([signature_record]));
    put_bytes(&mut signer, public_key);
    Ok(signer)
}

/// Appends `u32 len || bytes`.
pub(crate) fn put_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(bytes);
}

fn prefixed(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len() + 4);
    put_bytes(&mut out, bytes);
    out
}

/// Concatenates length-prefixed items (without an outer length).
fn sequence<I>(items: I) -> Vec<u8>
where
    I: IntoIterator,
    I::Item: AsRef<[u8]>,
{
    let mut body = Vec::new();
    for item in items {
        put_bytes(&mut body, item.as_ref());
    }
    body
}

/// One parsed signer.
#[derive(Debug)]
pub(crate) struct ParsedSigner {
    pub digests: Vec<(u32, Vec<u8>)>,
    pub certificates: Vec<Vec<u8>>,
    pub sdk: Option<(u32, u32)>,
}

/// Splits a signing block body into `(id, value)` pairs.
///
/// `block` is the whole block, starting with the leading size field.
pub(crate) fn parse_pairs(block: &[u8]) -> std::io::Result<Vec<(u32, &[u8])>> {
    let end = block.len().saturating_sub(BLOCK_TRAILER_LEN as usize);
    let mut pos = 8;
    let mut pairs = Vec::new();
    while pos < end {
        let mut header = block.get(pos..pos + 12).ok_or_else(truncated)?;
        let len = usize::try_from(header.read_u64::<LittleEndian>()?).map_err(|_| truncated())?;
        let id = header.read_u32::<LittleEndian>()?;
        let value_start = pos + 12;
        let value_end = (pos + 8).checked_add(len).ok_or_else(truncated)?;
        if len < 4 || value_end > end {
            return Err(truncated());
        }
        pairs.push((id, &block[value_start..value_end]));
        pos = value_end;
    }
    Ok(pairs)
}

/// Verifies every signer in a v2 or v3 block value and returns them.
pub(crate) fn verify_signers(scheme: SignatureScheme, value: &[u8]) -> Result<Vec<ParsedSigner>> {
    let with_sdk = scheme == SignatureScheme::V3;
    let fail = |reason: String| PackError::signing(scheme.to_string(), reason);

    let mut reader = value;
    let signers = read_bytes(&mut reader).map_err(|e| fail(e.to_string()))?;
    let mut signers = signers.as_slice();
    let mut parsed = Vec::new();

    while !signers.is_empty() {
        let signer = read_bytes(&mut signers).map_err(|e| fail(e.to_string()))?;
        let mut signer = signer.as_slice();
        let signed_data = read_bytes(&mut signer).map_err(|e| fail(e.to_string()))?;
        if with_sdk {
            signer.read_u32::<LittleEndian>().map_err(|e| fail(e.to_string()))?;
            signer.read_u32::<LittleEndian>().map_err(|e| fail(e.to_string()))?;
        }
        let signatures = read_bytes(&mut signer).map_err(|e| fail(e.to_string()))?;
        let public_key = read_bytes(&mut signer).map_err(|e| fail(e.to_string()))?;

        let key = RsaPublicKey::from_public_key_der(&public_key)
            .map_err(|e| fail(format!("unsupported public key: {e}")))?;
        let hashed = Sha256::digest(&signed_data);
        let mut signatures = signatures.as_slice();
        let mut checked = 0;
        while !signatures.is_empty() {
            let record = read_bytes(&mut signatures).map_err(|e| fail(e.to_string()))?;
            let mut record = record.as_slice();
            let algorithm = record
                .read_u32::<LittleEndian>()
                .map_err(|e| fail(e.to_string()))?;
            let signature = read_bytes(&mut record).map_err(|e| fail(e.to_string()))?;
            if algorithm != RSA_PKCS1V15_SHA2_256 {
                return Err(fail(format!("unsupported signature algorithm 0x{algorithm:x}")));
            }
            key.verify(Pkcs1v15Sign::new::<Sha256>(), &hashed, &signature)
                .map_err(|e| fail(format!("signature does not verify: {e}")))?;
            checked += 1;
        }
        if checked == 0 {
            return Err(fail("signer carries no signatures".into()));
        }

        parsed.push(parse_signed_data(&signed_data, with_sdk).map_err(|e| fail(e.to_string()))?);
    }

    if parsed.is_empty() {
        return Err(fail("block carries no signers".into()));
    }
    Ok(parsed)
}

fn parse_signed_data(signed_data: &[u8], with_sdk: bool) -> std::io::Result<ParsedSigner> {
    let mut reader = signed_data;

    let digests_seq = read_bytes(&mut reader)?;
    let mut digests_seq = digests_seq.as_slice();
    let mut digests = Vec::new();
    while !digests_seq.is_empty() {
        let record = read_bytes(&mut digests_seq)?;
        let mut record = record.as_slice();
        let algorithm = record.read_u32::<LittleEndian>()?;
        digests.push((algorithm, read_bytes(&mut record)?));
    }

    let certs_seq = read_bytes(&mut reader)?;
    let mut certs_seq = certs_seq.as_slice();
    let mut certificates = Vec::new();
    while !certs_seq.is_empty() {
        certificates.push(read_bytes(&mut certs_seq)?);
    }

    let sdk = if with_sdk {
        Some((
            reader.read_u32::<LittleEndian>()?,
            reader.read_u32::<LittleEndian>()?,
        ))
    } else {
        None
    };

    Ok(ParsedSigner {
        digests,
        certificates,
        sdk,
    })
}

fn read_bytes(reader: &mut &[u8]) -> std::io::Result<Vec<u8>> {
    let len = reader.read_u32::<LittleEndian>()? as usize;
    if len > reader.len() {
        return Err(truncated());
    }
    let mut out = vec![0u8; len];
    reader.read_exact(&mut out)?;
    Ok(out)
}

fn truncated() -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, "truncated signing block")
}
