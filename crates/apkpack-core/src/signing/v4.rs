//! Scheme v4 companion file (`.idsig`).
//!
//! The file carries an fs-verity style SHA-256 Merkle tree over the whole
//! signed archive (4 KiB blocks, zero padded, no salt), the root hash, and an
//! RSA signature binding the tree to the v2/v3 content digest and the signer
//! certificate.

use crate::PackError;
use crate::Result;
use crate::signing::block::RSA_PKCS1V15_SHA2_256;
use crate::signing::block::put_bytes;
use crate::signing::config::SigningConfig;
use byteorder::LittleEndian;
use byteorder::ReadBytesExt;
use rsa::Pkcs1v15Sign;
use rsa::RsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use sha2::Digest;
use sha2::Sha256;
use std::io::Read;

const IDSIG_VERSION: u32 = 2;
const HASH_ALGORITHM_SHA256: u32 = 1;
const LOG2_BLOCK_SIZE: u8 = 12;
const BLOCK_SIZE: usize = 1 << LOG2_BLOCK_SIZE;
const DIGEST_LEN: usize = 32;

/// Merkle tree over a byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MerkleTree {
    /// Levels top first, each padded to a whole number of blocks.
    pub tree: Vec<u8>,
    /// SHA-256 of the top level block.
    pub root: [u8; 32],
}

/// Hashes `data` into an fs-verity style tree.
pub(crate) fn merkle_tree<R: Read>(mut data: R) -> std::io::Result<MerkleTree> {
    let mut hashes = Vec::new();
    let mut block = vec![0u8; BLOCK_SIZE];
    loop {
        let filled = read_block(&mut data, &mut block)?;
        if filled == 0 {
            break;
        }
        block[filled..].fill(0);
        hashes.extend_from_slice(&Sha256::digest(&block));
        if filled < BLOCK_SIZE {
            break;
        }
    }

    if hashes.is_empty() {
        return Ok(MerkleTree {
            tree: Vec::new(),
            root: [0u8; DIGEST_LEN],
        });
    }

    let mut levels: Vec<Vec<u8>> = Vec::new();
    loop {
        let mut level = hashes;
        let padded = level.len().div_ceil(BLOCK_SIZE) * BLOCK_SIZE;
        level.resize(padded, 0);
        let done = level.len() == BLOCK_SIZE;
        hashes = if done {
            Vec::new()
        } else {
            level
                .chunks(BLOCK_SIZE)
                .flat_map(|chunk| Sha256::digest(chunk).to_vec())
                .collect()
        };
        levels.push(level);
        if done {
            break;
        }
    }

    let root = levels
        .last()
        .map(|top| Sha256::digest(top).into())
        .unwrap_or([0u8; DIGEST_LEN]);
    let tree = levels.into_iter().rev().flatten().collect();
    Ok(MerkleTree { tree, root })
}

fn read_block<R: Read>(reader: &mut R, block: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < block.len() {
        match reader.read(&mut block[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

fn hashing_info(root: &[u8; 32]) -> Vec<u8> {
    let mut info = HASH_ALGORITHM_SHA256.to_le_bytes().to_vec();
    info.push(LOG2_BLOCK_SIZE);
    put_bytes(&mut info, &[]);
    put_bytes(&mut info, root);
    info
}

/// Bytes covered by the v4 signature.
fn signed_data(file_size: u64, root: &[u8; 32], apk_digest: &[u8], certificate: &[u8]) -> Vec<u8> {
    let mut body = file_size.to_le_bytes().to_vec();
    body.extend_from_slice(&HASH_ALGORITHM_SHA256.to_le_bytes());
    body.push(LOG2_BLOCK_SIZE);
    put_bytes(&mut body, &[]);
    put_bytes(&mut body, root);
    put_bytes(&mut body, apk_digest);
    put_bytes(&mut body, certificate);
    put_bytes(&mut body, &[]);

    let mut out = ((body.len() + 4) as u32).to_le_bytes().to_vec();
    out.extend_from_slice(&body);
    out
}

/// Builds the `.idsig` file contents for a signed archive.
///
/// `apk_digest` is the v3 (or v2) content digest of the same archive.
pub(crate) fn build_idsig<R: Read>(
    config: &SigningConfig,
    archive: R,
    file_size: u64,
    apk_digest: &[u8; 32],
) -> Result<Vec<u8>> {
    let fail = |reason: String| PackError::signing("v4", reason);
    let certificate = config
        .certificates()
        .first()
        .ok_or_else(|| fail("no signer certificate".into()))?;
    let tree = merkle_tree(archive).map_err(|e| fail(format!("cannot hash archive: {e}")))?;

    let to_sign = signed_data(file_size, &tree.root, apk_digest, certificate);
    let signature = config
        .key()
        .sign(Pkcs1v15Sign::new::<Sha256>(), &Sha256::digest(&to_sign))
        .map_err(|e| fail(format!("RSA signature failed: {e}")))?;

    let mut signing_info = Vec::new();
    put_bytes(&mut signing_info, apk_digest);
    put_bytes(&mut signing_info, certificate);
    put_bytes(&mut signing_info, &[]);
    put_bytes(&mut signing_info, &config.public_key_der()?);
    signing_info.extend_from_slice(&RSA_PKCS1V15_SHA2_256.to_le_bytes());
    put_bytes(&mut signing_info, &signature);

    let mut out = IDSIG_VERSION.to_le_bytes().to_vec();
    put_bytes(&mut out, &hashing_info(&tree.root));
    put_bytes(&mut out, &signing_info);
    put_bytes(&mut out, &tree.tree);
    Ok(out)
}

/// Fields of a parsed `.idsig` file needed for verification.
#[derive(Debug)]
pub(crate) struct ParsedIdsig {
    pub root: Vec<u8>,
    pub apk_digest: Vec<u8>,
    pub certificate: Vec<u8>,
    pub public_key: Vec<u8>,
    pub algorithm: u32,
    pub signature: Vec<u8>,
    pub tree: Vec<u8>,
}

impl ParsedIdsig {
    /// Checks the RSA signature over the tree root, content digest and
    /// certificate, for an archive of `file_size` bytes.
    pub(crate) fn verify_signature(&self, file_size: u64) -> Result<()> {
        let fail = |reason: String| PackError::signing("v4", reason);
        if self.algorithm != RSA_PKCS1V15_SHA2_256 {
            return Err(fail(format!(
                "unsupported signature algorithm 0x{:x}",
                self.algorithm
            )));
        }
        let root: [u8; DIGEST_LEN] = self
            .root
            .as_slice()
            .try_into()
            .map_err(|_| fail(format!("root hash has {} bytes", self.root.len())))?;
        let key = RsaPublicKey::from_public_key_der(&self.public_key)
            .map_err(|e| fail(format!("unsupported public key: {e}")))?;

        let signed = signed_data(file_size, &root, &self.apk_digest, &self.certificate);
        key.verify(
            Pkcs1v15Sign::new::<Sha256>(),
            &Sha256::digest(&signed),
            &self.signature,
        )
        .map_err(|e| fail(format!("signature does not verify: {e}")))
    }
}

/// Parses an `.idsig` file.
pub(crate) fn parse_idsig(bytes: &[u8]) -> std::io::Result<ParsedIdsig> {
    let mut reader = bytes;
    let version = reader.read_u32::<LittleEndian>()?;
    if version != IDSIG_VERSION {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("unsupported idsig version {version}"),
        ));
    }
    let hashing = read_bytes(&mut reader)?;
    let mut hashing = hashing.as_slice();
    let _algorithm = hashing.read_u32::<LittleEndian>()?;
    let _log2 = hashing.read_u8()?;
    let _salt = read_bytes(&mut hashing)?;
    let root = read_bytes(&mut hashing)?;

    let signing = read_bytes(&mut reader)?;
    let mut signing = signing.as_slice();
    let apk_digest = read_bytes(&mut signing)?;
    let certificate = read_bytes(&mut signing)?;
    let _additional_data = read_bytes(&mut signing)?;
    let public_key = read_bytes(&mut signing)?;
    let algorithm = signing.read_u32::<LittleEndian>()?;
    let signature = read_bytes(&mut signing)?;

    let tree = read_bytes(&mut reader)?;
    Ok(ParsedIdsig {
        root,
        apk_digest,
        certificate,
        public_key,
        algorithm,
        signature,
        tree,
    })
}

fn read_bytes(reader: &mut &[u8]) -> std::io::Result<Vec<u8>> {
    let len = reader.read_u32::<LittleEndian>()? as usize;
    if len > reader.len() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "truncated idsig field",
        ));
    }
    let mut out = vec![0u8; len];
    reader.read_exact(&mut out)?;
    Ok(out)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_utils::TEST_SIGNING_PEM;

    #[test]
    fn test_single_block_tree() {
        let data = vec![0xabu8; 100];
        let tree = merkle_tree(data.as_slice()).unwrap();

        let mut block = data.clone();
        block.resize(BLOCK_SIZE, 0);
        let mut level = Sha256::digest(&block).to_vec();
        level.resize(BLOCK_SIZE, 0);
        let root: [u8; 32] = Sha256::digest(&level).into();

        assert_eq!(tree.tree, level);
        assert_eq!(tree.root, root);
    }

    #[test]
    fn test_two_level_tree() {
        // 129 data blocks -> 129 hashes -> 2 blocks at level 0 -> 1 block above.
        let data = vec![1u8; BLOCK_SIZE * 129];
        let tree = merkle_tree(data.as_slice()).unwrap();
        assert_eq!(tree.tree.len(), 3 * BLOCK_SIZE);
        let top = &tree.tree[..BLOCK_SIZE];
        assert_eq!(tree.root, <[u8; 32]>::from(Sha256::digest(top)));
    }

    #[test]
    fn test_exact_block_multiple() {
        let data = vec![2u8; BLOCK_SIZE * 2];
        let tree = merkle_tree(data.as_slice()).unwrap();
        assert_eq!(tree.tree.len(), BLOCK_SIZE);
    }

    #[test]
    fn test_empty_input() {
        let tree = merkle_tree(&[][..]).unwrap();
        assert!(tree.tree.is_empty());
    }

    #[test]
    fn test_idsig_parses_back() {
        let config = SigningConfig::from_pem(TEST_SIGNING_PEM).unwrap();
        let archive = vec![5u8; 10_000];
        let digest = [3u8; 32];
        let idsig = build_idsig(&config, archive.as_slice(), archive.len() as u64, &digest).unwrap();

        let parsed = parse_idsig(&idsig).unwrap();
        let expected = merkle_tree(archive.as_slice()).unwrap();
        assert_eq!(parsed.apk_digest, digest);
        assert_eq!(parsed.root, expected.root);
        assert_eq!(parsed.tree, expected.tree);
        assert_eq!(parsed.certificate, config.certificates()[0]);
        assert_eq!(parsed.algorithm, RSA_PKCS1V15_SHA2_256);
    }

    #[test]
    fn test_signature_verifies() {
        let config = SigningConfig::from_pem(TEST_SIGNING_PEM).unwrap();
        let archive = vec![9u8; 6000];
        let idsig = build_idsig(&config, archive.as_slice(), archive.len() as u64, &[4u8; 32]).unwrap();

        let parsed = parse_idsig(&idsig).unwrap();
        parsed.verify_signature(archive.len() as u64).unwrap();
    }

    #[test]
    fn test_tampered_signature_rejected() {
        let config = SigningConfig::from_pem(TEST_SIGNING_PEM).unwrap();
        let archive = vec![9u8; 6000];
        let idsig = build_idsig(&config, archive.as_slice(), archive.len() as u64, &[4u8; 32]).unwrap();

        let mut parsed = parse_idsig(&idsig).unwrap();
        parsed.signature[0] ^= 0x01;
        let err = parsed.verify_signature(archive.len() as u64).unwrap_err();
        assert!(err.to_string().contains("does not verify"), "{err}");
    }

    #[test]
    fn test_signed_fields_are_bound() {
        let config = SigningConfig::from_pem(TEST_SIGNING_PEM).unwrap();
        let archive = vec![9u8; 6000];
        let idsig = build_idsig(&config, archive.as_slice(), archive.len() as u64, &[4u8; 32]).unwrap();

        let parsed = parse_idsig(&idsig).unwrap();
        assert!(parsed.verify_signature(archive.len() as u64 + 1).is_err());

        let mut digest_swapped = parse_idsig(&idsig).unwrap();
        digest_swapped.apk_digest = vec![5u8; 32];
        assert!(digest_swapped.verify_signature(archive.len() as u64).is_err());
    }
}
