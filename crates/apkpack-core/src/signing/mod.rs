//! APK signing: schemes v2 and v3 signing blocks and the v4 `.idsig` file.
//!
//! Signing runs after every entry has been serialized. The signing block is
//! inserted between the entries and the central directory, and the EOCD's
//! central directory offset is moved past it. Any scheme failure aborts the
//! whole step; the caller discards the unsigned output.

mod block;
pub mod config;
mod digest;
pub(crate) mod sections;
mod v4;

pub use config::SigningConfig;

use crate::PackError;
use crate::Result;
use crate::writer::layout::ArchiveLayout;
use block::APK_SIGNING_BLOCK_MAGIC;
use block::RSA_PKCS1V15_SHA2_256;
use block::V2_BLOCK_ID;
use block::V3_BLOCK_ID;
use digest::DigestInput;
use sections::EOCD_CD_OFFSET_FIELD;
use sections::ZipSections;
use sha2::Digest;
use sha2::Sha256;
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use std::io::Write;
use std::path::Path;

/// APK signature scheme version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SignatureScheme {
    /// JAR signing.
    V1,
    /// APK Signature Scheme v2.
    V2,
    /// APK Signature Scheme v3.
    V3,
    /// APK Signature Scheme v4 (companion file).
    V4,
}

impl fmt::Display for SignatureScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::V1 => "v1",
            Self::V2 => "v2",
            Self::V3 => "v3",
            Self::V4 => "v4",
        })
    }
}

/// What signing produced.
#[derive(Debug)]
pub(crate) struct SignOutcome {
    pub schemes: Vec<SignatureScheme>,
    /// `.idsig` contents when v4 is enabled.
    pub idsig: Option<Vec<u8>>,
}

/// Signs an archive written by the layout step, in place.
///
/// `file` holds exactly the bytes described by `layout`.
pub(crate) fn sign_archive(
    file: &mut File,
    layout: &ArchiveLayout,
    config: &SigningConfig,
) -> Result<SignOutcome> {
    if layout.zip64 {
        return Err(PackError::signing(
            "v2",
            "Zip64 archives cannot carry an APK signing block",
        ));
    }

    let cd_len = layout.central_directory.len() as u64;
    let input = DigestInput {
        contents_end: layout.cd_offset,
        cd_start: layout.cd_offset,
        eocd_start: layout.cd_offset + cd_len,
        file_end: layout.total_len(),
    };
    let content_digest = digest::content_digest(&mut BufReader::new(&mut *file), input)
        .map_err(|e| PackError::signing("v2", format!("cannot digest archive: {e}")))?;

    let signing_block = block::build_signing_block(config, &content_digest)?;
    let new_cd_offset = layout.cd_offset + signing_block.len() as u64;
    let new_cd_offset = u32::try_from(new_cd_offset).map_err(|_| {
        PackError::signing("v2", "central directory would move beyond 4 GiB")
    })?;

    let mut eocd = layout.eocd.clone();
    eocd[EOCD_CD_OFFSET_FIELD..EOCD_CD_OFFSET_FIELD + 4]
        .copy_from_slice(&new_cd_offset.to_le_bytes());

    file.set_len(layout.cd_offset)?;
    file.seek(SeekFrom::Start(layout.cd_offset))?;
    file.write_all(&signing_block)?;
    file.write_all(&layout.central_directory)?;
    file.write_all(&eocd)?;
    file.flush()?;

    let mut schemes = Vec::new();
    if config.v2_enabled {
        schemes.push(SignatureScheme::V2);
    }
    if config.v3_enabled {
        schemes.push(SignatureScheme::V3);
    }

    let idsig = if config.v4_enabled {
        let file_size = file.seek(SeekFrom::End(0))?;
        file.rewind()?;
        let idsig = v4::build_idsig(config, BufReader::new(&mut *file), file_size, &content_digest)?;
        schemes.push(SignatureScheme::V4);
        Some(idsig)
    } else {
        None
    };

    tracing::info!(
        schemes = ?schemes,
        block_len = signing_block.len(),
        "signed archive"
    );
    Ok(SignOutcome { schemes, idsig })
}

/// Result of verifying an archive's signatures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureVerification {
    /// Schemes whose signatures verified.
    pub schemes: Vec<SignatureScheme>,
    /// Number of signers across all verified schemes.
    pub signers: usize,
    /// SHA-256 fingerprints of the signer certificates, hex encoded.
    pub certificate_fingerprints: Vec<String>,
    /// Minimum platform level of the v3 signer, if present.
    pub v3_min_sdk: Option<u32>,
}

/// Verifies the v2/v3 signing block of an archive.
///
/// Recomputes the content digest and checks every signer's signature and
/// digest.
///
/// # Errors
///
/// Returns `PackError::Signing` if the archive has no signing block, a
/// signature does not verify, or the signed digest does not match the
/// content. I/O errors carry the archive path.
///
/// # Examples
///
/// ```no_run
/// use apkpack_core::verify_signing_block;
///
/// let verification = verify_signing_block("app-release.apk")?;
/// println!("signed with {:?}", verification.schemes);
/// # Ok::<(), apkpack_core::PackError>(())
/// ```
pub fn verify_signing_block(path: impl AsRef<Path>) -> Result<SignatureVerification> {
    let path = path.as_ref();
    let mut reader =
        BufReader::new(File::open(path).map_err(|e| PackError::io_at(path, e))?);
    let sections = ZipSections::locate(&mut reader).map_err(|e| PackError::InvalidArchive {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let block = read_signing_block(&mut reader, sections.cd_offset)
        .map_err(|e| PackError::io_at(path, e))?
        .ok_or_else(|| PackError::signing("v2", "archive has no APK signing block"))?;
    let block_start = sections.cd_offset - block.len() as u64;

    let content_digest = digest::content_digest(
        &mut reader,
        DigestInput {
            contents_end: block_start,
            cd_start: sections.cd_offset,
            eocd_start: sections.eocd_offset,
            file_end: sections.file_len,
        },
    )
    .map_err(|e| PackError::io_at(path, e))?;

    let pairs = block::parse_pairs(&block)
        .map_err(|e| PackError::signing("v2", e.to_string()))?;

    let mut verification = SignatureVerification {
        schemes: Vec::new(),
        signers: 0,
        certificate_fingerprints: Vec::new(),
        v3_min_sdk: None,
    };
    for (id, value) in pairs {
        let scheme = match id {
            V2_BLOCK_ID => SignatureScheme::V2,
            V3_BLOCK_ID => SignatureScheme::V3,
            other => {
                tracing::debug!(id = format_args!("0x{other:x}"), "skipping signing block pair");
                continue;
            }
        };
        for signer in block::verify_signers(scheme, value)? {
            let matches = signer
                .digests
                .iter()
                .any(|(alg, d)| *alg == RSA_PKCS1V15_SHA2_256 && d.as_slice() == content_digest);
            if !matches {
                return Err(PackError::signing(
                    scheme.to_string(),
                    "signed content digest does not match the archive",
                ));
            }
            if let Some((min_sdk, _)) = signer.sdk {
                verification.v3_min_sdk = Some(min_sdk);
            }
            for cert in &signer.certificates {
                let fingerprint = hex(&Sha256::digest(cert));
                if !verification.certificate_fingerprints.contains(&fingerprint) {
                    verification.certificate_fingerprints.push(fingerprint);
                }
            }
            verification.signers += 1;
        }
        verification.schemes.push(scheme);
    }

    if verification.schemes.is_empty() {
        return Err(PackError::signing(
            "v2",
            "signing block holds no v2 or v3 signature",
        ));
    }
    Ok(verification)
}

/// Checks a `.idsig` file against the archive it was produced for.
///
/// # Errors
///
/// Returns `PackError::Signing` if the Merkle tree, root hash, or content
/// digest do not match the archive, or if the RSA signature over them does
/// not verify against the public key the file carries.
pub fn verify_idsig(archive: impl AsRef<Path>, idsig: impl AsRef<Path>) -> Result<()> {
    let archive = archive.as_ref();
    let idsig = idsig.as_ref();
    let bytes = std::fs::read(idsig).map_err(|e| PackError::io_at(idsig, e))?;
    let parsed = v4::parse_idsig(&bytes).map_err(|e| PackError::signing("v4", e.to_string()))?;

    let file = File::open(archive).map_err(|e| PackError::io_at(archive, e))?;
    let tree = v4::merkle_tree(BufReader::new(file)).map_err(|e| PackError::io_at(archive, e))?;
    if tree.root.as_slice() != parsed.root || tree.tree != parsed.tree {
        return Err(PackError::signing("v4", "Merkle tree does not match the archive"));
    }

    let mut reader =
        BufReader::new(File::open(archive).map_err(|e| PackError::io_at(archive, e))?);
    let sections = ZipSections::locate(&mut reader).map_err(|e| PackError::io_at(archive, e))?;
    let block = read_signing_block(&mut reader, sections.cd_offset)
        .map_err(|e| PackError::io_at(archive, e))?
        .ok_or_else(|| PackError::signing("v4", "archive has no APK signing block"))?;
    let content_digest = digest::content_digest(
        &mut reader,
        DigestInput {
            contents_end: sections.cd_offset - block.len() as u64,
            cd_start: sections.cd_offset,
            eocd_start: sections.eocd_offset,
            file_end: sections.file_len,
        },
    )
    .map_err(|e| PackError::io_at(archive, e))?;
    if parsed.apk_digest != content_digest {
        return Err(PackError::signing("v4", "idsig digest does not match the archive"));
    }
    parsed.verify_signature(sections.file_len)
}

/// Reads the signing block that ends at `cd_offset`, if one is present.
fn read_signing_block<R: Read + Seek>(reader: &mut R, cd_offset: u64) -> std::io::Result<Option<Vec<u8>>> {
    if cd_offset < 32 {
        return Ok(None);
    }
    reader.seek(SeekFrom::Start(cd_offset - 24))?;
    let mut trailer = [0u8; 24];
    reader.read_exact(&mut trailer)?;
    if &trailer[8..] != APK_SIGNING_BLOCK_MAGIC {
        return Ok(None);
    }
    let mut size_bytes = [0u8; 8];
    size_bytes.copy_from_slice(&trailer[..8]);
    let size = u64::from_le_bytes(size_bytes);
    let total = size.checked_add(8).filter(|t| *t <= cd_offset).ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidData, "signing block size out of range")
    })?;

    let start = cd_offset - total;
    reader.seek(SeekFrom::Start(start))?;
    let mut block = vec![0u8; total as usize];
    reader.read_exact(&mut block)?;
    if block[..8] != size_bytes {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "signing block size fields disagree",
        ));
    }
    Ok(Some(block))
}

fn hex(bytes: &[u8]) -> String {
    use std::fmt::Write as _;
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut s, b| {
        let _ = write!(s, "{b:02x}");
        s
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_zip;
    use tempfile::TempDir;

    #[test]
    fn test_scheme_display() {
        assert_eq!(SignatureScheme::V2.to_string(), "v2");
        assert_eq!(SignatureScheme::V4.to_string(), "v4");
    }

    #[test]
    fn test_unsigned_archive_has_no_block() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("unsigned.apk");
        std::fs::write(&path, create_test_zip(vec![("a.txt", b"x")])).unwrap();

        let err = verify_signing_block(&path).unwrap_err();
        assert!(matches!(err, PackError::Signing { .. }));
        assert!(err.to_string().contains("no APK signing block"));
    }

    #[test]
    fn test_not_a_zip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("junk.apk");
        std::fs::write(&path, b"definitely not a zip archive").unwrap();
        let err = verify_signing_block(&path).unwrap_err();
        assert!(matches!(err, PackError::InvalidArchive { .. }));
    }

    #[test]
    fn test_hex() {
        assert_eq!(hex(&[0x00, 0xab, 0x10]), "00ab10");
    }
}
