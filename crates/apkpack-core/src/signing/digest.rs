//! Chunked SHA-256 content digest used by schemes v2 and v3.
//!
//! Each section is split into 1 MiB chunks; every chunk is hashed as
//! `0xa5 || u32 len || chunk`, and the root is `0x5a || u32 count ||
//! chunk digests`. The EOCD is digested with its central directory offset
//! replaced by the signing block offset.

use crate::signing::sections::EOCD_CD_OFFSET_FIELD;
use sha2::Digest;
use sha2::Sha256;
use std::io;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;

/// Chunk size of the content digest.
pub(crate) const CHUNK_SIZE: u64 = 1024 * 1024;

/// Input section boundaries for the digest.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DigestInput {
    /// End of the entry contents (= signing block start).
    pub contents_end: u64,
    /// Start of the central directory.
    pub cd_start: u64,
    /// Start of the EOCD record.
    pub eocd_start: u64,
    /// End of the file.
    pub file_end: u64,
}

/// Computes the v2/v3 content digest.
pub(crate) fn content_digest<R: Read + Seek>(reader: &mut R, input: DigestInput) -> io::Result<[u8; 32]> {
    let mut chunks: Vec<[u8; 32]> = Vec::new();
    let mut buffer = Vec::with_capacity(CHUNK_SIZE as usize);

    hash_range(reader, 0, input.contents_end, &mut buffer, &mut chunks)?;
    hash_range(reader, input.cd_start, input.eocd_start, &mut buffer, &mut chunks)?;

    // EOCD with the central directory offset pointing at the signing block.
    reader.seek(SeekFrom::Start(input.eocd_start))?;
    let mut eocd = Vec::new();
    reader
        .by_ref()
        .take(input.file_end - input.eocd_start)
        .read_to_end(&mut eocd)?;
    if eocd.len() < EOCD_CD_OFFSET_FIELD + 4 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "truncated end of central directory",
        ));
    }
    let patched = u32::try_from(input.contents_end).map_err(|_| {
        io::Error::new(io::ErrorKind::InvalidData, "signing block offset exceeds 4 GiB")
    })?;
    eocd[EOCD_CD_OFFSET_FIELD..EOCD_CD_OFFSET_FIELD + 4].copy_from_slice(&patched.to_le_bytes());
    for chunk in eocd.chunks(CHUNK_SIZE as usize) {
        chunks.push(chunk_digest(chunk));
    }

    let mut hasher = Sha256::new();
    hasher.update([0x5a]);
    hasher.update((chunks.len() as u32).to_le_bytes());
    for chunk in &chunks {
        hasher.update(chunk);
    }
    Ok(hasher.finalize().into())
}

fn hash_range<R: Read + Seek>(
    reader: &mut R,
    start: u64,
    end: u64,
    buffer: &mut Vec<u8>,
    chunks: &mut Vec<[u8; 32]>,
) -> io::Result<()> {
    reader.seek(SeekFrom::Start(start))?;
    let mut pos = start;
    while pos < end {
        let len = (end - pos).min(CHUNK_SIZE);
        buffer.resize(len as usize, 0);
        reader.read_exact(buffer)?;
        chunks.push(chunk_digest(buffer));
        pos += len;
    }
    Ok(())
}

fn chunk_digest(chunk: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update([0xa5]);
    hasher.update((chunk.len() as u32).to_le_bytes());
    hasher.update(chunk);
    hasher.finalize().into()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::signing::sections::ZipSections;
    use crate::test_utils::create_test_zip;
    use std::io::Cursor;

    fn unsigned_input(bytes: &[u8]) -> DigestInput {
        let sections = ZipSections::locate(&mut Cursor::new(bytes)).unwrap();
        DigestInput {
            contents_end: sections.cd_offset,
            cd_start: sections.cd_offset,
            eocd_start: sections.eocd_offset,
            file_end: sections.file_len,
        }
    }

    #[test]
    fn test_digest_is_stable() {
        let bytes = create_test_zip(vec![("a.txt", b"hello")]);
        let input = unsigned_input(&bytes);
        let first = content_digest(&mut Cursor::new(&bytes), input).unwrap();
        let second = content_digest(&mut Cursor::new(&bytes), input).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_digest_covers_contents() {
        let a = create_test_zip(vec![("a.txt", b"hello")]);
        let b = create_test_zip(vec![("a.txt", b"hellO")]);
        let da = content_digest(&mut Cursor::new(&a), unsigned_input(&a)).unwrap();
        let db = content_digest(&mut Cursor::new(&b), unsigned_input(&b)).unwrap();
        assert_ne!(da, db);
    }

    #[test]
    fn test_single_section_matches_manual_computation() {
        // Three one-chunk sections computed by hand.
        let bytes = create_test_zip(vec![("x", b"y")]);
        let input = unsigned_input(&bytes);
        let c = input.cd_start as usize;
        let e = input.eocd_start as usize;
        let mut eocd = bytes[e..].to_vec();
        eocd[16..20].copy_from_slice(&(c as u32).to_le_bytes());

        let mut hasher = Sha256::new();
        hasher.update([0x5a]);
        hasher.update(3u32.to_le_bytes());
        hasher.update(chunk_digest(&bytes[..c]));
        hasher.update(chunk_digest(&bytes[c..e]));
        hasher.update(chunk_digest(&eocd));
        let expected: [u8; 32] = hasher.finalize().into();

        assert_eq!(content_digest(&mut Cursor::new(&bytes), input).unwrap(), expected);
    }
}
