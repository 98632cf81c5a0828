//! ZIP serialization of staged entries.
//!
//! Writes local headers, payloads, the central directory and the end of
//! central directory record. Alignment padding goes into the local header's
//! extra field; the central directory never carries padding. Timestamps are
//! fixed at 1980-01-01 00:00 so identical inputs give identical bytes.

use crate::PackError;
use crate::Result;
use crate::alignment::alignment_extra;
use crate::alignment::alignment_extra_len;
use crate::config::Zip64Mode;
use crate::io::CountingWriter;
use crate::writer::compression::Method;
use crate::writer::staged::StagedEntry;
use byteorder::LittleEndian;
use byteorder::WriteBytesExt;
use std::io::Write;
use std::path::Path;

pub(crate) const LOCAL_HEADER_SIGNATURE: u32 = 0x0403_4b50;
pub(crate) const CENTRAL_HEADER_SIGNATURE: u32 = 0x0201_4b50;
pub(crate) const EOCD_SIGNATURE: u32 = 0x0605_4b50;
pub(crate) const ZIP64_EOCD_SIGNATURE: u32 = 0x0606_4b50;
pub(crate) const ZIP64_LOCATOR_SIGNATURE: u32 = 0x0706_4b50;

pub(crate) const LOCAL_HEADER_LEN: u64 = 30;
pub(crate) const EOCD_LEN: usize = 22;
const ZIP64_EOCD_LEN: u64 = 56;

const ZIP64_EXTRA_ID: u16 = 0x0001;
const U32_LIMIT: u64 = 0xFFFF_FFFF;
const U16_LIMIT: usize = 0xFFFF;

const VERSION_MADE_BY: u16 = 20;
const VERSION_STORED: u16 = 10;
const VERSION_DEFLATED: u16 = 20;
const VERSION_ZIP64: u16 = 45;

const FLAG_UTF8: u16 = 1 << 11;

/// 00:00:00.
const DOS_TIME: u16 = 0;
/// 1980-01-01.
const DOS_DATE: u16 = (1 << 5) | 1;

/// Where the sections of a freshly written archive sit.
#[derive(Debug, Clone)]
pub(crate) struct ArchiveLayout {
    /// Offset of the first central directory header.
    pub cd_offset: u64,
    /// Central directory bytes.
    pub central_directory: Vec<u8>,
    /// Zip64 records (if any) followed by the end of central directory.
    pub eocd: Vec<u8>,
    /// Whether any Zip64 structure was written.
    pub zip64: bool,
}

impl ArchiveLayout {
    /// Total archive size.
    pub fn total_len(&self) -> u64 {
        self.cd_offset + self.central_directory.len() as u64 + self.eocd.len() as u64
    }
}

struct Zip64Guard<'a> {
    mode: Zip64Mode,
    dest: &'a Path,
    used: bool,
}

impl Zip64Guard<'_> {
    /// Records that `what` exceeds a classic limit.
    fn require(&mut self, what: impl FnOnce() -> String) -> Result<()> {
        match self.mode {
            Zip64Mode::Allow => {
                self.used = true;
                Ok(())
            }
            Zip64Mode::Forbid => Err(PackError::Zip64Required {
                path: self.dest.to_path_buf(),
                what: what(),
            }),
        }
    }
}

/// Serializes `entries` in the given order.
pub(crate) fn write_archive<W: Write>(
    out: &mut CountingWriter<W>,
    entries: &[StagedEntry],
    zip64: Zip64Mode,
    dest: &Path,
) -> Result<ArchiveLayout> {
    let mut guard = Zip64Guard {
        mode: zip64,
        dest,
        used: false,
    };
    let mut central_directory = Vec::new();

    for entry in entries {
        let record = write_local_entry(out, entry, &mut guard)?;
        central_directory.extend_from_slice(&record);
    }

    let cd_offset = out.position();
    let cd_size = central_directory.len() as u64;
    out.write_all(&central_directory)?;

    let count = entries.len();
    let mut eocd = Vec::with_capacity(EOCD_LEN);
    let needs_zip64_eocd = count >= U16_LIMIT || cd_offset >= U32_LIMIT || cd_size >= U32_LIMIT;
    if needs_zip64_eocd {
        guard.require(|| {
            format!("{count} entries, central directory at {cd_offset} ({cd_size} bytes)")
        })?;
        let record_offset = cd_offset + cd_size;
        write_zip64_eocd(&mut eocd, count as u64, cd_size, cd_offset)?;
        eocd.write_u32::<LittleEndian>(ZIP64_LOCATOR_SIGNATURE)?;
        eocd.write_u32::<LittleEndian>(0)?;
        eocd.write_u64::<LittleEndian>(record_offset)?;
        eocd.write_u32::<LittleEndian>(1)?;
    }

    let classic_count = count.min(U16_LIMIT) as u16;
    eocd.write_u32::<LittleEndian>(EOCD_SIGNATURE)?;
    eocd.write_u16::<LittleEndian>(0)?;
    eocd.write_u16::<LittleEndian>(0)?;
    eocd.write_u16::<LittleEndian>(classic_count)?;
    eocd.write_u16::<LittleEndian>(classic_count)?;
    eocd.write_u32::<LittleEndian>(cd_size.min(U32_LIMIT) as u32)?;
    eocd.write_u32::<LittleEndian>(cd_offset.min(U32_LIMIT) as u32)?;
    eocd.write_u16::<LittleEndian>(0)?;
    out.write_all(&eocd)?;
    out.flush()?;

    Ok(ArchiveLayout {
        cd_offset,
        central_directory,
        eocd,
        zip64: guard.used,
    })
}

/// Writes one local header and payload; returns its central directory record.
fn write_local_entry<W: Write>(
    out: &mut CountingWriter<W>,
    entry: &StagedEntry,
    guard: &mut Zip64Guard<'_>,
) -> Result<Vec<u8>> {
    let offset = out.position();
    let name = entry.name.as_str().as_bytes();
    let payload = &entry.payload;
    let uncompressed = payload.uncompressed_size;
    let compressed = payload.compressed_size();

    let sizes_overflow = uncompressed >= U32_LIMIT || compressed >= U32_LIMIT;
    let offset_overflow = offset >= U32_LIMIT;
    if sizes_overflow {
        guard.require(|| format!("entry '{}' is {uncompressed} bytes", entry.name))?;
    }
    if offset_overflow {
        guard.require(|| format!("entry '{}' starts at offset {offset}", entry.name))?;
    }

    let mut local_extra = Vec::new();
    if sizes_overflow {
        local_extra.write_u16::<LittleEndian>(ZIP64_EXTRA_ID)?;
        local_extra.write_u16::<LittleEndian>(16)?;
        local_extra.write_u64::<LittleEndian>(uncompressed)?;
        local_extra.write_u64::<LittleEndian>(compressed)?;
    }
    let extra_start = offset + LOCAL_HEADER_LEN + name.len() as u64 + local_extra.len() as u64;
    let alignment = entry.alignment.bytes();
    let padding = alignment_extra_len(extra_start, alignment);
    local_extra.extend_from_slice(&alignment_extra(padding, alignment));
    let local_extra_len = u16::try_from(local_extra.len()).map_err(|_| PackError::InvalidPath {
        path: entry.name.to_string(),
        reason: "extra field exceeds 65535 bytes".into(),
    })?;

    let version = if sizes_overflow || offset_overflow {
        VERSION_ZIP64
    } else {
        match payload.method {
            Method::Stored => VERSION_STORED,
            Method::Deflated => VERSION_DEFLATED,
        }
    };
    let flags = if entry.name.as_str().is_ascii() {
        0
    } else {
        FLAG_UTF8
    };
    let (local_compressed, local_uncompressed) = if sizes_overflow {
        (U32_LIMIT as u32, U32_LIMIT as u32)
    } else {
        (compressed as u32, uncompressed as u32)
    };

    let mut header = Vec::with_capacity(LOCAL_HEADER_LEN as usize + name.len());
    header.write_u32::<LittleEndian>(LOCAL_HEADER_SIGNATURE)?;
    header.write_u16::<LittleEndian>(version)?;
    header.write_u16::<LittleEndian>(flags)?;
    header.write_u16::<LittleEndian>(payload.method.code())?;
    header.write_u16::<LittleEndian>(DOS_TIME)?;
    header.write_u16::<LittleEndian>(DOS_DATE)?;
    header.write_u32::<LittleEndian>(payload.crc32)?;
    header.write_u32::<LittleEndian>(local_compressed)?;
    header.write_u32::<LittleEndian>(local_uncompressed)?;
    header.write_u16::<LittleEndian>(name.len() as u16)?;
    header.write_u16::<LittleEndian>(local_extra_len)?;
    header.extend_from_slice(name);
    header.extend_from_slice(&local_extra);
    out.write_all(&header)?;
    out.write_all(&payload.data)?;

    // Central directory: Zip64 fields only for the values that overflow.
    let mut central_extra = Vec::new();
    let mut zip64_fields = Vec::new();
    if uncompressed >= U32_LIMIT {
        zip64_fields.write_u64::<LittleEndian>(uncompressed)?;
    }
    if compressed >= U32_LIMIT {
        zip64_fields.write_u64::<LittleEndian>(compressed)?;
    }
    if offset_overflow {
        zip64_fields.write_u64::<LittleEndian>(offset)?;
    }
    if !zip64_fields.is_empty() {
        central_extra.write_u16::<LittleEndian>(ZIP64_EXTRA_ID)?;
        central_extra.write_u16::<LittleEndian>(zip64_fields.len() as u16)?;
        central_extra.extend_from_slice(&zip64_fields);
    }

    let mut record = Vec::with_capacity(46 + name.len() + central_extra.len());
    record.write_u32::<LittleEndian>(CENTRAL_HEADER_SIGNATURE)?;
    record.write_u16::<LittleEndian>(VERSION_MADE_BY)?;
    record.write_u16::<LittleEndian>(version)?;
    record.write_u16::<LittleEndian>(flags)?;
    record.write_u16::<LittleEndian>(payload.method.code())?;
    record.write_u16::<LittleEndian>(DOS_TIME)?;
    record.write_u16::<LittleEndian>(DOS_DATE)?;
    record.write_u32::<LittleEndian>(payload.crc32)?;
    record.write_u32::<LittleEndian>(compressed.min(U32_LIMIT) as u32)?;
    record.write_u32::<LittleEndian>(uncompressed.min(U32_LIMIT) as u32)?;
    record.write_u16::<LittleEndian>(name.len() as u16)?;
    record.write_u16::<LittleEndian>(central_extra.len() as u16)?;
    record.write_u16::<LittleEndian>(0)?; // comment
    record.write_u16::<LittleEndian>(0)?; // disk
    record.write_u16::<LittleEndian>(0)?; // internal attributes
    record.write_u32::<LittleEndian>(0)?; // external attributes
    record.write_u32::<LittleEndian>(offset.min(U32_LIMIT) as u32)?;
    record.extend_from_slice(name);
    record.extend_from_slice(&central_extra);

    tracing::trace!(
        entry = %entry.name,
        offset,
        data_offset = extra_start + u64::from(padding),
        "wrote local entry"
    );
    Ok(record)
}

fn write_zip64_eocd(out: &mut Vec<u8>, count: u64, cd_size: u64, cd_offset: u64) -> Result<()> {
    out.write_u32::<LittleEndian>(ZIP64_EOCD_SIGNATURE)?;
    out.write_u64::<LittleEndian>(ZIP64_EOCD_LEN - 12)?;
    out.write_u16::<LittleEndian>(VERSION_ZIP64)?;
    out.write_u16::<LittleEndian>(VERSION_ZIP64)?;
    out.write_u32::<LittleEndian>(0)?;
    out.write_u32::<LittleEndian>(0)?;
    out.write_u64::<LittleEndian>(count)?;
    out.write_u64::<LittleEndian>(count)?;
    out.write_u64::<LittleEndian>(cd_size)?;
    out.write_u64::<LittleEndian>(cd_offset)?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::alignment::Alignment;
    use crate::types::EntryName;
    use crate::types::PageSize;
    use crate::writer::compression::Payload;
    use crate::writer::staged::EntryOrigin;
    use std::io::Cursor;
    use std::io::Read;

    fn entry(name: &str, payload: Payload, alignment: Alignment) -> StagedEntry {
        StagedEntry {
            name: EntryName::validate(name).unwrap(),
            payload,
            alignment,
            origin: EntryOrigin::Written,
        }
    }

    fn serialize(entries: &[StagedEntry], mode: Zip64Mode) -> (Vec<u8>, ArchiveLayout) {
        let mut out = CountingWriter::new(Vec::new());
        let layout = write_archive(&mut out, entries, mode, Path::new("out.apk")).unwrap();
        (out.into_inner(), layout)
    }

    #[test]
    fn test_readable_by_zip_crate() {
        let entries = vec![
            entry(
                "classes.dex",
                Payload::compress(vec![b'x'; 4000], 6).unwrap(),
                Alignment::None,
            ),
            entry(
                "lib/x86/libfoo.so",
                Payload::stored(vec![0x7f; 100]),
                Alignment::Page(PageSize::Size16K),
            ),
            entry("res/raw/é.txt", Payload::stored(b"accent".to_vec()), Alignment::Default),
        ];
        let (bytes, layout) = serialize(&entries, Zip64Mode::Forbid);
        assert_eq!(layout.total_len(), bytes.len() as u64);
        assert!(!layout.zip64);

        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 3);

        let mut dex = archive.by_name("classes.dex").unwrap();
        assert_eq!(dex.compression(), zip::CompressionMethod::Deflated);
        let mut content = Vec::new();
        dex.read_to_end(&mut content).unwrap();
        assert_eq!(content, vec![b'x'; 4000]);
        drop(dex);

        let mut accent = archive.by_name("res/raw/é.txt").unwrap();
        let mut content = String::new();
        accent.read_to_string(&mut content).unwrap();
        assert_eq!(content, "accent");
    }

    #[test]
    fn test_page_aligned_payload_offset() {
        let entries = vec![
            entry("a.txt", Payload::stored(b"a".to_vec()), Alignment::Default),
            entry(
                "lib/arm64-v8a/libfoo.so",
                Payload::stored(vec![1; 10]),
                Alignment::Page(PageSize::Size16K),
            ),
        ];
        let (bytes, _) = serialize(&entries, Zip64Mode::Forbid);

        let mut archive = zip::ZipArchive::new(Cursor::new(bytes.clone())).unwrap();
        let lib = archive.by_name("lib/arm64-v8a/libfoo.so").unwrap();
        let header = lib.header_start() as usize;
        drop(lib);

        let name_len = u16::from_le_bytes([bytes[header + 26], bytes[header + 27]]) as usize;
        let extra_len = u16::from_le_bytes([bytes[header + 28], bytes[header + 29]]) as usize;
        let data_start = header + 30 + name_len + extra_len;
        assert_eq!(data_start % 16384, 0);
        assert_eq!(&bytes[data_start..data_start + 10], &[1; 10]);
    }

    #[test]
    fn test_fixed_timestamp() {
        let entries = vec![entry("a.txt", Payload::stored(b"a".to_vec()), Alignment::Default)];
        let (bytes, _) = serialize(&entries, Zip64Mode::Forbid);
        assert_eq!(u16::from_le_bytes([bytes[10], bytes[11]]), DOS_TIME);
        assert_eq!(u16::from_le_bytes([bytes[12], bytes[13]]), DOS_DATE);
    }

    #[test]
    fn test_empty_archive() {
        let (bytes, layout) = serialize(&[], Zip64Mode::Forbid);
        assert_eq!(bytes.len(), EOCD_LEN);
        assert_eq!(layout.cd_offset, 0);
        let archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 0);
    }

    #[test]
    fn test_too_many_entries_forbidden() {
        let entries: Vec<_> = (0..U16_LIMIT)
            .map(|i| entry(&format!("e{i}"), Payload::stored(Vec::new()), Alignment::None))
            .collect();
        let mut out = CountingWriter::new(Vec::new());
        let err = write_archive(&mut out, &entries, Zip64Mode::Forbid, Path::new("big.apk"))
            .unwrap_err();
        assert!(matches!(err, PackError::Zip64Required { .. }));
    }

    #[test]
    fn test_too_many_entries_allowed_with_zip64() {
        let entries: Vec<_> = (0..U16_LIMIT + 1)
            .map(|i| entry(&format!("e{i:05}"), Payload::stored(Vec::new()), Alignment::None))
            .collect();
        let (bytes, layout) = serialize(&entries, Zip64Mode::Allow);
        assert!(layout.zip64);
        let archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), U16_LIMIT + 1);
    }
}
