//! Locating the sections of an existing ZIP file.
//!
//! APK signing works on three sections: entry contents, central directory,
//! and end of central directory (EOCD). A signing block, if present, sits
//! between contents and central directory.

use crate::writer::layout::EOCD_LEN;
use crate::writer::layout::EOCD_SIGNATURE;
use byteorder::LittleEndian;
use byteorder::ReadBytesExt;
use std::io;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;

const MAX_COMMENT_LEN: usize = 0xFFFF;

/// Offset of the central directory offset field inside the EOCD.
pub(crate) const EOCD_CD_OFFSET_FIELD: usize = 16;

/// Section boundaries of a ZIP file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ZipSections {
    /// Start of the central directory.
    pub cd_offset: u64,
    /// Start of the EOCD record.
    pub eocd_offset: u64,
    /// File length.
    pub file_len: u64,
    /// Entry count from the EOCD.
    pub entries: u16,
}

impl ZipSections {
    /// Locates the EOCD by scanning backwards over the maximum comment span.
    pub fn locate<R: Read + Seek>(reader: &mut R) -> io::Result<Self> {
        let file_len = reader.seek(SeekFrom::End(0))?;
        if file_len < EOCD_LEN as u64 {
            return Err(invalid("file too small for a ZIP archive"));
        }

        let search_len = (EOCD_LEN + MAX_COMMENT_LEN).min(file_len as usize);
        let search_start = file_len - search_len as u64;
        reader.seek(SeekFrom::Start(search_start))?;
        let mut buffer = vec![0u8; search_len];
        reader.read_exact(&mut buffer)?;

        let signature = EOCD_SIGNATURE.to_le_bytes();
        for i in (0..=search_len - EOCD_LEN).rev() {
            if buffer[i..i + 4] != signature {
                continue;
            }
            let mut record = &buffer[i + 4..];
            let _disk = record.read_u16::<LittleEndian>()?;
            let _cd_disk = record.read_u16::<LittleEndian>()?;
            let _disk_entries = record.read_u16::<LittleEndian>()?;
            let entries = record.read_u16::<LittleEndian>()?;
            let cd_size = u64::from(record.read_u32::<LittleEndian>()?);
            let cd_offset = u64::from(record.read_u32::<LittleEndian>()?);
            let comment_len = record.read_u16::<LittleEndian>()? as usize;

            // The comment must end exactly at the end of the file; otherwise
            // this is a signature-like byte run inside the comment.
            if i + EOCD_LEN + comment_len != search_len {
                continue;
            }
            let eocd_offset = search_start + i as u64;
            if cd_offset.saturating_add(cd_size) != eocd_offset {
                return Err(invalid(
                    "central directory does not end at the EOCD (Zip64 or trailing data)",
                ));
            }
            return Ok(Self {
                cd_offset,
                eocd_offset,
                file_len,
                entries,
            });
        }

        Err(invalid("end of central directory not found"))
    }
}

fn invalid(message: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_zip;
    use std::io::Cursor;

    #[test]
    fn test_locate_simple_zip() {
        let bytes = create_test_zip(vec![("a.txt", b"hello"), ("b.txt", b"world")]);
        let sections = ZipSections::locate(&mut Cursor::new(&bytes)).unwrap();
        assert_eq!(sections.entries, 2);
        assert_eq!(sections.file_len, bytes.len() as u64);
        assert_eq!(sections.eocd_offset, bytes.len() as u64 - EOCD_LEN as u64);
        assert!(sections.cd_offset < sections.eocd_offset);
    }

    #[test]
    fn test_too_small() {
        let err = ZipSections::locate(&mut Cursor::new(vec![0u8; 10])).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_not_a_zip() {
        let err = ZipSections::locate(&mut Cursor::new(vec![0x41u8; 4096])).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
