//! Just enough ELF parsing to find PT_LOAD alignments.
//!
//! Only 64-bit little-endian images are understood. Anything else, including
//! truncated or inconsistent headers, yields `None`.

use byteorder::ByteOrder;
use byteorder::LittleEndian;

/// `\x7fELF`.
pub const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];

const ELF_CLASS_64: u8 = 2;
const ELF_DATA_LITTLE_ENDIAN: u8 = 1;
const ELF64_HEADER_LEN: usize = 0x40;
const ELF64_PHDR_LEN: usize = 0x38;
const SEGMENT_TYPE_LOAD: u32 = 1;

// Offsets into the ELF64 file header.
const E_PHOFF: usize = 0x20;
const E_PHENTSIZE: usize = 0x36;
const E_PHNUM: usize = 0x38;

// Offsets into an ELF64 program header.
const P_TYPE: usize = 0x00;
const P_OFFSET: usize = 0x08;
const P_ALIGN: usize = 0x30;

/// One PT_LOAD program header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadSegment {
    /// File offset of the segment.
    pub offset: u64,
    /// Declared alignment.
    pub alignment: u64,
}

/// Location of the program header table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ProgramHeaders {
    offset: usize,
    entry_len: usize,
    count: usize,
}

impl ProgramHeaders {
    /// Bytes of the image needed to read every program header.
    pub fn end(&self) -> usize {
        self.offset + self.entry_len * self.count
    }
}

/// Returns `true` if `bytes` starts with the ELF magic.
pub fn is_elf(bytes: &[u8]) -> bool {
    bytes.starts_with(&ELF_MAGIC)
}

/// Reads the file header of a 64-bit little-endian ELF image.
pub(crate) fn program_headers(header: &[u8]) -> Option<ProgramHeaders> {
    if header.len() < ELF64_HEADER_LEN || !is_elf(header) {
        return None;
    }
    if header[4] != ELF_CLASS_64 || header[5] != ELF_DATA_LITTLE_ENDIAN {
        return None;
    }

    let offset = usize::try_from(LittleEndian::read_u64(&header[E_PHOFF..])).ok()?;
    let entry_len = usize::from(LittleEndian::read_u16(&header[E_PHENTSIZE..]));
    let count = usize::from(LittleEndian::read_u16(&header[E_PHNUM..]));
    if entry_len < ELF64_PHDR_LEN {
        return None;
    }
    offset.checked_add(entry_len.checked_mul(count)?)?;
    Some(ProgramHeaders {
        offset,
        entry_len,
        count,
    })
}

/// Every PT_LOAD segment of a 64-bit little-endian ELF image.
///
/// `image` must hold at least the first [`ProgramHeaders::end`] bytes.
pub fn load_segments(image: &[u8]) -> Option<Vec<LoadSegment>> {
    let table = program_headers(image)?;
    let headers = image.get(table.offset..table.end())?;

    let segments = headers
        .chunks_exact(table.entry_len)
        .filter(|phdr| LittleEndian::read_u32(&phdr[P_TYPE..]) == SEGMENT_TYPE_LOAD)
        .map(|phdr| LoadSegment {
            offset: LittleEndian::read_u64(&phdr[P_OFFSET..]),
            alignment: LittleEndian::read_u64(&phdr[P_ALIGN..]),
        })
        .collect();
    Some(segments)
}

/// Smallest alignment over all PT_LOAD segments, if there are any.
pub fn min_load_alignment(image: &[u8]) -> Option<u64> {
    load_segments(image)?
        .iter()
        .map(|segment| segment.alignment)
        .min()
}
