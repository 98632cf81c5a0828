//! Alignment policy for entry payloads.
//!
//! Pure functions: whether an entry needs alignment is derived from its final
//! compression state and a caller-supplied page-align predicate, and the
//! padding needed to reach that alignment is derived from the header offset.

use crate::types::PageSize;

/// Alignment of compressed entries (none).
pub const NO_ALIGNMENT: u64 = 1;

/// Alignment of uncompressed entries that are not page aligned.
pub const DEFAULT_ALIGNMENT: u64 = 4;

/// Header id of the Android alignment extra field.
///
/// Layout: `u16 id, u16 size, u16 alignment, zero fill`.
pub const ALIGNMENT_EXTRA_ID: u16 = 0xD935;

/// Fixed part of the alignment extra field (id, size, alignment).
pub const ALIGNMENT_EXTRA_HEADER_LEN: u64 = 6;

/// Required payload alignment of one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Alignment {
    /// Compressed entry; any offset is fine.
    None,
    /// Uncompressed entry; 4-byte boundary.
    Default,
    /// Uncompressed entry matching the page-align rule.
    Page(PageSize),
}

impl Alignment {
    /// Alignment in bytes.
    #[inline]
    #[must_use]
    pub const fn bytes(self) -> u64 {
        match self {
            Self::None => NO_ALIGNMENT,
            Self::Default => DEFAULT_ALIGNMENT,
            Self::Page(page) => page.bytes(),
        }
    }

    /// Returns `true` for page alignment.
    #[must_use]
    pub const fn is_page(self) -> bool {
        matches!(self, Self::Page(_))
    }
}

/// Computes the alignment an entry needs in the destination archive.
///
/// | compressed | page rule matches | alignment |
/// |---|---|---|
/// | yes | any | none (1) |
/// | no | yes | page size |
/// | no | no | 4 |
///
/// # Examples
///
/// ```
/// use apkpack_core::alignment::{Alignment, compute_alignment};
/// use apkpack_core::types::PageSize;
///
/// assert_eq!(compute_alignment(true, true, PageSize::Size16K), Alignment::None);
/// assert_eq!(compute_alignment(false, true, PageSize::Size16K).bytes(), 16384);
/// assert_eq!(compute_alignment(false, false, PageSize::Size4K).bytes(), 4);
/// ```
#[must_use]
pub const fn compute_alignment(
    compressed_in_destination: bool,
    matches_page_rule: bool,
    page_size: PageSize,
) -> Alignment {
    if compressed_in_destination {
        Alignment::None
    } else if matches_page_rule {
        Alignment::Page(page_size)
    } else {
        Alignment::Default
    }
}

/// Returns `true` if `offset` is a multiple of `alignment`.
#[inline]
#[must_use]
pub const fn is_aligned(offset: u64, alignment: u64) -> bool {
    alignment <= 1 || offset % alignment == 0
}

/// Total length of the alignment extra field needed so that payload data
/// placed right after it starts on an `alignment` boundary.
///
/// `extra_start` is the absolute offset where the extra field would begin
/// (local header offset + 30 + name length + any other extra fields).
/// Returns 0 when the payload is already aligned without an extra field.
///
/// # Examples
///
/// ```
/// use apkpack_core::alignment::alignment_extra_len;
///
/// // Already aligned: nothing to add.
/// assert_eq!(alignment_extra_len(4096, 4096), 0);
/// // 6 header bytes plus zero fill up to the next boundary.
/// let len = alignment_extra_len(100, 4096);
/// assert_eq!((100 + u64::from(len)) % 4096, 0);
/// ```
#[must_use]
pub const fn alignment_extra_len(extra_start: u64, alignment: u64) -> u16 {
    if is_aligned(extra_start, alignment) {
        return 0;
    }
    let after_header = extra_start + ALIGNMENT_EXTRA_HEADER_LEN;
    let fill = (alignment - after_header % alignment) % alignment;
    (ALIGNMENT_EXTRA_HEADER_LEN + fill) as u16
}

/// Serializes an alignment extra field of total length `len`.
///
/// `len` must be 0 or at least [`ALIGNMENT_EXTRA_HEADER_LEN`].
#[must_use]
pub fn alignment_extra(len: u16, alignment: u64) -> Vec<u8> {
    if len == 0 {
        return Vec::new();
    }
    let mut extra = vec![0u8; usize::from(len)];
    extra[0..2].copy_from_slice(&ALIGNMENT_EXTRA_ID.to_le_bytes());
    extra[2..4].copy_from_slice(&(len - 4).to_le_bytes());
    // Alignment values above u16::MAX do not occur (page sizes are 4K/16K).
    extra[4..6].copy_from_slice(&(alignment.min(u64::from(u16::MAX)) as u16).to_le_bytes());
    extra
}
