//! Read-only alignment checks over finished archives.
//!
//! [`audit_archive`] looks inside every ELF entry for PT_LOAD segments that
//! would not load on 16 KB page devices. [`check_alignment`] verifies that
//! stored entries start on the boundary the packing rules require, like
//! `zipalign -c`. Neither depends on how the archive was built.
//!
//! Findings are data, not errors: only an unreadable archive fails.

pub mod elf;

use crate::PackError;
use crate::Result;
use crate::alignment::DEFAULT_ALIGNMENT;
use crate::matcher::PathMatcher;
use crate::types::PageSize;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::io::Read;
use std::path::Path;
use zip::CompressionMethod;
use zip::ZipArchive;

/// Page size the ELF audit checks against.
pub const AUDIT_PAGE_SIZE: u64 = 16384;

/// Program header tables further into the image than this are not read.
const MAX_PROGRAM_HEADER_END: usize = 1024 * 1024;

/// A page-alignment defect of one archive entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AlignmentProblem {
    /// The smallest PT_LOAD alignment is not a multiple of 16 KiB.
    ///
    /// Any `p_align` below 16384 counts, including 0 and 1 ("no
    /// constraint"), even though 0 is technically a multiple of 16384.
    ElfLoadSectionsNot16kAligned,
    /// The entry is stored but its data does not start on a 16 KiB boundary.
    ElfNotAlignedInZip,
}

impl AlignmentProblem {
    /// Stable identifier for machine-readable output.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ElfLoadSectionsNot16kAligned => "elf-load-sections-not-16k-aligned",
            Self::ElfNotAlignedInZip => "elf-not-aligned-in-zip",
        }
    }
}

impl fmt::Display for AlignmentProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ElfLoadSectionsNot16kAligned => {
                f.write_str("LOAD segments are not 16 KB aligned")
            }
            Self::ElfNotAlignedInZip => f.write_str("stored ELF is not 16 KB aligned in the archive"),
        }
    }
}

/// Result of [`audit_archive`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditReport {
    /// Problems per entry. Compliant entries are absent.
    pub problems: BTreeMap<String, BTreeSet<AlignmentProblem>>,
    /// Entries examined.
    pub entries_scanned: usize,
    /// Entries recognised as 64-bit little-endian ELF images.
    pub elf_entries: usize,
}

impl AuditReport {
    /// Returns `true` when no entry has a problem.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.problems.is_empty()
    }
}

/// Audits every ELF entry of `archive` for 16 KB page compatibility.
///
/// Entries that are not ELF, not 64-bit little-endian, or too malformed to
/// parse are never reported. Neither are entries the reader cannot decode,
/// such as encrypted entries or unsupported compression methods.
///
/// # Errors
///
/// Returns an error only if the archive itself cannot be opened.
///
/// # Examples
///
/// ```no_run
/// use apkpack_core::audit_archive;
///
/// # fn main() -> Result<(), apkpack_core::PackError> {
/// let report = audit_archive("app-release.apk")?;
/// for (entry, problems) in &report.problems {
///     println!("{entry}: {problems:?}");
/// }
/// # Ok(())
/// # }
/// ```
pub fn audit_archive(archive: impl AsRef<Path>) -> Result<AuditReport> {
    let path = archive.as_ref();
    let mut zip = open_zip(path)?;
    let mut report = AuditReport::default();

    for index in 0..zip.len() {
        let mut entry = match zip.by_index(index) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!(index, error = %e, "entry not readable, skipped");
                continue;
            }
        };
        if entry.is_dir() {
            continue;
        }
        report.entries_scanned += 1;

        let name = entry.name().to_string();
        let stored = entry.compression() == CompressionMethod::Stored;
        let data_start = entry.data_start();
        let Some(min_align) = min_alignment_of(&mut entry) else {
            continue;
        };
        report.elf_entries += 1;

        let mut problems = BTreeSet::new();
        if let Some(align) = min_align
            && (align < AUDIT_PAGE_SIZE || align % AUDIT_PAGE_SIZE != 0)
        {
            problems.insert(AlignmentProblem::ElfLoadSectionsNot16kAligned);
        }
        if stored
            && let Some(start) = data_start
            && start % AUDIT_PAGE_SIZE != 0
        {
            problems.insert(AlignmentProblem::ElfNotAlignedInZip);
        }

        tracing::debug!(entry = %name, min_align = ?min_align, ?problems, "audited ELF entry");
        if !problems.is_empty() {
            report.problems.insert(name, problems);
        }
    }

    tracing::info!(
        archive = %path.display(),
        scanned = report.entries_scanned,
        elf = report.elf_entries,
        flagged = report.problems.len(),
        "audit finished"
    );
    Ok(report)
}

/// Reads an entry's ELF headers.
///
/// `None` means "not something to audit"; `Some(None)` is an ELF image
/// without PT_LOAD segments.
fn min_alignment_of<R: Read>(entry: &mut R) -> Option<Option<u64>> {
    let mut image = Vec::with_capacity(64);
    entry.by_ref().take(64).read_to_end(&mut image).ok()?;
    if !elf::is_elf(&image) {
        return None;
    }

    let table = elf::program_headers(&image)?;
    let end = table.end();
    if end > MAX_PROGRAM_HEADER_END {
        return None;
    }
    if end > image.len() {
        entry
            .by_ref()
            .take((end - image.len()) as u64)
            .read_to_end(&mut image)
            .ok()?;
    }
    let segments = elf::load_segments(&image)?;
    Some(segments.iter().map(|s| s.alignment).min())
}

/// A stored entry whose data is off its required boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MisalignedEntry {
    /// Entry name.
    pub name: String,
    /// Offset of the entry data in the archive.
    pub data_offset: u64,
    /// Boundary the data should start on.
    pub required: u64,
}

/// Result of [`check_alignment`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlignmentCheck {
    /// Stored entries examined.
    pub stored_entries: usize,
    /// Compressed entries, which carry no alignment requirement.
    pub compressed_entries: usize,
    /// Stored entries off their boundary, in archive order.
    pub misaligned: Vec<MisalignedEntry>,
}

impl AlignmentCheck {
    /// Returns `true` when every stored entry is aligned.
    #[must_use]
    pub fn is_aligned(&self) -> bool {
        self.misaligned.is_empty()
    }
}

/// Checks that stored entries start on their required boundary.
///
/// Entries matching `page_align` need `page_size`; other stored entries
/// need 4 bytes. Compressed and directory entries are not checked.
///
/// # Errors
///
/// Returns an error only if the archive cannot be opened or read.
pub fn check_alignment(
    archive: impl AsRef<Path>,
    page_align: &PathMatcher,
    page_size: PageSize,
) -> Result<AlignmentCheck> {
    let path = archive.as_ref();
    let mut zip = open_zip(path)?;
    let mut check = AlignmentCheck::default();

    for index in 0..zip.len() {
        let entry = zip.by_index_raw(index).map_err(|e| PackError::zip(path, e))?;
        if entry.is_dir() {
            continue;
        }
        if entry.compression() != CompressionMethod::Stored {
            check.compressed_entries += 1;
            continue;
        }
        check.stored_entries += 1;

        let required = if page_align.matches(entry.name()) {
            page_size.bytes()
        } else {
            DEFAULT_ALIGNMENT
        };
        let Some(data_offset) = entry.data_start() else {
            tracing::debug!(entry = entry.name(), "data offset unknown, skipped");
            continue;
        };
        if data_offset % required != 0 {
            tracing::debug!(entry = entry.name(), data_offset, required, "misaligned entry");
            check.misaligned.push(MisalignedEntry {
                name: entry.name().to_string(),
                data_offset,
                required,
            });
        }
    }
    Ok(check)
}

fn open_zip(path: &Path) -> Result<ZipArchive<BufReader<File>>> {
    let file = File::open(path).map_err(|e| PackError::io_at(path, e))?;
    ZipArchive::new(BufReader::new(file)).map_err(|e| PackError::zip(path, e))
}
