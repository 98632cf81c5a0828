//! Summary of one archive build.

use crate::signing::SignatureScheme;
use std::path::PathBuf;
use std::time::Duration;

/// Statistics returned by a successful `close()`.
///
/// # Examples
///
/// ```
/// use apkpack_core::PackReport;
///
/// let mut report = PackReport::default();
/// report.bytes_in = 1000;
/// report.bytes_stored = 250;
/// assert!((report.compression_ratio() - 4.0).abs() < f64::EPSILON);
/// assert!((report.space_savings() - 75.0).abs() < f64::EPSILON);
/// ```
#[derive(Debug, Clone, Default)]
pub struct PackReport {
    /// Final archive path.
    pub archive: PathBuf,

    /// Entries added through `write_file`.
    pub entries_written: usize,

    /// Entries copied from other archives.
    pub entries_copied: usize,

    /// Successful deletes.
    pub entries_deleted: usize,

    /// Entries that ended up deflated.
    pub entries_compressed: usize,

    /// Entries placed on a page boundary.
    pub entries_page_aligned: usize,

    /// Uncompressed payload bytes.
    pub bytes_in: u64,

    /// Payload bytes as stored in the archive.
    pub bytes_stored: u64,

    /// Size of the finished archive file.
    pub archive_size: u64,

    /// Signature schemes applied.
    pub signed_schemes: Vec<SignatureScheme>,

    /// Companion `.idsig` file, if one was written.
    pub idsig: Option<PathBuf>,

    /// Wall-clock time from open to close.
    pub duration: Duration,
}

impl PackReport {
    /// Total entries in the archive.
    #[must_use]
    pub fn total_entries(&self) -> usize {
        self.entries_written + self.entries_copied
    }

    /// Ratio of uncompressed to stored payload bytes.
    ///
    /// Returns 1.0 for an empty archive.
    #[must_use]
    pub fn compression_ratio(&self) -> f64 {
        if self.bytes_stored == 0 {
            return 1.0;
        }
        self.bytes_in as f64 / self.bytes_stored as f64
    }

    /// Space saved by compression, as a percentage of input bytes.
    #[must_use]
    pub fn space_savings(&self) -> f64 {
        if self.bytes_in == 0 {
            return 0.0;
        }
        (1.0 - self.bytes_stored as f64 / self.bytes_in as f64) * 100.0
    }

    /// Returns `true` if any signature scheme was applied.
    #[must_use]
    pub fn is_signed(&self) -> bool {
        !self.signed_schemes.is_empty()
    }
}
