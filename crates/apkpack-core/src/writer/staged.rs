//! Entries that are fully prepared for serialization.
//!
//! A staged entry carries its final bytes, compression method and alignment.
//! Compression state and alignment are decided here, at insertion time, by
//! [`EntryPolicy`].

use crate::PackError;
use crate::Result;
use crate::alignment::Alignment;
use crate::alignment::compute_alignment;
use crate::config::PackConfig;
use crate::matcher::PathMatcher;
use crate::types::EntryName;
use crate::types::PageSize;
use crate::writer::compression::CompressionOverride;
use crate::writer::compression::Method;
use crate::writer::compression::Payload;
use crate::writer::compression::inflate;
use std::path::PathBuf;

/// How an entry entered the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryOrigin {
    /// Submitted through `write_file`.
    Written,
    /// Copied from another archive.
    Copied,
}

/// An entry ready to be laid out.
#[derive(Debug, Clone)]
pub struct StagedEntry {
    /// Destination name.
    pub name: EntryName,
    /// Final bytes and method.
    pub payload: Payload,
    /// Required payload alignment.
    pub alignment: Alignment,
    /// Provenance, for reporting.
    pub origin: EntryOrigin,
}

/// Compressed bytes of an entry read from a source archive.
#[derive(Debug)]
pub(crate) struct RawEntry {
    pub source: PathBuf,
    pub source_name: String,
    pub method: Method,
    pub data: Vec<u8>,
    pub crc32: u32,
    pub uncompressed_size: u64,
}

impl RawEntry {
    /// Returns the uncompressed content, verifying its CRC.
    fn into_plain(self) -> Result<Vec<u8>> {
        let Self {
            source,
            source_name,
            method,
            data,
            crc32,
            uncompressed_size,
        } = self;
        let corrupt = |reason: String| PackError::InvalidArchive {
            path: source.clone(),
            reason: format!("entry '{source_name}': {reason}"),
        };

        let plain = match method {
            Method::Stored => data,
            Method::Deflated => {
                inflate(&data, uncompressed_size).map_err(|e| corrupt(e.to_string()))?
            }
        };
        let actual = crc32fast::hash(&plain);
        if actual != crc32 {
            return Err(corrupt(format!(
                "CRC mismatch (header {crc32:08x}, data {actual:08x})"
            )));
        }
        Ok(plain)
    }
}

/// Per-session rules turning content into staged entries.
#[derive(Debug, Clone)]
pub(crate) struct EntryPolicy {
    level: u8,
    no_compress: PathMatcher,
    page_align: PathMatcher,
    page_size: PageSize,
}

impl EntryPolicy {
    pub fn from_config(config: &PackConfig) -> Self {
        Self {
            level: config.compression_level,
            no_compress: config.no_compress.clone(),
            page_align: config.page_align.clone(),
            page_size: config.page_size,
        }
    }

    /// Compresses freshly written content.
    pub fn stage_written(&self, name: EntryName, data: Vec<u8>) -> Result<StagedEntry> {
        let payload = if self.no_compress.matches(name.as_str()) {
            Payload::stored(data)
        } else {
            Payload::compress(data, self.level)?
        };
        Ok(self.finish(name, payload, EntryOrigin::Written))
    }

    /// Re-derives compression and alignment for a copied entry.
    pub fn stage_copied(
        &self,
        name: EntryName,
        raw: RawEntry,
        level: CompressionOverride,
    ) -> Result<StagedEntry> {
        let store = self.no_compress.matches(name.as_str());
        let payload = match (level, raw.method) {
            (CompressionOverride::NoChange, Method::Deflated) if !store => Payload {
                method: Method::Deflated,
                crc32: raw.crc32,
                uncompressed_size: raw.uncompressed_size,
                data: raw.data,
            },
            (CompressionOverride::NoChange, _) => Payload::stored(raw.into_plain()?),
            (CompressionOverride::Level(_), _) if store => Payload::stored(raw.into_plain()?),
            (CompressionOverride::Level(level), _) => Payload::compress(raw.into_plain()?, level)?,
        };
        Ok(self.finish(name, payload, EntryOrigin::Copied))
    }

    fn finish(&self, name: EntryName, payload: Payload, origin: EntryOrigin) -> StagedEntry {
        let alignment = compute_alignment(
            payload.method.is_compressed(),
            self.page_align.matches(name.as_str()),
            self.page_size,
        );
        tracing::debug!(
            entry = %name,
            method = ?payload.method,
            size = payload.uncompressed_size,
            stored = payload.compressed_size(),
            alignment = alignment.bytes(),
            "staged entry"
        );
        StagedEntry {
            name,
            payload,
            alignment,
            origin,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::writer::compression::deflate;

    fn policy(no_compress: PathMatcher) -> EntryPolicy {
        EntryPolicy::from_config(&PackConfig::default().with_no_compress(no_compress))
    }

    fn name(s: &str) -> EntryName {
        EntryName::validate(s).unwrap()
    }

    fn raw_deflated(content: &[u8]) -> RawEntry {
        RawEntry {
            source: PathBuf::from("in.zip"),
            source_name: "x".into(),
            method: Method::Deflated,
            data: deflate(content, 6).unwrap(),
            crc32: crc32fast::hash(content),
            uncompressed_size: content.len() as u64,
        }
    }

    #[test]
    fn test_written_compressible_is_deflated_unaligned() {
        let staged = policy(PathMatcher::Never)
            .stage_written(name("classes.dex"), vec![7u8; 10_000])
            .unwrap();
        assert_eq!(staged.payload.method, Method::Deflated);
        assert_eq!(staged.alignment, Alignment::None);
        assert_eq!(staged.origin, EntryOrigin::Written);
    }

    #[test]
    fn test_written_native_lib_is_page_aligned() {
        let staged = policy(PathMatcher::globs(["lib/*.so"]))
            .stage_written(name("lib/x86/libfoo.so"), vec![7u8; 10_000])
            .unwrap();
        assert_eq!(staged.payload.method, Method::Stored);
        assert_eq!(staged.alignment, Alignment::Page(PageSize::Size16K));
    }

    #[test]
    fn test_incompressible_gets_default_alignment() {
        let staged = policy(PathMatcher::Never)
            .stage_written(name("res/raw/x.bin"), vec![1u8])
            .unwrap();
        assert_eq!(staged.payload.method, Method::Stored);
        assert_eq!(staged.alignment, Alignment::Default);
    }

    #[test]
    fn test_copy_no_change_keeps_raw_bytes() {
        let content = b"hello hello hello hello".repeat(20);
        let raw = raw_deflated(&content);
        let raw_bytes = raw.data.clone();
        let staged = policy(PathMatcher::Never)
            .stage_copied(name("a.txt"), raw, CompressionOverride::NoChange)
            .unwrap();
        assert_eq!(staged.payload.method, Method::Deflated);
        assert_eq!(staged.payload.data, raw_bytes);
        assert_eq!(staged.origin, EntryOrigin::Copied);
    }

    #[test]
    fn test_copy_no_change_respects_no_compress() {
        let content = vec![0u8; 5000];
        let staged = policy(PathMatcher::suffixes([".so"]))
            .stage_copied(
                name("lib/arm64/libbar.so"),
                raw_deflated(&content),
                CompressionOverride::NoChange,
            )
            .unwrap();
        assert_eq!(staged.payload.method, Method::Stored);
        assert_eq!(staged.payload.data, content);
        assert!(staged.alignment.is_page());
    }

    #[test]
    fn test_copy_level_zero_stores() {
        let content = vec![3u8; 5000];
        let staged = policy(PathMatcher::Never)
            .stage_copied(name("a.bin"), raw_deflated(&content), CompressionOverride::Level(0))
            .unwrap();
        assert_eq!(staged.payload.method, Method::Stored);
        assert_eq!(staged.alignment, Alignment::Default);
    }

    #[test]
    fn test_copy_recompresses_stored() {
        let content = vec![3u8; 5000];
        let raw = RawEntry {
            source: PathBuf::from("in.zip"),
            source_name: "a.bin".into(),
            method: Method::Stored,
            crc32: crc32fast::hash(&content),
            uncompressed_size: content.len() as u64,
            data: content,
        };
        let staged = policy(PathMatcher::Never)
            .stage_copied(name("a.bin"), raw, CompressionOverride::Level(9))
            .unwrap();
        assert_eq!(staged.payload.method, Method::Deflated);
    }

    #[test]
    fn test_copy_crc_mismatch_is_invalid_archive() {
        let mut raw = raw_deflated(&[5u8; 100]);
        raw.crc32 ^= 1;
        let err = policy(PathMatcher::Never)
            .stage_copied(name("a.bin"), raw, CompressionOverride::Level(0))
            .unwrap_err();
        assert!(matches!(err, PackError::InvalidArchive { .. }));
        assert!(err.to_string().contains("CRC mismatch"));
    }
}
