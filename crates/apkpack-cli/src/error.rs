//! Error conversion utilities for CLI.
//!
//! Converts apkpack-core's typed errors (thiserror) into user-friendly
//! contextual errors (anyhow) with actionable guidance.

use anyhow::anyhow;
use apkpack_core::PackError;
use std::path::Path;

/// Converts `PackError` to a user-friendly anyhow error with context.
pub fn convert_pack_error(err: PackError, archive: &Path) -> anyhow::Error {
    match err {
        PackError::InvalidPath { path, reason } => anyhow!(
            "Invalid entry name '{path}' for '{}': {reason}\n\
             HINT: Entry names are relative, use '/' separators and may not contain '..'.",
            archive.display()
        ),
        PackError::DuplicateEntry { path } => anyhow!(
            "Entry '{path}' was added to '{}' more than once\n\
             HINT: Use --exclude to drop the copy coming from a merged archive.",
            archive.display()
        ),
        PackError::EntryNotFound { path } => anyhow!(
            "Entry '{path}' not found while building '{}'",
            archive.display()
        ),
        PackError::ArchiveCreation { path, reason } => anyhow!(
            "Cannot create '{}': {reason}\n\
             HINT: Check that the output directory exists and is writable.",
            path.display()
        ),
        PackError::Zip64Required { path, what } => anyhow!(
            "Archive '{}' needs Zip64 ({what})\n\
             HINT: Use --allow-zip64 if the consumer supports it. Zip64 archives cannot be signed.",
            path.display()
        ),
        PackError::Signing { scheme, reason } => anyhow!(
            "Signing '{}' with {scheme} failed: {reason}\n\
             HINT: The key file must hold a PEM private key and its certificate.",
            archive.display()
        ),
        PackError::InvalidConfig { reason } => anyhow!(
            "Invalid configuration: {reason}\n\
             HINT: Run with --help to see accepted values."
        ),
        PackError::InvalidArchive { path, reason } => anyhow!(
            "Invalid archive '{}': {reason}\n\
             HINT: The archive may be corrupted or not a ZIP file.",
            path.display()
        ),
        PackError::CompressionTask {
            archive,
            entry,
            source,
        } => anyhow!(
            "Adding '{entry}' to '{}' failed: {}\n\
             HINT: No archive was written. Check that every --file source exists.",
            archive.display(),
            source
        ),
        PackError::IoAt { path, source } => {
            anyhow!("I/O error on '{}': {source}", path.display())
        }
        PackError::Io(io_err) => {
            anyhow!("I/O error while processing '{}': {io_err}", archive.display())
        }
        _ => anyhow::Error::from(err)
            .context(format!("Error processing archive '{}'", archive.display())),
    }
}

/// Adds context to a core result about the given archive.
pub fn add_archive_context<T>(
    result: Result<T, PackError>,
    archive: &Path,
) -> anyhow::Result<T> {
    result.map_err(|e| convert_pack_error(e, archive))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::path::PathBuf;

    #[test]
    fn test_convert_invalid_path() {
        let err = PackError::InvalidPath {
            path: "../evil.so".into(),
            reason: "parent directory traversal".into(),
        };
        let msg = format!("{:?}", convert_pack_error(err, Path::new("app.apk")));
        assert!(msg.contains("../evil.so"));
        assert!(msg.contains("app.apk"));
        assert!(msg.contains("HINT"));
    }

    #[test]
    fn test_convert_compression_task() {
        let err = PackError::CompressionTask {
            archive: PathBuf::from("out.apk"),
            entry: "classes.dex".into(),
            source: Box::new(PackError::Io(io::Error::new(io::ErrorKind::NotFound, "gone"))),
        };
        let msg = format!("{:?}", convert_pack_error(err, Path::new("out.apk")));
        assert!(msg.contains("classes.dex"));
        assert!(msg.contains("No archive was written"));
    }

    #[test]
    fn test_convert_zip64_required() {
        let err = PackError::Zip64Required {
            path: PathBuf::from("huge.apk"),
            what: "65536 entries".into(),
        };
        let msg = format!("{:?}", convert_pack_error(err, Path::new("huge.apk")));
        assert!(msg.contains("--allow-zip64"));
    }

    #[test]
    fn test_convert_io_error() {
        let err = PackError::Io(io::Error::new(io::ErrorKind::NotFound, "file not found"));
        let msg = format!("{:?}", convert_pack_error(err, Path::new("a.apk")));
        assert!(msg.contains("I/O error"));
    }
}
