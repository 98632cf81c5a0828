//! Content handed to the writer for one entry.

use crate::PackError;
use crate::Result;
use std::path::PathBuf;

/// Where the bytes of a written entry come from.
///
/// Files are read on the worker thread that compresses them, so submitting a
/// file path does not block the caller on I/O.
///
/// # Examples
///
/// ```
/// use apkpack_core::writer::EntrySource;
/// use std::path::PathBuf;
///
/// let inline: EntrySource = b"dex\n035\0".to_vec().into();
/// let on_disk: EntrySource = PathBuf::from("build/classes.dex").into();
/// assert!(matches!(inline, EntrySource::Bytes(_)));
/// assert!(matches!(on_disk, EntrySource::File(_)));
/// ```
#[derive(Debug, Clone)]
pub enum EntrySource {
    /// In-memory bytes.
    Bytes(Vec<u8>),
    /// A file read when the entry is compressed.
    File(PathBuf),
}

impl EntrySource {
    /// Materializes the content.
    ///
    /// # Errors
    ///
    /// Returns `PackError::IoAt` naming the file if it cannot be read.
    pub fn into_bytes(self) -> Result<Vec<u8>> {
        match self {
            Self::Bytes(bytes) => Ok(bytes),
            Self::File(path) => std::fs::read(&path).map_err(|e| PackError::io_at(path, e)),
        }
    }

    /// Size hint in bytes, when known without I/O.
    #[must_use]
    pub fn len_hint(&self) -> Option<u64> {
        match self {
            Self::Bytes(bytes) => Some(bytes.len() as u64),
            Self::File(_) => None,
        }
    }
}

impl From<Vec<u8>> for EntrySource {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<&[u8]> for EntrySource {
    fn from(bytes: &[u8]) -> Self {
        Self::Bytes(bytes.to_vec())
    }
}

impl From<PathBuf> for EntrySource {
    fn from(path: PathBuf) -> Self {
        Self::File(path)
    }
}

impl From<&std::path::Path> for EntrySource {
    fn from(path: &std::path::Path) -> Self {
        Self::File(path.to_path_buf())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_bytes_source() {
        let source = EntrySource::from(&b"abc"[..]);
        assert_eq!(source.len_hint(), Some(3));
        assert_eq!(source.into_bytes().unwrap(), b"abc");
    }

    #[test]
    fn test_file_source() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("classes.dex");
        std::fs::write(&path, b"dex\n035\0").unwrap();

        let source = EntrySource::from(path.as_path());
        assert_eq!(source.len_hint(), None);
        assert_eq!(source.into_bytes().unwrap(), b"dex\n035\0");
    }

    #[test]
    fn test_missing_file_names_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("missing.so");
        let err = EntrySource::from(path.clone()).into_bytes().unwrap_err();
        match err {
            PackError::IoAt { path: p, .. } => assert_eq!(p, path),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
