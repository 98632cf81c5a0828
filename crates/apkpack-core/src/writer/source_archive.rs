//! Reading entries out of existing ZIP archives for copying.

use crate::PackError;
use crate::Result;
use crate::writer::compression::Method;
use crate::writer::staged::RawEntry;
use std::fs::File;
use std::io::BufReader;
use std::io::Read;
use std::path::Path;
use std::path::PathBuf;
use zip::CompressionMethod;
use zip::ZipArchive;

/// An open source archive.
pub(crate) struct SourceArchive {
    path: PathBuf,
    archive: ZipArchive<BufReader<File>>,
}

impl SourceArchive {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| PackError::io_at(path, e))?;
        let archive =
            ZipArchive::new(BufReader::new(file)).map_err(|e| PackError::zip(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            archive,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Indices and names of every non-directory entry, in archive order.
    pub fn file_entries(&mut self) -> Result<Vec<(usize, String)>> {
        let mut files = Vec::with_capacity(self.archive.len());
        for index in 0..self.archive.len() {
            let entry = self
                .archive
                .by_index_raw(index)
                .map_err(|e| PackError::zip(&self.path, e))?;
            if entry.is_dir() {
                tracing::trace!(entry = entry.name(), "skipping directory entry");
                continue;
            }
            files.push((index, entry.name().to_string()));
        }
        Ok(files)
    }

    /// Index of the entry named `name`.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.archive.index_for_name(name)
    }

    /// Reads the compressed bytes of entry `index`.
    pub fn read_raw(&mut self, index: usize) -> Result<RawEntry> {
        let mut entry = self
            .archive
            .by_index_raw(index)
            .map_err(|e| PackError::zip(&self.path, e))?;
        let name = entry.name().to_string();
        let invalid = |reason: String| PackError::InvalidArchive {
            path: self.path.clone(),
            reason: format!("entry '{name}': {reason}"),
        };

        if entry.encrypted() {
            return Err(invalid("encrypted entries cannot be copied".into()));
        }
        let method = match entry.compression() {
            CompressionMethod::Stored => Method::Stored,
            CompressionMethod::Deflated => Method::Deflated,
            other => return Err(invalid(format!("unsupported compression method {other:?}"))),
        };
        let crc32 = entry.crc32();
        let uncompressed_size = entry.size();
        let compressed_size = entry.compressed_size();

        let mut data = Vec::with_capacity(usize::try_from(compressed_size).unwrap_or(0).min(1 << 26));
        entry
            .read_to_end(&mut data)
            .map_err(|e| PackError::io_at(&self.path, e))?;
        if data.len() as u64 != compressed_size {
            return Err(invalid(format!(
                "read {} compressed bytes, header declares {compressed_size}",
                data.len()
            )));
        }

        Ok(RawEntry {
            source: self.path.clone(),
            source_name: name,
            method,
            data,
            crc32,
            uncompressed_size,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_utils::ZipBuilder;
    use tempfile::TempDir;

    #[test]
    fn test_file_entries_skip_directories() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("in.zip");
        ZipBuilder::new()
            .file("a.txt", b"a")
            .directory("dir/")
            .file("dir/b.txt", b"b")
            .write_to(&path);

        let mut source = SourceArchive::open(&path).unwrap();
        let names: Vec<_> = source
            .file_entries()
            .unwrap()
            .into_iter()
            .map(|(_, n)| n)
            .collect();
        assert_eq!(names, ["a.txt", "dir/b.txt"]);
        assert!(source.index_of("dir/b.txt").is_some());
        assert!(source.index_of("missing").is_none());
    }

    #[test]
    fn test_read_raw_deflated() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("in.zip");
        let content = b"compress me ".repeat(100);
        ZipBuilder::new()
            .deflated_file("c.txt", &content)
            .write_to(&path);

        let mut source = SourceArchive::open(&path).unwrap();
        let raw = source.read_raw(0).unwrap();
        assert_eq!(raw.method, Method::Deflated);
        assert_eq!(raw.uncompressed_size, content.len() as u64);
        assert_eq!(raw.crc32, crc32fast::hash(&content));
        assert!((raw.data.len()) < content.len());
    }

    #[test]
    fn test_open_garbage() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bad.zip");
        std::fs::write(&path, b"not a zip").unwrap();
        let err = SourceArchive::open(&path).err().unwrap();
        assert!(matches!(err, PackError::InvalidArchive { .. }));
    }

    #[test]
    fn test_open_missing() {
        let temp = TempDir::new().unwrap();
        let err = SourceArchive::open(&temp.path().join("missing.zip"))
            .err()
            .unwrap();
        assert!(matches!(err, PackError::IoAt { .. }));
    }
}
