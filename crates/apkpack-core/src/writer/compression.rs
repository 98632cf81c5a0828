//! Deflate helpers and compression method bookkeeping.
//!
//! Entries are either stored or raw-deflated (ZIP method 8). Level 0 means
//! store; levels 1-9 map onto flate2 levels.

use crate::PackError;
use crate::Result;
use flate2::Compression;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use std::io::Read;
use std::io::Write;

const INFLATE_PREALLOC_LIMIT: usize = 64 * 1024 * 1024;

/// ZIP compression method of an entry in the destination archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// Method 0.
    Stored,
    /// Method 8, raw deflate.
    Deflated,
}

impl Method {
    /// ZIP method code.
    #[must_use]
    pub const fn code(self) -> u16 {
        match self {
            Self::Stored => 0,
            Self::Deflated => 8,
        }
    }

    /// Returns `true` for deflated entries.
    #[must_use]
    pub const fn is_compressed(self) -> bool {
        matches!(self, Self::Deflated)
    }
}

/// Compression level applied to an entry copied from another archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionOverride {
    /// Keep the source's compressed bytes as they are.
    ///
    /// A deflated source entry whose destination name matches the
    /// no-compress rule is still inflated and stored.
    #[default]
    NoChange,
    /// Recompress at this level (0 stores).
    Level(u8),
}

/// Converts a 1-9 level to a flate2 level, mirroring the usual scale.
#[must_use]
pub fn flate2_level(level: u8) -> Compression {
    match level {
        0 => Compression::none(),
        6 => Compression::default(),
        1 => Compression::fast(),
        9 => Compression::best(),
        n => Compression::new(u32::from(n.min(9))),
    }
}

/// Raw-deflates `data` at `level`.
pub fn deflate(data: &[u8], level: u8) -> Result<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::with_capacity(data.len() / 2), flate2_level(level));
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Inflates raw deflate `data`, expecting exactly `expected_size` bytes.
///
/// `expected_size` also caps the read so a corrupted size field cannot make
/// the decoder allocate without bound.
pub fn inflate(data: &[u8], expected_size: u64) -> Result<Vec<u8>> {
    let capacity = usize::try_from(expected_size).map_err(|_| {
        PackError::Io(std::io::Error::new(
            std::io::ErrorKind::OutOfMemory,
            format!("entry of {expected_size} bytes does not fit in memory"),
        ))
    })?;
    let mut out = Vec::with_capacity(capacity.min(INFLATE_PREALLOC_LIMIT));
    DeflateDecoder::new(data)
        .take(expected_size.saturating_add(1))
        .read_to_end(&mut out)?;
    if out.len() as u64 != expected_size {
        return Err(PackError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!(
                "inflated {} bytes, header declares {expected_size}",
                out.len()
            ),
        )));
    }
    Ok(out)
}

/// Compressed form of one payload.
#[derive(Debug, Clone)]
pub struct Payload {
    /// Method actually used.
    pub method: Method,
    /// Bytes as they appear in the archive.
    pub data: Vec<u8>,
    /// CRC-32 of the uncompressed bytes.
    pub crc32: u32,
    /// Uncompressed length.
    pub uncompressed_size: u64,
}

impl Payload {
    /// Stores `data` uncompressed.
    #[must_use]
    pub fn stored(data: Vec<u8>) -> Self {
        Self {
            method: Method::Stored,
            crc32: crc32fast::hash(&data),
            uncompressed_size: data.len() as u64,
            data,
        }
    }

    /// Compresses `data` at `level`, falling back to stored when deflate
    /// does not make it smaller.
    pub fn compress(data: Vec<u8>, level: u8) -> Result<Self> {
        if level == 0 {
            return Ok(Self::stored(data));
        }
        let deflated = deflate(&data, level)?;
        if deflated.len() >= data.len() {
            return Ok(Self::stored(data));
        }
        Ok(Self {
            method: Method::Deflated,
            crc32: crc32fast::hash(&data),
            uncompressed_size: data.len() as u64,
            data: deflated,
        })
    }

    /// Length of the bytes as stored in the archive.
    #[must_use]
    pub fn compressed_size(&self) -> u64 {
        self.data.len() as u64
    }
}
