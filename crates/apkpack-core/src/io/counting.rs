//! Writer that tracks its absolute output position.
//!
//! ZIP serialization needs the offset of every local header and of the
//! central directory; `CountingWriter` keeps that offset without requiring
//! `Seek` on the underlying sink.

use std::io::Write;

/// Wrapper writer that tracks total bytes written.
///
/// The counter only increments on successful writes, so after a failed
/// `write_all` the position reflects the bytes that actually reached the
/// sink.
///
/// # Examples
///
/// ```
/// use apkpack_core::io::CountingWriter;
/// use std::io::Write;
///
/// let mut writer = CountingWriter::new(Vec::new());
/// writer.write_all(b"PK\x03\x04")?;
/// assert_eq!(writer.position(), 4);
///
/// let buffer = writer.into_inner();
/// assert_eq!(buffer.len(), 4);
/// # Ok::<(), std::io::Error>(())
/// ```
pub struct CountingWriter<W> {
    inner: W,
    position: u64,
}

impl<W> CountingWriter<W> {
    /// Creates a counting writer starting at position 0.
    #[must_use]
    pub fn new(inner: W) -> Self {
        Self { inner, position: 0 }
    }

    /// Bytes written so far, i.e. the offset of the next byte.
    #[inline]
    #[must_use]
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Returns a reference to the inner writer.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Consumes the wrapper and returns the inner writer.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.position += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    /// Accepts at most `limit` bytes in total, then fails.
    struct ShortSink {
        data: Vec<u8>,
        limit: usize,
    }

    impl Write for ShortSink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            let room = self.limit - self.data.len();
            if room == 0 {
                return Err(std::io::Error::other("sink full"));
            }
            let n = room.min(buf.len());
            self.data.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_position_tracks_writes() {
        let mut writer = CountingWriter::new(Vec::new());
        writer.write_all(&[0u8; 30]).unwrap();
        writer.write_all(b"classes.dex").unwrap();
        assert_eq!(writer.position(), 41);
        assert_eq!(writer.get_ref().len(), 41);
    }

    #[test]
    fn test_empty_write() {
        let mut writer = CountingWriter::new(Vec::new());
        writer.write_all(b"").unwrap();
        assert_eq!(writer.position(), 0);
    }

    #[test]
    fn test_failed_write_counts_only_accepted_bytes() {
        let mut writer = CountingWriter::new(ShortSink {
            data: Vec::new(),
            limit: 10,
        });
        assert!(writer.write_all(&[1u8; 16]).is_err());
        assert_eq!(writer.position(), 10);
    }
}
