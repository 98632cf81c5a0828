//! Configuration for archive assembly.

use crate::PackError;
use crate::Result;
use crate::matcher::PathMatcher;
use crate::signing::SigningConfig;
use crate::types::PageSize;

/// Highest deflate level accepted by [`PackConfig::with_compression_level`].
pub const MAX_COMPRESSION_LEVEL: u8 = 9;

/// Whether Zip64 structures may be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Zip64Mode {
    /// Any offset, size or count beyond the classic limits fails the build.
    #[default]
    Forbid,
    /// Zip64 records are written when a classic limit is exceeded.
    Allow,
}

/// Configuration for one archive build session.
///
/// # Examples
///
/// ```
/// use apkpack_core::{PackConfig, PathMatcher};
/// use apkpack_core::types::PageSize;
///
/// let config = PackConfig::default()
///     .with_compression_level(9)
///     .with_no_compress(PathMatcher::globs(["lib/*.so", "*.png"]))
///     .with_page_align(PathMatcher::native_libraries())
///     .with_page_size(PageSize::Size4K);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct PackConfig {
    /// Deflate level for written files (0 stores uncompressed).
    ///
    /// Default: `6`.
    pub compression_level: u8,

    /// Emit entries sorted by name instead of completion order.
    ///
    /// Default: `true`.
    pub deterministic_order: bool,

    /// Zip64 policy.
    ///
    /// Default: [`Zip64Mode::Forbid`].
    pub zip64: Zip64Mode,

    /// Names that are always stored uncompressed.
    ///
    /// Default: [`PathMatcher::Never`].
    pub no_compress: PathMatcher,

    /// Names that are page aligned when stored uncompressed.
    ///
    /// Default: `.so` suffix.
    pub page_align: PathMatcher,

    /// Page size for page-aligned entries.
    ///
    /// Default: [`PageSize::Size16K`].
    pub page_size: PageSize,

    /// Signing applied at close.
    ///
    /// Default: `None` (unsigned).
    pub signing: Option<SigningConfig>,
}

impl Default for PackConfig {
    fn default() -> Self {
        Self {
            compression_level: 6,
            deterministic_order: true,
            zip64: Zip64Mode::Forbid,
            no_compress: PathMatcher::Never,
            page_align: PathMatcher::native_libraries(),
            page_size: PageSize::Size16K,
            signing: None,
        }
    }
}

impl PackConfig {
    /// Creates a new `PackConfig` with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the deflate level.
    #[must_use]
    pub fn with_compression_level(mut self, level: u8) -> Self {
        self.compression_level = level;
        self
    }

    /// Sets whether output order is stabilized by name.
    #[must_use]
    pub fn with_deterministic_order(mut self, deterministic: bool) -> Self {
        self.deterministic_order = deterministic;
        self
    }

    /// Sets the Zip64 policy.
    #[must_use]
    pub fn with_zip64(mut self, mode: Zip64Mode) -> Self {
        self.zip64 = mode;
        self
    }

    /// Sets the no-compress predicate.
    #[must_use]
    pub fn with_no_compress(mut self, matcher: PathMatcher) -> Self {
        self.no_compress = matcher;
        self
    }

    /// Sets the page-align predicate.
    #[must_use]
    pub fn with_page_align(mut self, matcher: PathMatcher) -> Self {
        self.page_align = matcher;
        self
    }

    /// Sets the page size.
    #[must_use]
    pub fn with_page_size(mut self, page_size: PageSize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Sets the signing configuration.
    #[must_use]
    pub fn with_signing(mut self, signing: Option<SigningConfig>) -> Self {
        self.signing = signing;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `PackError::InvalidConfig` if the compression level exceeds 9
    /// or the signing configuration is unusable.
    pub fn validate(&self) -> Result<()> {
        if self.compression_level > MAX_COMPRESSION_LEVEL {
            return Err(PackError::InvalidConfig {
                reason: format!(
                    "compression level {} is out of range 0-{MAX_COMPRESSION_LEVEL}",
                    self.compression_level
                ),
            });
        }
        if let Some(signing) = &self.signing {
            signing.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PackConfig::default();
        assert_eq!(config.compression_level, 6);
        assert!(config.deterministic_order);
        assert_eq!(config.zip64, Zip64Mode::Forbid);
        assert_eq!(config.page_size, PageSize::Size16K);
        assert!(config.page_align.matches("lib/x86/libfoo.so"));
        assert!(!config.no_compress.matches("lib/x86/libfoo.so"));
        assert!(config.signing.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_chain() {
        let config = PackConfig::new()
            .with_compression_level(0)
            .with_deterministic_order(false)
            .with_zip64(Zip64Mode::Allow)
            .with_page_size(PageSize::Size4K)
            .with_no_compress(PathMatcher::Always);

        assert_eq!(config.compression_level, 0);
        assert!(!config.deterministic_order);
        assert_eq!(config.zip64, Zip64Mode::Allow);
        assert_eq!(config.page_size, PageSize::Size4K);
        assert!(config.no_compress.matches("x"));
    }

    #[test]
    fn test_validate_level_out_of_range() {
        let config = PackConfig::default().with_compression_level(10);
        let err = config.validate().unwrap_err();
        assert!(matches!(err, PackError::InvalidConfig { .. }));
        assert!(err.to_string().contains("10"));
    }
}
