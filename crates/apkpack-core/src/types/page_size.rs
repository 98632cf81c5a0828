//! Target memory page size for page-aligned entries.

use crate::PackError;
use std::fmt;
use std::str::FromStr;

/// Page size that uncompressed native libraries are aligned to.
///
/// Devices with 16 KiB pages require 16 KiB alignment; 16 KiB alignment
/// also satisfies 4 KiB devices, so it is the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PageSize {
    /// 4096 bytes.
    Size4K,
    /// 16384 bytes.
    #[default]
    Size16K,
}

impl PageSize {
    /// Page size in bytes.
    ///
    /// # Examples
    ///
    /// ```
    /// use apkpack_core::types::PageSize;
    ///
    /// assert_eq!(PageSize::Size4K.bytes(), 4096);
    /// assert_eq!(PageSize::default().bytes(), 16384);
    /// ```
    #[inline]
    #[must_use]
    pub const fn bytes(self) -> u64 {
        match self {
            Self::Size4K => 4096,
            Self::Size16K => 16384,
        }
    }
}

impl fmt::Display for PageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Size4K => f.write_str("4k"),
            Self::Size16K => f.write_str("16k"),
        }
    }
}

impl FromStr for PageSize {
    type Err = PackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "4k" | "4096" => Ok(Self::Size4K),
            "16k" | "16384" => Ok(Self::Size16K),
            other => Err(PackError::InvalidConfig {
                reason: format!("unsupported page size '{other}' (expected 4k or 16k)"),
            }),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!("4k".parse::<PageSize>().unwrap(), PageSize::Size4K);
        assert_eq!("16K".parse::<PageSize>().unwrap(), PageSize::Size16K);
        assert_eq!("16384".parse::<PageSize>().unwrap(), PageSize::Size16K);
        assert!("8k".parse::<PageSize>().is_err());
    }

    #[test]
    fn test_display_roundtrips() {
        for size in [PageSize::Size4K, PageSize::Size16K] {
            assert_eq!(size.to_string().parse::<PageSize>().unwrap(), size);
        }
    }
}
