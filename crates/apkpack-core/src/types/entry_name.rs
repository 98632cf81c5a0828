//! Validated archive entry name.

use crate::PackError;
use crate::Result;
use std::fmt;

/// Longest entry name representable in a ZIP header.
pub const MAX_ENTRY_NAME_LEN: usize = u16::MAX as usize;

/// An archive-relative entry name that has passed validation.
///
/// `EntryName` represents a name that does not contain:
/// - Parent directory components (`..`) or the sequence `../` anywhere
/// - A leading `/` (absolute names)
/// - Null bytes or backslashes
/// - Empty components (`a//b`)
///
/// # Security Properties
///
/// - Can ONLY be constructed through [`EntryName::validate`]
/// - NO `From<String>` implementation
///
/// # Examples
///
/// ```
/// use apkpack_core::types::EntryName;
///
/// let name = EntryName::validate("lib/arm64-v8a/libfoo.so")?;
/// assert_eq!(name.as_str(), "lib/arm64-v8a/libfoo.so");
///
/// assert!(EntryName::validate("../escape.so").is_err());
/// assert!(EntryName::validate("/abs/path").is_err());
/// # Ok::<(), apkpack_core::PackError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryName(String);

impl EntryName {
    /// Validates and constructs an `EntryName`.
    ///
    /// # Errors
    ///
    /// Returns `PackError::InvalidPath` naming the offending string when
    /// any check fails.
    pub fn validate(name: &str) -> Result<Self> {
        let reject = |reason: &str| PackError::InvalidPath {
            path: name.to_string(),
            reason: reason.to_string(),
        };

        if name.is_empty() {
            return Err(reject("empty name"));
        }
        if name.len() > MAX_ENTRY_NAME_LEN {
            return Err(reject("name longer than 65535 bytes"));
        }
        if name.contains('\0') {
            return Err(reject("name contains null bytes"));
        }
        if name.contains('\\') {
            return Err(reject("name contains a backslash"));
        }
        if name.starts_with('/') {
            return Err(reject("absolute name"));
        }
        if name.contains("../") {
            return Err(reject("parent directory traversal"));
        }

        // A trailing '/' marks a directory; every other component must be
        // non-empty and may not climb out of the archive root.
        let trimmed = name.strip_suffix('/').unwrap_or(name);
        for component in trimmed.split('/') {
            match component {
                ".." => return Err(reject("parent directory traversal")),
                "" => return Err(reject("empty path component")),
                _ => {}
            }
        }

        Ok(Self(name.to_string()))
    }

    /// Returns the name as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the name denotes a directory entry.
    #[inline]
    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.0.ends_with('/')
    }

    /// Consumes the name and returns the inner string.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl AsRef<str> for EntryName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
