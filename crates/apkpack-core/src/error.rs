//! Error types for archive packaging operations.

use std::path::Path;
use std::path::PathBuf;
use thiserror::Error;
use zip::result::ZipError;

/// Result type alias using `PackError`.
pub type Result<T> = std::result::Result<T, PackError>;

/// Errors that can occur while assembling, signing or auditing an archive.
#[derive(Error, Debug)]
pub enum PackError {
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// I/O operation on a specific file failed.
    #[error("I/O error on {path}: {source}")]
    IoAt {
        /// The file being read or written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The destination archive could not be created.
    #[error("cannot create archive {path}: {reason}")]
    ArchiveCreation {
        /// Destination path.
        path: PathBuf,
        /// Why creation failed.
        reason: String,
    },

    /// An entry name is not acceptable inside an archive.
    #[error("invalid entry path '{path}': {reason}")]
    InvalidPath {
        /// The offending entry name.
        path: String,
        /// Why the name was rejected.
        reason: String,
    },

    /// No entry exists at the given path.
    #[error("entry not found: {path}")]
    EntryNotFound {
        /// The missing entry name.
        path: String,
    },

    /// An entry already exists at the given path and was not deleted first.
    #[error("entry already exists: {path} (delete it before writing it again)")]
    DuplicateEntry {
        /// The conflicting entry name.
        path: String,
    },

    /// The writer was used in a way its current state does not permit.
    #[error("illegal writer state: {reason}")]
    IllegalState {
        /// Description of the misuse.
        reason: String,
    },

    /// A source archive is corrupted or cannot be parsed.
    #[error("invalid archive {path}: {reason}")]
    InvalidArchive {
        /// Path of the source archive.
        path: PathBuf,
        /// Parser diagnostic.
        reason: String,
    },

    /// The archive needs Zip64 structures but Zip64 is forbidden.
    #[error("archive {path} requires Zip64 ({what}) but Zip64 is forbidden")]
    Zip64Required {
        /// Destination path.
        path: PathBuf,
        /// Which limit was exceeded.
        what: String,
    },

    /// A parallel compression task failed.
    #[error("compression of '{entry}' for {archive} failed: {source}")]
    CompressionTask {
        /// Destination archive.
        archive: PathBuf,
        /// Entry whose task failed.
        entry: String,
        /// The task's error.
        #[source]
        source: Box<PackError>,
    },

    /// A signature scheme failed; the archive was not produced.
    #[error("{scheme} signing failed: {reason}")]
    Signing {
        /// Scheme name, e.g. "v2".
        scheme: String,
        /// Failure description.
        reason: String,
    },

    /// Configuration is invalid.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the problem.
        reason: String,
    },
}

impl PackError {
    /// Returns `true` if this error is a structural misuse of the writer API.
    ///
    /// Misuse errors are programming errors: deleting after a bulk copy,
    /// deleting a missing entry, writing a path twice, or handing the writer
    /// a traversing entry name.
    ///
    /// # Examples
    ///
    /// ```
    /// use apkpack_core::PackError;
    ///
    /// let err = PackError::EntryNotFound {
    ///     path: "classes.dex".into(),
    /// };
    /// assert!(err.is_misuse());
    ///
    /// let err = PackError::InvalidConfig {
    ///     reason: "bad level".into(),
    /// };
    /// assert!(!err.is_misuse());
    /// ```
    #[must_use]
    pub const fn is_misuse(&self) -> bool {
        matches!(
            self,
            Self::InvalidPath { .. }
                | Self::EntryNotFound { .. }
                | Self::DuplicateEntry { .. }
                | Self::IllegalState { .. }
        )
    }

    /// Returns `true` if this error comes from invalid configuration.
    ///
    /// Configuration errors are raised by `open()` or `close()` and are never
    /// worth retrying with the same inputs.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfig { .. }
                | Self::ArchiveCreation { .. }
                | Self::Zip64Required { .. }
                | Self::Signing { .. }
        )
    }

    /// Returns the archive entry this error is about, if any.
    ///
    /// # Examples
    ///
    /// ```
    /// use apkpack_core::PackError;
    ///
    /// let err = PackError::DuplicateEntry {
    ///     path: "lib/arm64-v8a/libfoo.so".into(),
    /// };
    /// assert_eq!(err.entry_path(), Some("lib/arm64-v8a/libfoo.so"));
    /// ```
    #[must_use]
    pub fn entry_path(&self) -> Option<&str> {
        match self {
            Self::InvalidPath { path, .. }
            | Self::EntryNotFound { path }
            | Self::DuplicateEntry { path } => Some(path),
            Self::CompressionTask { entry, .. } => Some(entry),
            _ => None,
        }
    }

    /// Attaches a file path to a bare I/O error.
    pub(crate) fn io_at(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::IoAt {
            path: path.into(),
            source,
        }
    }

    /// Maps a `zip` crate error on `path` to an I/O or invalid-archive error.
    pub(crate) fn zip(path: &Path, error: ZipError) -> Self {
        match error {
            ZipError::Io(source) => Self::io_at(path, source),
            other => Self::InvalidArchive {
                path: path.to_path_buf(),
                reason: other.to_string(),
            },
        }
    }

    pub(crate) fn signing(scheme: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Signing {
            scheme: scheme.into(),
            reason: reason.into(),
        }
    }
}
