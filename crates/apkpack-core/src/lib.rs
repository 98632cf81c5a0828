//! Concurrent, deterministic APK archive assembly.
//!
//! `apkpack-core` builds APK-style ZIP archives from freshly written files
//! and entries copied out of other archives. Payloads are deflated in
//! parallel on an injected worker pool, native libraries are placed on page
//! boundaries so they can be mapped directly, and the finished archive can
//! be signed with APK Signature Scheme v2/v3 (plus a v4 `.idsig`).
//!
//! A separate, read-only auditor checks finished archives for ELF
//! libraries that would not load on 16 KB page devices.
//!
//! # Examples
//!
//! ```no_run
//! use apkpack_core::writer::worker_pool;
//! use apkpack_core::{ArchiveWriter, PackConfig, PathMatcher, audit_archive};
//!
//! # fn main() -> Result<(), apkpack_core::PackError> {
//! let pool = worker_pool(0)?;
//! let config = PackConfig::default()
//!     .with_no_compress(PathMatcher::globs(["lib/*.so"]))
//!     .with_page_align(PathMatcher::globs(["lib/*.so"]));
//!
//! let mut writer = ArchiveWriter::open("app.apk", config, pool)?;
//! writer.write_file(std::path::PathBuf::from("build/classes.dex"), "classes.dex")?;
//! writer.write_file(std::path::PathBuf::from("build/libfoo.so"), "lib/arm64-v8a/libfoo.so")?;
//! let report = writer.close()?;
//! println!("packed {} entries", report.total_entries());
//!
//! assert!(audit_archive("app.apk")?.is_clean());
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod alignment;
pub mod audit;
pub mod config;
pub mod error;
pub mod io;
pub mod matcher;
pub mod signing;
pub mod test_utils;
pub mod types;
pub mod writer;

pub use audit::AlignmentCheck;
pub use audit::AlignmentProblem;
pub use audit::AuditReport;
pub use audit::audit_archive;
pub use audit::check_alignment;
pub use config::PackConfig;
pub use config::Zip64Mode;
pub use error::PackError;
pub use error::Result;
pub use matcher::PathMatcher;
pub use signing::SignatureScheme;
pub use signing::SignatureVerification;
pub use signing::SigningConfig;
pub use signing::verify_idsig;
pub use signing::verify_signing_block;
pub use types::EntryName;
pub use types::PageSize;
pub use writer::ArchiveWriter;
pub use writer::CompressionOverride;
pub use writer::EntrySource;
pub use writer::PackReport;
