//! Archive writing.
//!
//! [`ArchiveWriter`] owns one build session. Freshly written entries are
//! compressed on a [`CompressionScheduler`] backed by a rayon pool; copied
//! entries are staged inline. At close the staged entries are laid out in
//! order, aligned, and optionally signed.

mod archive_writer;
pub mod compression;
pub(crate) mod layout;
pub mod progress;
pub mod report;
pub mod scheduler;
pub mod source;
pub(crate) mod source_archive;
pub mod staged;
pub(crate) mod state;

pub use archive_writer::ArchiveWriter;
pub use archive_writer::EntryFilter;
pub use archive_writer::PathTransform;
pub use compression::CompressionOverride;
pub use compression::Method;
pub use progress::NoopProgress;
pub use progress::ProgressCallback;
pub use report::PackReport;
pub use scheduler::CompressionScheduler;
pub use scheduler::worker_pool;
pub use source::EntrySource;
pub use staged::EntryOrigin;
pub use staged::StagedEntry;
