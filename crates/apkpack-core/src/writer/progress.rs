//! Progress reporting hooks for archive builds.

/// Receives progress events from a build session.
///
/// Staging events fire on worker threads, so implementations must be
/// `Send + Sync`. All methods default to no-ops.
///
/// # Examples
///
/// ```
/// use apkpack_core::writer::ProgressCallback;
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// #[derive(Default)]
/// struct Counter(AtomicUsize);
///
/// impl ProgressCallback for Counter {
///     fn on_entry_staged(&self, _name: &str, _size: u64, _stored: u64) {
///         self.0.fetch_add(1, Ordering::Relaxed);
///     }
/// }
/// ```
pub trait ProgressCallback: Send + Sync {
    /// An entry was handed to the writer.
    fn on_entry_submitted(&self, _name: &str) {}

    /// An entry's final bytes are ready.
    fn on_entry_staged(&self, _name: &str, _uncompressed: u64, _stored: u64) {}

    /// The archive is being serialized with `_entries` entries.
    fn on_finalize(&self, _entries: usize) {}
}

/// Progress callback that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl ProgressCallback for NoopProgress {}
