//! The concurrent archive writer.

use crate::PackError;
use crate::Result;
use crate::config::PackConfig;
use crate::io::CountingWriter;
use crate::signing;
use crate::types::EntryName;
use crate::writer::compression::CompressionOverride;
use crate::writer::layout;
use crate::writer::progress::NoopProgress;
use crate::writer::progress::ProgressCallback;
use crate::writer::report::PackReport;
use crate::writer::scheduler::CompressionScheduler;
use crate::writer::source::EntrySource;
use crate::writer::source_archive::SourceArchive;
use crate::writer::staged::EntryOrigin;
use crate::writer::staged::EntryPolicy;
use crate::writer::staged::StagedEntry;
use crate::writer::state::PendingGuard;
use crate::writer::state::SharedState;
use rayon::ThreadPool;
use std::collections::HashSet;
use std::io::BufWriter;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tempfile::NamedTempFile;

/// Renames applied to entries copied from a source archive.
pub type PathTransform<'a> = &'a dyn Fn(&str) -> String;

/// Predicate selecting source entries to leave out of a bulk copy.
pub type EntryFilter<'a> = &'a dyn Fn(&str) -> bool;

/// Builds one output archive from concurrent producers.
///
/// Structural changes (`write_file`, `delete_file`, the copy operations) are
/// made from one coordinating thread; payload compression runs on the
/// injected worker pool. `close` joins every outstanding task, lays out
/// the entries, signs if configured, and atomically moves the result to the
/// destination.
///
/// Dropping a writer without calling [`close`](Self::close) joins its tasks
/// and discards the output.
///
/// # Examples
///
/// ```no_run
/// use apkpack_core::{ArchiveWriter, PackConfig, PathMatcher};
/// use apkpack_core::writer::worker_pool;
///
/// # fn main() -> Result<(), apkpack_core::PackError> {
/// let pool = worker_pool(0)?;
/// let config = PackConfig::default()
///     .with_no_compress(PathMatcher::globs(["lib/*.so"]))
///     .with_page_align(PathMatcher::globs(["lib/*.so"]));
///
/// let mut writer = ArchiveWriter::open("app.apk", config, pool)?;
/// writer.write_file(b"dex\n035\0".to_vec(), "classes.dex")?;
/// writer.copy_entries_from_archive("resources.ap_", None, None)?;
/// let report = writer.close()?;
/// println!("{} entries", report.total_entries());
/// # Ok(())
/// # }
/// ```
pub struct ArchiveWriter {
    dest: PathBuf,
    config: PackConfig,
    policy: Arc<EntryPolicy>,
    state: Arc<SharedState>,
    scheduler: CompressionScheduler,
    output: Option<NamedTempFile>,
    progress: Arc<dyn ProgressCallback>,
    started: Instant,
}

impl ArchiveWriter {
    /// Starts a build session for `dest`.
    ///
    /// A temporary file is created next to `dest` right away, so an
    /// unwritable destination fails here rather than at close.
    ///
    /// # Errors
    ///
    /// - `PackError::InvalidConfig` for an invalid configuration, including
    ///   unusable signing settings
    /// - `PackError::ArchiveCreation` if `dest` is a directory or its parent
    ///   does not accept new files
    pub fn open(
        dest: impl AsRef<Path>,
        config: PackConfig,
        pool: Arc<ThreadPool>,
    ) -> Result<Self> {
        let dest = dest.as_ref().to_path_buf();
        config.validate()?;

        if dest.is_dir() {
            return Err(PackError::ArchiveCreation {
                path: dest,
                reason: "destination is a directory".into(),
            });
        }
        let parent = match dest.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let output = tempfile::Builder::new()
            .prefix(".apkpack-")
            .suffix(".tmp")
            .tempfile_in(&parent)
            .map_err(|e| PackError::ArchiveCreation {
                path: dest.clone(),
                reason: e.to_string(),
            })?;

        tracing::info!(
            archive = %dest.display(),
            deterministic = config.deterministic_order,
            level = config.compression_level,
            signed = config.signing.is_some(),
            "opened archive"
        );

        Ok(Self {
            scheduler: CompressionScheduler::new(pool, dest.clone()),
            policy: Arc::new(EntryPolicy::from_config(&config)),
            state: SharedState::new(),
            output: Some(output),
            progress: Arc::new(NoopProgress),
            started: Instant::now(),
            config,
            dest,
        })
    }

    /// Runs `body` against a fresh writer and always releases it.
    ///
    /// On success the writer is closed and the report returned with the
    /// body's value. If the body fails, outstanding tasks are joined, the
    /// output is discarded, and the body's error is returned.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use apkpack_core::{ArchiveWriter, PackConfig};
    /// use apkpack_core::writer::worker_pool;
    ///
    /// # fn main() -> Result<(), apkpack_core::PackError> {
    /// let (count, report) = ArchiveWriter::scoped(
    ///     "app.apk",
    ///     PackConfig::default(),
    ///     worker_pool(0)?,
    ///     |writer| {
    ///         writer.write_file(b"a".to_vec(), "a.txt")?;
    ///         Ok(1)
    ///     },
    /// )?;
    /// assert_eq!(count, report.total_entries());
    /// # Ok(())
    /// # }
    /// ```
    pub fn scoped<T, F>(
        dest: impl AsRef<Path>,
        config: PackConfig,
        pool: Arc<ThreadPool>,
        body: F,
    ) -> Result<(T, PackReport)>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        let mut writer = Self::open(dest, config, pool)?;
        match body(&mut writer) {
            Ok(value) => writer.close().map(|report| (value, report)),
            Err(error) => {
                writer.abandon();
                Err(error)
            }
        }
    }

    /// Installs a progress callback.
    pub fn set_progress(&mut self, progress: Arc<dyn ProgressCallback>) {
        self.progress = progress;
    }

    /// Destination path.
    #[must_use]
    pub fn destination(&self) -> &Path {
        &self.dest
    }

    /// Number of entries present or in flight.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.state.len()
    }

    /// Returns `true` once a bulk copy has made the session append-only.
    #[must_use]
    pub fn is_append_only(&self) -> bool {
        self.state.is_append_only()
    }

    /// Schedules `source` to be compressed and stored at `archive_path`.
    ///
    /// Returns once the work is queued; the entry lands asynchronously.
    /// Names matching the no-compress rule are stored uncompressed.
    ///
    /// # Errors
    ///
    /// - `PackError::InvalidPath` for an invalid or directory name
    /// - `PackError::DuplicateEntry` if the name is already taken and was
    ///   not deleted first
    ///
    /// Errors from reading or compressing the content surface at
    /// [`close`](Self::close).
    pub fn write_file(&mut self, source: impl Into<EntrySource>, archive_path: &str) -> Result<()> {
        let name = file_name(archive_path)?;
        self.state.reserve(&name)?;

        let guard = PendingGuard::new(Arc::clone(&self.state), name.clone());
        let policy = Arc::clone(&self.policy);
        let progress = Arc::clone(&self.progress);
        let source = source.into();
        let entry = name.to_string();
        progress.on_entry_submitted(&entry);
        tracing::debug!(entry = %entry, "scheduled write");

        self.scheduler.submit(entry, move || {
            let data = source.into_bytes()?;
            let staged = policy.stage_written(name, data)?;
            progress.on_entry_staged(
                staged.name.as_str(),
                staged.payload.uncompressed_size,
                staged.payload.compressed_size(),
            );
            guard.land(staged);
            Ok(())
        });
        Ok(())
    }

    /// Copies every file entry of `source` into the archive.
    ///
    /// Directory entries are skipped. `exclude` sees the source name;
    /// `transform` maps it to the destination name. Compression and
    /// alignment are re-derived per entry; compressed bytes are reused as
    /// they are unless the destination name must be stored.
    ///
    /// All destination names are validated before anything is added, so
    /// a bad name leaves the archive unchanged. After a successful
    /// validation the session becomes append-only and
    /// [`delete_file`](Self::delete_file) fails from then on.
    ///
    /// Returns the number of entries copied.
    ///
    /// # Errors
    ///
    /// - `PackError::InvalidPath` if a transformed name is invalid
    /// - `PackError::DuplicateEntry` if a destination name is taken
    /// - `PackError::InvalidArchive` or `PackError::IoAt` if the source
    ///   cannot be read
    pub fn copy_entries_from_archive(
        &mut self,
        source: impl AsRef<Path>,
        transform: Option<PathTransform<'_>>,
        exclude: Option<EntryFilter<'_>>,
    ) -> Result<usize> {
        let mut archive = SourceArchive::open(source.as_ref())?;

        let mut plan = Vec::new();
        let mut seen = HashSet::new();
        for (index, source_name) in archive.file_entries()? {
            if exclude.is_some_and(|skip| skip(&source_name)) {
                tracing::debug!(entry = %source_name, "excluded from copy");
                continue;
            }
            let target = transform.map_or_else(|| source_name.clone(), |f| f(&source_name));
            let name = EntryName::validate(&target)?;
            if name.is_dir() {
                continue;
            }
            if !seen.insert(name.clone()) {
                return Err(PackError::DuplicateEntry {
                    path: name.into_string(),
                });
            }
            plan.push((index, name));
        }
        self.state.ensure_free(plan.iter().map(|(_, name)| name))?;
        self.state.commit_append_only();

        for (index, name) in &plan {
            let raw = archive.read_raw(*index)?;
            let staged = self
                .policy
                .stage_copied(name.clone(), raw, CompressionOverride::NoChange)?;
            self.insert_copied(staged)?;
        }

        tracing::info!(
            source = %archive.path().display(),
            copied = plan.len(),
            "copied entries from archive"
        );
        Ok(plan.len())
    }

    /// Copies a single entry from `source`.
    ///
    /// Unlike [`copy_entries_from_archive`](Self::copy_entries_from_archive)
    /// this does not make the session append-only.
    ///
    /// # Errors
    ///
    /// - `PackError::EntryNotFound` if `source` has no entry `name`
    /// - `PackError::InvalidPath` if the destination name is invalid
    /// - `PackError::DuplicateEntry` if the destination name is taken
    pub fn select_entry(
        &mut self,
        source: impl AsRef<Path>,
        name: &str,
        new_name: Option<&str>,
        level: CompressionOverride,
    ) -> Result<()> {
        let target = file_name(new_name.unwrap_or(name))?;
        let mut archive = SourceArchive::open(source.as_ref())?;
        let index = archive.index_of(name).ok_or_else(|| PackError::EntryNotFound {
            path: name.to_string(),
        })?;
        self.state.ensure_free([&target])?;

        let raw = archive.read_raw(index)?;
        let staged = self.policy.stage_copied(target, raw, level)?;
        self.insert_copied(staged)
    }

    /// Removes an entry added earlier in this session.
    ///
    /// If a write to the same name is still compressing, waits for it to
    /// land first.
    ///
    /// # Errors
    ///
    /// - `PackError::IllegalState` after any bulk copy
    /// - `PackError::EntryNotFound` if no entry has that name
    pub fn delete_file(&mut self, archive_path: &str) -> Result<()> {
        let name = EntryName::validate(archive_path)?;
        self.state.delete(&name)?;
        tracing::debug!(entry = %name, "deleted entry");
        Ok(())
    }

    fn insert_copied(&self, staged: StagedEntry) -> Result<()> {
        self.progress.on_entry_submitted(staged.name.as_str());
        self.progress.on_entry_staged(
            staged.name.as_str(),
            staged.payload.uncompressed_size,
            staged.payload.compressed_size(),
        );
        self.state.insert(staged)
    }

    /// Finishes the archive.
    ///
    /// Joins every compression task, lays out the entries (sorted by name
    /// in deterministic mode, completion order otherwise), signs if
    /// configured, and renames the result over the destination. On any
    /// error nothing is left at the destination.
    ///
    /// # Errors
    ///
    /// - `PackError::CompressionTask` for the first failed write
    /// - `PackError::Zip64Required` if Zip64 is forbidden but needed
    /// - `PackError::Signing` if any scheme fails
    /// - I/O errors while writing the output
    pub fn close(mut self) -> Result<PackReport> {
        let outcome = self.finish();
        if outcome.is_err() {
            tracing::warn!(archive = %self.dest.display(), "archive build failed, output discarded");
        }
        self.output = None;
        outcome
    }

    /// Joins outstanding tasks and discards the output without writing it.
    pub fn abandon(mut self) {
        let _ = self.scheduler.join();
        self.output = None;
        tracing::info!(archive = %self.dest.display(), "archive build abandoned");
    }

    fn finish(&mut self) -> Result<PackReport> {
        self.scheduler.join()?;

        let drained = self.state.drain();
        let mut entries = drained.entries;
        if self.config.deterministic_order {
            entries.sort_by(|(_, a), (_, b)| a.name.cmp(&b.name));
        } else {
            entries.sort_by_key(|(arrival, _)| *arrival);
        }
        let entries: Vec<StagedEntry> = entries.into_iter().map(|(_, entry)| entry).collect();
        self.progress.on_finalize(entries.len());

        let mut output = self.output.take().ok_or_else(|| PackError::IllegalState {
            reason: "archive output already released".into(),
        })?;

        let layout = {
            let mut writer = CountingWriter::new(BufWriter::new(output.as_file_mut()));
            let layout = layout::write_archive(&mut writer, &entries, self.config.zip64, &self.dest)?;
            writer.flush()?;
            layout
        };

        let mut report = PackReport {
            archive: self.dest.clone(),
            entries_deleted: drained.deleted,
            ..PackReport::default()
        };
        for entry in &entries {
            match entry.origin {
                EntryOrigin::Written => report.entries_written += 1,
                EntryOrigin::Copied => report.entries_copied += 1,
            }
            if entry.payload.method.is_compressed() {
                report.entries_compressed += 1;
            }
            if entry.alignment.is_page() {
                report.entries_page_aligned += 1;
            }
            report.bytes_in += entry.payload.uncompressed_size;
            report.bytes_stored += entry.payload.compressed_size();
        }
        report.archive_size = layout.total_len();

        let mut idsig_output = None;
        if let Some(signing) = &self.config.signing {
            let signed = signing::sign_archive(output.as_file_mut(), &layout, signing)?;
            report.signed_schemes = signed.schemes;
            report.archive_size = output.as_file().metadata()?.len();
            if let Some(idsig) = signed.idsig {
                let path = signing.idsig_path(&self.dest);
                idsig_output = Some((write_sibling_temp(&path, &idsig)?, path));
            }
        }

        output.as_file().sync_all()?;

        // The idsig goes first so that a failure there leaves any previous
        // archive at the destination in place.
        if let Some((temp, path)) = idsig_output {
            temp.persist(&path).map_err(|e| PackError::io_at(&path, e.error))?;
            report.idsig = Some(path);
        }
        if let Err(e) = output.persist(&self.dest) {
            if let Some(idsig) = &report.idsig {
                let _ = std::fs::remove_file(idsig);
            }
            return Err(PackError::io_at(&self.dest, e.error));
        }

        report.duration = self.started.elapsed();
        tracing::info!(
            archive = %self.dest.display(),
            entries = entries.len(),
            size = report.archive_size,
            "closed archive"
        );
        Ok(report)
    }
}

impl Drop for ArchiveWriter {
    fn drop(&mut self) {
        if self.output.is_some() {
            let _ = self.scheduler.join();
            self.output = None;
            tracing::warn!(
                archive = %self.dest.display(),
                "archive writer dropped without close, output discarded"
            );
        }
    }
}

/// Validates a name for a file entry.
fn file_name(archive_path: &str) -> Result<EntryName> {
    let name = EntryName::validate(archive_path)?;
    if name.is_dir() {
        return Err(PackError::InvalidPath {
            path: archive_path.to_string(),
            reason: "directory entries cannot be written".into(),
        });
    }
    Ok(name)
}

fn write_sibling_temp(path: &Path, bytes: &[u8]) -> Result<NamedTempFile> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut temp = NamedTempFile::new_in(parent).map_err(|e| PackError::io_at(path, e))?;
    temp.write_all(bytes).map_err(|e| PackError::io_at(path, e))?;
    temp.as_file().sync_all().map_err(|e| PackError::io_at(path, e))?;
    Ok(temp)
}
