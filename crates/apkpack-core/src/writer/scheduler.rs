//! Parallel compression scheduler.
//!
//! Tasks run on an injected rayon pool and report back over a crossbeam
//! channel. The scheduler bounds the number of tasks in flight and, on
//! [`join`](CompressionScheduler::join), waits for every one of them before
//! reporting the failed task with the lowest submission index.

use crate::PackError;
use crate::Result;
use crossbeam_channel::Receiver;
use crossbeam_channel::Sender;
use rayon::ThreadPool;
use rayon::ThreadPoolBuilder;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;

/// In-flight tasks allowed per pool thread before `submit` waits.
const TASKS_PER_THREAD: usize = 4;

/// Builds a worker pool for compression tasks.
///
/// `threads == 0` lets rayon pick (one thread per CPU).
///
/// # Errors
///
/// Returns `PackError::InvalidConfig` if the pool cannot be built.
///
/// # Examples
///
/// ```
/// use apkpack_core::writer::worker_pool;
///
/// let pool = worker_pool(2)?;
/// assert_eq!(pool.current_num_threads(), 2);
/// # Ok::<(), apkpack_core::PackError>(())
/// ```
pub fn worker_pool(threads: usize) -> Result<Arc<ThreadPool>> {
    ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("apkpack-deflate-{i}"))
        .build()
        .map(Arc::new)
        .map_err(|e| PackError::InvalidConfig {
            reason: format!("cannot build worker pool: {e}"),
        })
}

struct TaskOutcome {
    index: u64,
    entry: String,
    result: Result<()>,
}

struct TaskFailure {
    index: u64,
    entry: String,
    error: PackError,
}

/// Dispatches per-entry compression work to a shared pool.
pub struct CompressionScheduler {
    pool: Arc<ThreadPool>,
    archive: PathBuf,
    tx: Sender<TaskOutcome>,
    rx: Receiver<TaskOutcome>,
    next_index: u64,
    outstanding: usize,
    max_outstanding: usize,
    first_failure: Option<TaskFailure>,
}

impl CompressionScheduler {
    /// Creates a scheduler for tasks building `archive`.
    #[must_use]
    pub fn new(pool: Arc<ThreadPool>, archive: impl Into<PathBuf>) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        let max_outstanding = pool.current_num_threads().max(1) * TASKS_PER_THREAD;
        Self {
            pool,
            archive: archive.into(),
            tx,
            rx,
            next_index: 0,
            outstanding: 0,
            max_outstanding,
            first_failure: None,
        }
    }

    /// Number of submitted tasks not yet collected.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    /// Returns `true` if a task has already failed.
    ///
    /// Only failures collected so far are visible; `join` sees all of them.
    #[must_use]
    pub fn has_failed(&self) -> bool {
        self.first_failure.is_some()
    }

    /// Schedules `task` for `entry`.
    ///
    /// Returns once the task is queued. When the in-flight bound is reached
    /// this waits for one task to finish first. Must not be called from a
    /// thread of the scheduler's own pool.
    pub fn submit<F>(&mut self, entry: impl Into<String>, task: F)
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        while self.outstanding >= self.max_outstanding {
            if !self.collect_one() {
                break;
            }
        }

        let index = self.next_index;
        self.next_index += 1;
        self.outstanding += 1;

        let entry = entry.into();
        let tx = self.tx.clone();
        self.pool.spawn(move || {
            let result = std::panic::catch_unwind(AssertUnwindSafe(task))
                .unwrap_or_else(|panic| Err(panic_error(&*panic)));
            // The receiver lives as long as the scheduler, which joins
            // before it is dropped.
            let _ = tx.send(TaskOutcome {
                index,
                entry,
                result,
            });
        });
    }

    /// Waits for every outstanding task.
    ///
    /// # Errors
    ///
    /// Returns `PackError::CompressionTask` wrapping the failure with the
    /// lowest submission index, after all tasks have finished.
    pub fn join(&mut self) -> Result<()> {
        while self.outstanding > 0 {
            if !self.collect_one() {
                break;
            }
        }
        match self.first_failure.take() {
            None => Ok(()),
            Some(failure) => {
                tracing::debug!(
                    index = failure.index,
                    entry = %failure.entry,
                    "compression task failed"
                );
                Err(PackError::CompressionTask {
                    archive: self.archive.clone(),
                    entry: failure.entry,
                    source: Box::new(failure.error),
                })
            }
        }
    }

    /// Blocks for one outcome. Returns `false` if the channel is closed.
    fn collect_one(&mut self) -> bool {
        let Ok(outcome) = self.rx.recv() else {
            return false;
        };
        self.outstanding -= 1;
        if let Err(error) = outcome.result {
            let lower = self
                .first_failure
                .as_ref()
                .is_none_or(|current| outcome.index < current.index);
            if lower {
                self.first_failure = Some(TaskFailure {
                    index: outcome.index,
                    entry: outcome.entry,
                    error,
                });
            }
        }
        true
    }
}

impl Drop for CompressionScheduler {
    fn drop(&mut self) {
        // Tasks borrow nothing from the scheduler, but waiting keeps the
        // "no task outlives its session" rule even on early returns.
        while self.outstanding > 0 && self.collect_one() {}
    }
}

fn panic_error(panic: &(dyn std::any::Any + Send)) -> PackError {
    let message = panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());
    PackError::IllegalState {
        reason: format!("compression task panicked: {message}"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn pool() -> Arc<ThreadPool> {
        worker_pool(4).unwrap()
    }

    #[test]
    fn test_join_waits_for_all() {
        let done = Arc::new(AtomicUsize::new(0));
        let mut scheduler = CompressionScheduler::new(pool(), "out.apk");

        for i in 0..100u64 {
            let done = Arc::clone(&done);
            scheduler.submit(format!("e{i}"), move || {
                std::thread::sleep(Duration::from_millis(i % 7));
                done.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }

        scheduler.join().unwrap();
        assert_eq!(done.load(Ordering::SeqCst), 100);
        assert_eq!(scheduler.outstanding(), 0);
    }

    #[test]
    fn test_lowest_index_failure_reported() {
        let done = Arc::new(AtomicUsize::new(0));
        let mut scheduler = CompressionScheduler::new(pool(), "out.apk");

        for i in 0..20u64 {
            let done = Arc::clone(&done);
            scheduler.submit(format!("entry-{i}"), move || {
                // Later failures finish first.
                std::thread::sleep(Duration::from_millis(40 - 2 * i));
                done.fetch_add(1, Ordering::SeqCst);
                if i == 5 || i == 15 {
                    Err(PackError::InvalidConfig {
                        reason: format!("boom {i}"),
                    })
                } else {
                    Ok(())
                }
            });
        }

        let err = scheduler.join().unwrap_err();
        assert_eq!(done.load(Ordering::SeqCst), 20);
        match err {
            PackError::CompressionTask {
                archive,
                entry,
                source,
            } => {
                assert_eq!(archive, PathBuf::from("out.apk"));
                assert_eq!(entry, "entry-5");
                assert!(source.to_string().contains("boom 5"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_panicking_task_becomes_error() {
        let mut scheduler = CompressionScheduler::new(pool(), "out.apk");
        scheduler.submit("bad.so", || panic!("deflate exploded"));
        scheduler.submit("good.so", || Ok(()));

        let err = scheduler.join().unwrap_err();
        assert_eq!(err.entry_path(), Some("bad.so"));
        assert!(err.to_string().contains("deflate exploded"));
    }

    #[test]
    fn test_formatted_panic_message_kept() {
        let mut scheduler = CompressionScheduler::new(pool(), "out.apk");
        let level = 11;
        scheduler.submit("lib.so", move || panic!("bad level {level}"));

        let err = scheduler.join().unwrap_err();
        assert!(err.to_string().contains("bad level 11"), "{err}");
    }

    #[test]
    fn test_panic_error_reads_boxed_payload() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("static message");
        assert!(panic_error(&*payload).to_string().contains("static message"));
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("owned message"));
        assert!(panic_error(&*payload).to_string().contains("owned message"));
        let payload: Box<dyn std::any::Any + Send> = Box::new(7_u8);
        assert!(panic_error(&*payload).to_string().contains("unknown panic payload"));
    }

    #[test]
    fn test_bounded_in_flight() {
        let pool = worker_pool(1).unwrap();
        let mut scheduler = CompressionScheduler::new(pool, "out.apk");
        for i in 0..50 {
            scheduler.submit(format!("e{i}"), || Ok(()));
            assert!(scheduler.outstanding() <= TASKS_PER_THREAD);
        }
        scheduler.join().unwrap();
    }

    #[test]
    fn test_join_without_tasks() {
        let mut scheduler = CompressionScheduler::new(pool(), "out.apk");
        scheduler.join().unwrap();
        assert!(!scheduler.has_failed());
    }
}
