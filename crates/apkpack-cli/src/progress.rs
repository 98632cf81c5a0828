//! Progress bar for `apkpack pack`.

use apkpack_core::writer::ProgressCallback;
use console::Term;
use indicatif::ProgressBar;
use indicatif::ProgressState;
use indicatif::ProgressStyle;
use std::fmt::Write;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

/// CLI progress bar wrapper implementing `ProgressCallback`.
///
/// The length grows as entries are submitted and the position advances as
/// workers finish them, so the bar works without knowing the entry count up
/// front. Staging events arrive on worker threads; `ProgressBar` is
/// internally synchronized.
pub struct CliProgress {
    bar: ProgressBar,
    bytes_in: Arc<AtomicU64>,
}

impl CliProgress {
    /// Creates a new CLI progress bar with the given leading message.
    #[must_use]
    pub fn new(message: &str) -> Self {
        let bytes_in = Arc::new(AtomicU64::new(0));
        let bar = ProgressBar::new(0);

        // Template: "Packing [████████░░░░] 42/100 entries (15.2 MB, 3s)"
        let counter = Arc::clone(&bytes_in);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{msg} [{bar:40.cyan/blue}] {pos}/{len} entries ({bytes}, {elapsed})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .with_key("bytes", move |_: &ProgressState, w: &mut dyn Write| {
                    write!(w, "{}", humanize_bytes(counter.load(Ordering::Relaxed))).unwrap_or(());
                })
                .with_key("elapsed", |state: &ProgressState, w: &mut dyn Write| {
                    write!(w, "{}", humanize_duration(state.elapsed())).unwrap_or(());
                })
                .progress_chars("█▓░"),
        );
        bar.set_message(message.to_string());

        Self { bar, bytes_in }
    }

    /// Checks if we should show progress (TTY detection).
    #[must_use]
    pub fn should_show() -> bool {
        Term::stdout().is_term()
    }

    /// Uncompressed bytes staged so far.
    #[must_use]
    pub fn bytes_in(&self) -> u64 {
        self.bytes_in.load(Ordering::Relaxed)
    }
}

impl Drop for CliProgress {
    fn drop(&mut self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressCallback for CliProgress {
    fn on_entry_submitted(&self, _name: &str) {
        self.bar.inc_length(1);
    }

    fn on_entry_staged(&self, _name: &str, uncompressed: u64, _stored: u64) {
        self.bytes_in.fetch_add(uncompressed, Ordering::Relaxed);
        self.bar.inc(1);
    }

    fn on_finalize(&self, entries: usize) {
        self.bar.set_message(format!("Writing {entries} entries"));
    }
}

/// Converts bytes to human-readable format (KB, MB, GB, TB).
fn humanize_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    const TB: u64 = GB * 1024;

    if bytes >= TB {
        format!("{:.1} TB", bytes as f64 / TB as f64)
    } else if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}

/// Converts duration to human-readable format.
fn humanize_duration(duration: std::time::Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 3600 {
        format!("{}h{}m", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{}m{}s", secs / 60, secs % 60)
    } else {
        format!("{secs}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_humanize_bytes() {
        assert_eq!(humanize_bytes(0), "0 B");
        assert_eq!(humanize_bytes(1536), "1.5 KB");
        assert_eq!(humanize_bytes(16 * 1024 * 1024), "16.0 MB");
        assert_eq!(humanize_bytes(1024_u64.pow(4)), "1.0 TB");
    }

    #[test]
    fn test_humanize_duration() {
        assert_eq!(humanize_duration(Duration::from_secs(0)), "0s");
        assert_eq!(humanize_duration(Duration::from_secs(90)), "1m30s");
        assert_eq!(humanize_duration(Duration::from_secs(3661)), "1h1m");
    }

    #[test]
    fn test_progress_callback_from_threads() {
        let progress = Arc::new(CliProgress::new("Packing"));
        for i in 0..8 {
            progress.on_entry_submitted(&format!("e{i}"));
        }
        std::thread::scope(|scope| {
            for _ in 0..4 {
                let progress = Arc::clone(&progress);
                scope.spawn(move || {
                    progress.on_entry_staged("e", 512, 100);
                    progress.on_entry_staged("e", 512, 100);
                });
            }
        });
        progress.on_finalize(8);

        assert_eq!(progress.bytes_in(), 4096);
        assert_eq!(progress.bar.position(), 8);
        assert_eq!(progress.bar.length(), Some(8));
    }
}
