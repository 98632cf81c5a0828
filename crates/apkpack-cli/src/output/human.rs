//! Human-readable output formatter with colors and styling.

use super::formatter::OutputFormatter;
use anyhow::Result;
use apkpack_core::AlignmentCheck;
use apkpack_core::AuditReport;
use apkpack_core::PackReport;
use apkpack_core::SignatureVerification;
use console::Term;
use console::style;
use std::path::Path;

pub struct HumanFormatter {
    verbose: bool,
    quiet: bool,
    use_colors: bool,
    term: Term,
}

impl HumanFormatter {
    pub fn new(verbose: bool, quiet: bool) -> Self {
        Self {
            verbose,
            quiet,
            use_colors: console::colors_enabled(),
            term: Term::stdout(),
        }
    }

    fn format_size(bytes: u64) -> String {
        const KB: u64 = 1024;
        const MB: u64 = KB * 1024;
        const GB: u64 = MB * 1024;

        if bytes >= GB {
            format!("{:.1} GB", bytes as f64 / GB as f64)
        } else if bytes >= MB {
            format!("{:.1} MB", bytes as f64 / MB as f64)
        } else if bytes >= KB {
            format!("{:.1} KB", bytes as f64 / KB as f64)
        } else {
            format!("{bytes} B")
        }
    }

    fn format_number(n: usize) -> String {
        let digits = n.to_string();
        let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
        for (i, c) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                grouped.push(',');
            }
            grouped.push(c);
        }
        grouped
    }

    fn line(&self, text: &str) {
        let _ = self.term.write_line(text);
    }

    /// Writes a status header: a green check or red cross when colored,
    /// otherwise the plain message.
    fn header(&self, ok: bool, message: &str) {
        if self.use_colors {
            let mark = if ok {
                style("✓").green().bold()
            } else {
                style("✗").red().bold()
            };
            self.line(&format!("{mark} {message}"));
        } else {
            self.line(message);
        }
    }
}

impl OutputFormatter for HumanFormatter {
    fn format_pack_result(&self, report: &PackReport) -> Result<()> {
        if self.quiet {
            return Ok(());
        }

        self.header(
            true,
            &format!("Archive packed: {}", report.archive.display()),
        );
        self.line("");
        self.line(&format!(
            "  Entries:          {}",
            Self::format_number(report.total_entries())
        ));
        if report.entries_copied > 0 {
            self.line(&format!(
                "  Copied:           {}",
                Self::format_number(report.entries_copied)
            ));
        }
        self.line(&format!(
            "  Page aligned:     {}",
            Self::format_number(report.entries_page_aligned)
        ));
        self.line(&format!(
            "  Archive size:     {}",
            Self::format_size(report.archive_size)
        ));

        if report.bytes_in > 0 {
            self.line(&format!(
                "  Compression:      {:.1}%",
                report.space_savings()
            ));
        }

        if report.is_signed() {
            let schemes: Vec<String> = report.signed_schemes.iter().map(ToString::to_string).collect();
            self.line(&format!("  Signed:           {}", schemes.join(", ")));
        }
        if let Some(idsig) = &report.idsig {
            self.line(&format!("  Signature file:   {}", idsig.display()));
        }

        if self.verbose {
            self.line(&format!(
                "  Deflated:         {}",
                Self::format_number(report.entries_compressed)
            ));
            self.line(&format!(
                "  Input bytes:      {}",
                Self::format_size(report.bytes_in)
            ));
            self.line(&format!("  Duration:         {:?}", report.duration));
        }

        Ok(())
    }

    fn format_audit_report(
        &self,
        archive: &Path,
        report: &AuditReport,
        signature: Option<&SignatureVerification>,
        idsig: Option<&Path>,
    ) -> Result<()> {
        // Failures are always shown, even in quiet mode.
        if self.quiet && report.is_clean() {
            return Ok(());
        }

        if report.is_clean() {
            self.header(
                true,
                &format!("{} is 16 KB page compatible", archive.display()),
            );
        } else {
            self.header(
                false,
                &format!(
                    "{} has {} native libraries that are not 16 KB page compatible",
                    archive.display(),
                    report.problems.len()
                ),
            );
            for (entry, problems) in &report.problems {
                self.line(&format!("  {entry}"));
                for problem in problems {
                    let text = if self.use_colors {
                        style(problem.to_string()).red().to_string()
                    } else {
                        problem.to_string()
                    };
                    self.line(&format!("    - {text}"));
                }
            }
        }

        if self.quiet {
            return Ok(());
        }

        self.line(&format!(
            "  ELF entries:      {} of {}",
            Self::format_number(report.elf_entries),
            Self::format_number(report.entries_scanned)
        ));

        if let Some(verification) = signature {
            let schemes: Vec<String> = verification.schemes.iter().map(ToString::to_string).collect();
            self.line(&format!("  Signature:        {} verified", schemes.join(", ")));
            if let Some(min_sdk) = verification.v3_min_sdk {
                self.line(&format!("  v3 min SDK:       {min_sdk}"));
            }
            for fingerprint in &verification.certificate_fingerprints {
                self.line(&format!("  Certificate:      {fingerprint}"));
            }
        }
        if let Some(idsig) = idsig {
            self.line(&format!("  v4 signature:     {} verified", idsig.display()));
        }

        Ok(())
    }

    fn format_alignment_check(&self, archive: &Path, check: &AlignmentCheck) -> Result<()> {
        if self.quiet && check.is_aligned() {
            return Ok(());
        }

        if check.is_aligned() {
            self.header(true, &format!("{} is aligned", archive.display()));
        } else {
            self.header(
                false,
                &format!(
                    "{} has {} misaligned entries",
                    archive.display(),
                    check.misaligned.len()
                ),
            );
            for entry in &check.misaligned {
                self.line(&format!(
                    "  {} at offset {} (needs {}-byte alignment)",
                    entry.name, entry.data_offset, entry.required
                ));
            }
        }

        if self.verbose {
            self.line(&format!(
                "  Stored entries:     {}",
                Self::format_number(check.stored_entries)
            ));
            self.line(&format!(
                "  Compressed entries: {}",
                Self::format_number(check.compressed_entries)
            ));
        }

        Ok(())
    }

    fn format_error(&self, error: &anyhow::Error) {
        // Always show errors, even in quiet mode
        if self.use_colors {
            self.line(&format!("{} {error:?}", style("ERROR:").red().bold()));
        } else {
            self.line(&format!("ERROR: {error:?}"));
        }
    }

    fn format_success(&self, message: &str) {
        if self.quiet {
            return;
        }
        self.header(true, message);
    }

    fn format_warning(&self, message: &str) {
        if self.quiet {
            return;
        }

        if self.use_colors {
            self.line(&format!("{} {message}", style("⚠").yellow().bold()));
        } else {
            self.line(&format!("WARNING: {message}"));
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(HumanFormatter::format_size(0), "0 B");
        assert_eq!(HumanFormatter::format_size(1023), "1023 B");
        assert_eq!(HumanFormatter::format_size(16384), "16.0 KB");
        assert_eq!(HumanFormatter::format_size(1536 * 1024), "1.5 MB");
        assert_eq!(HumanFormatter::format_size(2 * 1024 * 1024 * 1024), "2.0 GB");
    }

    #[test]
    fn test_format_number() {
        assert_eq!(HumanFormatter::format_number(0), "0");
        assert_eq!(HumanFormatter::format_number(999), "999");
        assert_eq!(HumanFormatter::format_number(1000), "1,000");
        assert_eq!(HumanFormatter::format_number(65536), "65,536");
        assert_eq!(HumanFormatter::format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn test_quiet_formatter_accepts_reports() {
        let formatter = HumanFormatter::new(false, true);
        formatter.format_pack_result(&PackReport::default()).unwrap();
        formatter
            .format_audit_report(Path::new("a.apk"), &AuditReport::default(), None, None)
            .unwrap();
        formatter
            .format_alignment_check(Path::new("a.apk"), &AlignmentCheck::default())
            .unwrap();
    }
}
