//! JSON output formatter for machine-readable results.

use super::formatter::JsonOutput;
use super::formatter::OutputFormatter;
use anyhow::Result;
use apkpack_core::AlignmentCheck;
use apkpack_core::AuditReport;
use apkpack_core::PackReport;
use apkpack_core::SignatureVerification;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::io::{self};
use std::path::Path;

pub struct JsonFormatter;

impl JsonFormatter {
    fn output<T: Serialize>(value: &T) -> Result<()> {
        let json = serde_json::to_string_pretty(value)?;
        writeln!(io::stdout(), "{json}")?;
        Ok(())
    }
}

#[derive(Serialize)]
struct PackOutput {
    archive: String,
    entries: usize,
    entries_written: usize,
    entries_copied: usize,
    entries_deleted: usize,
    entries_compressed: usize,
    entries_page_aligned: usize,
    bytes_in: u64,
    bytes_stored: u64,
    archive_size: u64,
    compression_ratio: f64,
    signed_schemes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    idsig: Option<String>,
    duration_ms: u128,
}

impl From<&PackReport> for PackOutput {
    fn from(report: &PackReport) -> Self {
        Self {
            archive: report.archive.display().to_string(),
            entries: report.total_entries(),
            entries_written: report.entries_written,
            entries_copied: report.entries_copied,
            entries_deleted: report.entries_deleted,
            entries_compressed: report.entries_compressed,
            entries_page_aligned: report.entries_page_aligned,
            bytes_in: report.bytes_in,
            bytes_stored: report.bytes_stored,
            archive_size: report.archive_size,
            compression_ratio: report.compression_ratio(),
            signed_schemes: report.signed_schemes.iter().map(ToString::to_string).collect(),
            idsig: report.idsig.as_ref().map(|p| p.display().to_string()),
            duration_ms: report.duration.as_millis(),
        }
    }
}

#[derive(Serialize)]
struct SignatureOutput {
    schemes: Vec<String>,
    signers: usize,
    certificate_fingerprints: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    v3_min_sdk: Option<u32>,
}

#[derive(Serialize)]
struct AuditOutput {
    archive: String,
    compatible: bool,
    entries_scanned: usize,
    elf_entries: usize,
    /// Problem codes per entry name.
    problems: BTreeMap<String, Vec<&'static str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    signature: Option<SignatureOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    idsig: Option<String>,
}

#[derive(Serialize)]
struct MisalignedOutput {
    name: String,
    data_offset: u64,
    required: u64,
}

#[derive(Serialize)]
struct CheckOutput {
    archive: String,
    aligned: bool,
    stored_entries: usize,
    compressed_entries: usize,
    misaligned: Vec<MisalignedOutput>,
}

impl OutputFormatter for JsonFormatter {
    fn format_pack_result(&self, report: &PackReport) -> Result<()> {
        Self::output(&JsonOutput::success("pack", PackOutput::from(report)))
    }

    fn format_audit_report(
        &self,
        archive: &Path,
        report: &AuditReport,
        signature: Option<&SignatureVerification>,
        idsig: Option<&Path>,
    ) -> Result<()> {
        let data = AuditOutput {
            archive: archive.display().to_string(),
            compatible: report.is_clean(),
            entries_scanned: report.entries_scanned,
            elf_entries: report.elf_entries,
            problems: report
                .problems
                .iter()
                .map(|(name, problems)| {
                    (name.clone(), problems.iter().map(|p| p.code()).collect())
                })
                .collect(),
            signature: signature.map(|v| SignatureOutput {
                schemes: v.schemes.iter().map(ToString::to_string).collect(),
                signers: v.signers,
                certificate_fingerprints: v.certificate_fingerprints.clone(),
                v3_min_sdk: v.v3_min_sdk,
            }),
            idsig: idsig.map(|p| p.display().to_string()),
        };

        let output = if report.is_clean() {
            JsonOutput::success("audit", data)
        } else {
            JsonOutput::failure("audit", data)
        };
        Self::output(&output)
    }

    fn format_alignment_check(&self, archive: &Path, check: &AlignmentCheck) -> Result<()> {
        let data = CheckOutput {
            archive: archive.display().to_string(),
            aligned: check.is_aligned(),
            stored_entries: check.stored_entries,
            compressed_entries: check.compressed_entries,
            misaligned: check
                .misaligned
                .iter()
                .map(|m| MisalignedOutput {
                    name: m.name.clone(),
                    data_offset: m.data_offset,
                    required: m.required,
                })
                .collect(),
        };

        let output = if check.is_aligned() {
            JsonOutput::success("check", data)
        } else {
            JsonOutput::failure("check", data)
        };
        Self::output(&output)
    }

    fn format_error(&self, error: &anyhow::Error) {
        let output = JsonOutput::<()>::error("unknown", format!("{error:?}"));
        let _ = Self::output(&output);
    }

    fn format_success(&self, message: &str) {
        #[derive(Serialize)]
        struct MessageData<'a> {
            message: &'a str,
        }

        let _ = Self::output(&JsonOutput::success("unknown", MessageData { message }));
    }

    fn format_warning(&self, message: &str) {
        // stdout carries exactly one JSON document per run.
        tracing::warn!("{message}");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use apkpack_core::AlignmentProblem;
    use apkpack_core::SignatureScheme;
    use std::collections::BTreeSet;
    use std::path::PathBuf;

    #[test]
    fn test_pack_output_fields() {
        let report = PackReport {
            archive: PathBuf::from("out.apk"),
            entries_written: 2,
            entries_copied: 3,
            signed_schemes: vec![SignatureScheme::V2, SignatureScheme::V3],
            ..PackReport::default()
        };
        let value = serde_json::to_value(JsonOutput::success("pack", PackOutput::from(&report))).unwrap();
        assert_eq!(value["status"], "success");
        assert_eq!(value["data"]["entries"], 5);
        assert_eq!(value["data"]["signed_schemes"][1], "v3");
        assert!(value["data"].get("idsig").is_none());
    }

    #[test]
    fn test_audit_problems_use_codes() {
        let mut report = AuditReport::default();
        report.problems.insert(
            "lib/arm64-v8a/libold.so".into(),
            BTreeSet::from([AlignmentProblem::ElfLoadSectionsNot16kAligned]),
        );
        let data = AuditOutput {
            archive: "a.apk".into(),
            compatible: report.is_clean(),
            entries_scanned: 1,
            elf_entries: 1,
            problems: report
                .problems
                .iter()
                .map(|(n, p)| (n.clone(), p.iter().map(|x| x.code()).collect()))
                .collect(),
            signature: None,
            idsig: None,
        };
        let value = serde_json::to_value(JsonOutput::failure("audit", data)).unwrap();
        assert_eq!(value["status"], "failure");
        assert_eq!(
            value["data"]["problems"]["lib/arm64-v8a/libold.so"][0],
            "elf-load-sections-not-16k-aligned"
        );
    }
}
