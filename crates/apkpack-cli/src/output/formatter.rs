//! Output formatter trait for CLI results.

use anyhow::Result;
use apkpack_core::AlignmentCheck;
use apkpack_core::AuditReport;
use apkpack_core::PackReport;
use apkpack_core::SignatureVerification;
use serde::Serialize;
use std::path::Path;

/// Common output formatter trait
pub trait OutputFormatter {
    /// Format the result of a `pack` run
    fn format_pack_result(&self, report: &PackReport) -> Result<()>;

    /// Format a 16 KB page audit
    fn format_audit_report(
        &self,
        archive: &Path,
        report: &AuditReport,
        signature: Option<&SignatureVerification>,
        idsig: Option<&Path>,
    ) -> Result<()>;

    /// Format a zip alignment check
    fn format_alignment_check(&self, archive: &Path, check: &AlignmentCheck) -> Result<()>;

    /// Format error message
    #[allow(dead_code)]
    fn format_error(&self, error: &anyhow::Error);

    /// Format success message
    #[allow(dead_code)]
    fn format_success(&self, message: &str);

    /// Format warning message
    fn format_warning(&self, message: &str);
}

/// Generic JSON output structure
#[derive(Debug, Serialize)]
pub struct JsonOutput<T> {
    pub operation: String,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Failure,
    #[allow(dead_code)]
    Error,
}

impl<T: Serialize> JsonOutput<T> {
    pub fn success(operation: impl Into<String>, data: T) -> Self {
        Self {
            operation: operation.into(),
            status: Status::Success,
            data: Some(data),
            error: None,
        }
    }

    /// The command ran but found problems.
    pub fn failure(operation: impl Into<String>, data: T) -> Self {
        Self {
            operation: operation.into(),
            status: Status::Failure,
            data: Some(data),
            error: None,
        }
    }

    #[allow(dead_code)]
    pub fn error(operation: impl Into<String>, error: impl Into<String>) -> JsonOutput<()> {
        JsonOutput {
            operation: operation.into(),
            status: Status::Error,
            data: None,
            error: Some(error.into()),
        }
    }
}
