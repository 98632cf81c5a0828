//! Audit command implementation.

use crate::cli::AuditArgs;
use crate::error::add_archive_context;
use crate::output::OutputFormatter;
use anyhow::Result;
use anyhow::bail;
use apkpack_core::audit_archive;
use apkpack_core::verify_idsig;
use apkpack_core::verify_signing_block;

pub fn execute(args: &AuditArgs, formatter: &dyn OutputFormatter) -> Result<()> {
    let archive = &args.archive;
    let report = add_archive_context(audit_archive(archive), archive)?;

    let signature = if args.signature {
        Some(add_archive_context(verify_signing_block(archive), archive)?)
    } else {
        None
    };

    if let Some(idsig) = &args.idsig {
        add_archive_context(verify_idsig(archive, idsig), archive)?;
    }

    formatter.format_audit_report(archive, &report, signature.as_ref(), args.idsig.as_deref())?;

    if !report.is_clean() {
        bail!(
            "{} native libraries in '{}' are not 16 KB page compatible\n\
             HINT: Relink with -Wl,-z,max-page-size=16384 and pack with --page-size 16k.",
            report.problems.len(),
            archive.display()
        );
    }
    Ok(())
}
