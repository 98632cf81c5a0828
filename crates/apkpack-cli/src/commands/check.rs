//! Check command implementation.

use crate::cli::CheckArgs;
use crate::error::add_archive_context;
use crate::output::OutputFormatter;
use anyhow::Result;
use anyhow::bail;
use apkpack_core::PathMatcher;
use apkpack_core::check_alignment;

pub fn execute(args: &CheckArgs, formatter: &dyn OutputFormatter) -> Result<()> {
    let page_align = if args.page_align.is_empty() {
        PathMatcher::native_libraries()
    } else {
        PathMatcher::globs(args.page_align.iter().cloned())
    };

    let check = add_archive_context(
        check_alignment(&args.archive, &page_align, args.page_size),
        &args.archive,
    )?;
    formatter.format_alignment_check(&args.archive, &check)?;

    if !check.is_aligned() {
        bail!(
            "{} entries in '{}' are misaligned\n\
             HINT: Repack the archive with `apkpack pack --merge`.",
            check.misaligned.len(),
            args.archive.display()
        );
    }
    Ok(())
}
