//! Pack command implementation.

use crate::cli::PackArgs;
use crate::error::add_archive_context;
use crate::output::OutputFormatter;
use crate::progress::CliProgress;
use anyhow::Context;
use anyhow::Result;
use apkpack_core::ArchiveWriter;
use apkpack_core::PackConfig;
use apkpack_core::PathMatcher;
use apkpack_core::SigningConfig;
use apkpack_core::Zip64Mode;
use apkpack_core::writer::worker_pool;
use std::sync::Arc;

pub fn execute(args: &PackArgs, formatter: &dyn OutputFormatter, show_progress: bool) -> Result<()> {
    let config = build_config(args)?;
    if args.files.is_empty() && args.merges.is_empty() {
        formatter.format_warning("no --file or --merge given, writing an empty archive");
    }
    let pool = add_archive_context(worker_pool(args.threads), &args.output)?;

    let mut writer = add_archive_context(ArchiveWriter::open(&args.output, config, pool), &args.output)?;
    if show_progress && CliProgress::should_show() {
        writer.set_progress(Arc::new(CliProgress::new("Packing")));
    }

    let result = add_entries(&mut writer, args);
    if let Err(err) = result {
        writer.abandon();
        return Err(err);
    }

    let report = add_archive_context(writer.close(), &args.output)?;
    formatter.format_pack_result(&report)?;
    Ok(())
}

fn add_entries(writer: &mut ArchiveWriter, args: &PackArgs) -> Result<()> {
    // Merged archives first: a bulk copy switches the writer to append-only,
    // so any later delete would be refused anyway.
    let exclude = PathMatcher::globs(args.exclude.iter().cloned());
    let skip = |name: &str| exclude.matches(name);
    for merge in &args.merges {
        let copied = add_archive_context(
            writer.copy_entries_from_archive(merge, None, Some(&skip)),
            merge,
        )?;
        tracing::debug!(archive = %merge.display(), copied, "merged archive");
    }

    for mapping in &args.files {
        add_archive_context(
            writer.write_file(mapping.source.clone(), &mapping.entry),
            &args.output,
        )?;
    }
    Ok(())
}

fn build_config(args: &PackArgs) -> Result<PackConfig> {
    let page_align = if args.page_align.is_empty() {
        PathMatcher::native_libraries()
    } else {
        PathMatcher::globs(args.page_align.iter().cloned())
    };
    let no_compress = if args.no_compress.is_empty() {
        PathMatcher::Never
    } else {
        PathMatcher::globs(args.no_compress.iter().cloned())
    };

    let signing = match &args.key {
        Some(key) => Some(signing_config(args, key)?),
        None => None,
    };

    Ok(PackConfig::default()
        .with_compression_level(args.level)
        .with_deterministic_order(!args.unordered)
        .with_zip64(if args.allow_zip64 {
            Zip64Mode::Allow
        } else {
            Zip64Mode::Forbid
        })
        .with_no_compress(no_compress)
        .with_page_align(page_align)
        .with_page_size(args.page_size)
        .with_signing(signing))
}

fn signing_config(args: &PackArgs, key: &std::path::Path) -> Result<SigningConfig> {
    let signing = SigningConfig::from_pem_file(key)
        .map_err(|e| crate::error::convert_pack_error(e, &args.output))
        .with_context(|| format!("Failed to load signing key '{}'", key.display()))?;

    // With no scheme flag the archive gets a v2 signature.
    let v2 = args.v2 || !(args.v3 || args.v4);
    Ok(signing
        .with_v2(v2)
        .with_v3(args.v3)
        .with_v4(args.v4)
        .with_min_sdk(args.min_sdk)
        .with_idsig_output(args.idsig.clone()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use crate::cli::Commands;
    use apkpack_core::PageSize;
    use clap::Parser;

    fn parse(args: &[&str]) -> PackArgs {
        let cli = Cli::try_parse_from(args).unwrap();
        let Commands::Pack(args) = cli.command else {
            panic!("expected pack");
        };
        args
    }

    #[test]
    fn test_build_config_defaults() {
        let config = build_config(&parse(&["apkpack", "pack", "out.apk"])).unwrap();
        assert!(config.deterministic_order);
        assert_eq!(config.zip64, Zip64Mode::Forbid);
        assert!(config.page_align.matches("lib/x86/liba.so"));
        assert!(!config.no_compress.matches("lib/x86/liba.so"));
        assert!(config.signing.is_none());
    }

    #[test]
    fn test_build_config_flags() {
        let args = parse(&[
            "apkpack",
            "pack",
            "out.apk",
            "--no-compress",
            "*.so",
            "--page-align",
            "lib/*",
            "--page-size",
            "4k",
            "--unordered",
            "--allow-zip64",
            "--level",
            "9",
        ]);
        let config = build_config(&args).unwrap();
        assert!(!config.deterministic_order);
        assert_eq!(config.zip64, Zip64Mode::Allow);
        assert_eq!(config.page_size, PageSize::Size4K);
        assert_eq!(config.compression_level, 9);
        assert!(config.no_compress.matches("lib/x86/liba.so"));
        assert!(config.page_align.matches("lib/x86/liba.so"));
    }

    #[test]
    fn test_missing_key_file_fails() {
        let args = parse(&["apkpack", "pack", "out.apk", "--key", "/nonexistent/key.pem"]);
        let err = build_config(&args).unwrap_err();
        assert!(format!("{err:?}").contains("signing key"));
    }
}
