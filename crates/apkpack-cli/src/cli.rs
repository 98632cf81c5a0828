//! CLI argument parsing using clap.

use apkpack_core::PageSize;
use clap::Parser;
use clap::Subcommand;
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "apkpack")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output and debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Output results in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Assemble an APK from files and existing archives
    Pack(PackArgs),
    /// Audit native libraries for 16 KB page compatibility
    Audit(AuditArgs),
    /// Check that stored entries are aligned (like zipalign -c)
    Check(CheckArgs),
    /// Generate shell completions
    Completion {
        /// Target shell
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// One `--file ENTRY=SOURCE` mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMapping {
    pub entry: String,
    pub source: PathBuf,
}

#[derive(clap::Args)]
pub struct PackArgs {
    /// Output archive path
    #[arg(value_name = "OUTPUT")]
    pub output: PathBuf,

    /// Add a file as ENTRY=SOURCE (can be repeated)
    #[arg(long = "file", short = 'f', value_name = "ENTRY=SOURCE", value_parser = parse_file_mapping)]
    pub files: Vec<FileMapping>,

    /// Copy every entry of an existing ZIP (can be repeated)
    #[arg(long = "merge", short = 'm', value_name = "ZIP")]
    pub merges: Vec<PathBuf>,

    /// Skip merged entries matching this glob (can be repeated)
    #[arg(long = "exclude", short = 'x', value_name = "GLOB")]
    pub exclude: Vec<String>,

    /// Deflate level, 0 stores everything
    #[arg(short = 'l', long, default_value = "6", value_parser = clap::value_parser!(u8).range(0..=9))]
    pub level: u8,

    /// Store entries matching this glob uncompressed (can be repeated)
    #[arg(long = "no-compress", value_name = "GLOB")]
    pub no_compress: Vec<String>,

    /// Page-align stored entries matching this glob [default: *.so]
    #[arg(long = "page-align", value_name = "GLOB")]
    pub page_align: Vec<String>,

    /// Page size for page-aligned entries (4k or 16k)
    #[arg(long, default_value = "16k")]
    pub page_size: PageSize,

    /// Write entries in completion order instead of sorted by name
    #[arg(long)]
    pub unordered: bool,

    /// Allow Zip64 structures for very large archives
    #[arg(long)]
    pub allow_zip64: bool,

    /// Worker threads for compression (0 = one per CPU)
    #[arg(short = 't', long, default_value = "0")]
    pub threads: usize,

    /// PEM file with the signing key and certificate
    #[arg(long, value_name = "PEM")]
    pub key: Option<PathBuf>,

    /// Sign with APK Signature Scheme v2 (default when no scheme is given)
    #[arg(long, requires = "key")]
    pub v2: bool,

    /// Sign with APK Signature Scheme v3
    #[arg(long, requires = "key")]
    pub v3: bool,

    /// Also write a v4 .idsig file
    #[arg(long, requires = "key")]
    pub v4: bool,

    /// Minimum platform level recorded in the v3 signer
    #[arg(long, default_value = "24")]
    pub min_sdk: u32,

    /// Where to write the v4 .idsig file [default: OUTPUT.idsig]
    #[arg(long, value_name = "PATH", requires = "v4")]
    pub idsig: Option<PathBuf>,
}

#[derive(clap::Args)]
pub struct AuditArgs {
    /// Path to the archive file
    #[arg(value_name = "ARCHIVE")]
    pub archive: PathBuf,

    /// Also verify the v2/v3 signing block
    #[arg(long)]
    pub signature: bool,

    /// Also verify a v4 .idsig file against the archive
    #[arg(long, value_name = "PATH")]
    pub idsig: Option<PathBuf>,
}

#[derive(clap::Args)]
pub struct CheckArgs {
    /// Path to the archive file
    #[arg(value_name = "ARCHIVE")]
    pub archive: PathBuf,

    /// Entries matching this glob need page alignment [default: *.so]
    #[arg(long = "page-align", value_name = "GLOB")]
    pub page_align: Vec<String>,

    /// Page size for page-aligned entries (4k or 16k)
    #[arg(long, default_value = "16k")]
    pub page_size: PageSize,
}

/// Parses `ENTRY=SOURCE`, splitting at the first `=`.
fn parse_file_mapping(s: &str) -> Result<FileMapping, String> {
    let (entry, source) = s
        .split_once('=')
        .ok_or_else(|| format!("expected ENTRY=SOURCE, got '{s}'"))?;
    if entry.is_empty() || source.is_empty() {
        return Err(format!("expected ENTRY=SOURCE, got '{s}'"));
    }
    Ok(FileMapping {
        entry: entry.to_string(),
        source: PathBuf::from(source),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_parse_file_mapping() {
        let mapping = parse_file_mapping("lib/arm64-v8a/libfoo.so=build/libfoo.so").unwrap();
        assert_eq!(mapping.entry, "lib/arm64-v8a/libfoo.so");
        assert_eq!(mapping.source, PathBuf::from("build/libfoo.so"));

        let mapping = parse_file_mapping("a=b=c").unwrap();
        assert_eq!(mapping.entry, "a");
        assert_eq!(mapping.source, PathBuf::from("b=c"));
    }

    #[test]
    fn test_parse_file_mapping_rejects_malformed() {
        assert!(parse_file_mapping("no-separator").is_err());
        assert!(parse_file_mapping("=src").is_err());
        assert!(parse_file_mapping("entry=").is_err());
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_pack_defaults() {
        let cli = Cli::try_parse_from(["apkpack", "pack", "out.apk"]).unwrap();
        let Commands::Pack(args) = cli.command else {
            panic!("expected pack");
        };
        assert_eq!(args.level, 6);
        assert_eq!(args.page_size, PageSize::Size16K);
        assert!(args.key.is_none());
        assert!(!args.unordered);
    }

    #[test]
    fn test_signing_flags_need_key() {
        assert!(Cli::try_parse_from(["apkpack", "pack", "out.apk", "--v3"]).is_err());
        assert!(Cli::try_parse_from(["apkpack", "pack", "out.apk", "--key", "k.pem", "--v3"]).is_ok());
    }

    #[test]
    fn test_level_range() {
        assert!(Cli::try_parse_from(["apkpack", "pack", "out.apk", "--level", "10"]).is_err());
        assert!(Cli::try_parse_from(["apkpack", "pack", "out.apk", "--level", "0"]).is_ok());
    }
}
