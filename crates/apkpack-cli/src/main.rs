//! apkpack - assemble, page-align, sign and audit APK archives.

mod cli;
mod commands;
mod error;
mod output;
mod progress;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Routes tracing output to stderr so stdout stays clean for `--json`.
///
/// `RUST_LOG` wins when set; otherwise `-v` enables debug logging for the
/// apkpack crates and everything else stays at warn.
fn init_tracing(verbose: bool) {
    let default = if verbose {
        "warn,apkpack_core=debug,apkpack=debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    init_tracing(cli.verbose);

    let formatter = output::create_formatter(&cli);

    match &cli.command {
        cli::Commands::Pack(args) => {
            commands::pack::execute(args, &*formatter, !cli.quiet && !cli.json)
        }
        cli::Commands::Audit(args) => commands::audit::execute(args, &*formatter),
        cli::Commands::Check(args) => commands::check::execute(args, &*formatter),
        cli::Commands::Completion { shell } => {
            commands::completion::execute(*shell);
            Ok(())
        }
    }
}
