//! Output formatting for `apkpack` results.
//!
//! Every command reports through an [`OutputFormatter`]; `--json` swaps the
//! styled terminal output for one pretty-printed JSON document on stdout.

mod formatter;
mod human;
mod json;

pub use formatter::OutputFormatter;

use crate::cli::Cli;
use human::HumanFormatter;
use json::JsonFormatter;

/// Picks the formatter requested by the global flags.
pub fn create_formatter(cli: &Cli) -> Box<dyn OutputFormatter> {
    if cli.json {
        Box::new(JsonFormatter)
    } else {
        Box::new(HumanFormatter::new(cli.verbose, cli.quiet))
    }
}
