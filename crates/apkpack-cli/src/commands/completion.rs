//! Shell completion generation command.

use crate::cli::Cli;
use clap::CommandFactory;
use clap_complete::Shell;
use std::io;
use std::io::Write;

/// Binary name completions are registered under.
const BIN_NAME: &str = "apkpack";

/// Writes completions for `shell` to `out`.
fn generate(shell: Shell, out: &mut dyn Write) {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, BIN_NAME, out);
}

/// Generates shell completions for the specified shell on stdout.
pub fn execute(shell: Shell) {
    generate(shell, &mut io::stdout());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_generation() {
        for shell in [
            Shell::Bash,
            Shell::Zsh,
            Shell::Fish,
            Shell::PowerShell,
            Shell::Elvish,
        ] {
            let mut output = Vec::new();
            generate(shell, &mut output);
            let script = String::from_utf8_lossy(&output);
            assert!(script.contains(BIN_NAME), "no completions for {shell:?}");
        }
    }

    #[test]
    fn test_bash_completes_subcommands() {
        let mut output = Vec::new();
        generate(Shell::Bash, &mut output);
        let script = String::from_utf8_lossy(&output);
        for sub in ["pack", "audit", "check"] {
            assert!(script.contains(sub), "missing {sub}");
        }
    }
}
