//! CLI structure and argument parsing

use crate::commands::Commands;
use clap::Parser;

/// paramrace - racing-based algorithm parameter tuner
#[derive(Debug, Parser)]
#[command(name = "paramrace")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_verbose_flag() {
        let cli = Cli::parse_from(["paramrace", "-v", "check", "--config", "session.toml"]);
        assert!(cli.verbose);
    }
}
