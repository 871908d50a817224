//! Command implementations

pub mod check;
pub mod tune;

use crate::Result;
use clap::Subcommand;

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Run a tuning session
    Tune(tune::TuneArgs),

    /// Validate a session file and print what it describes
    Check(check::CheckArgs),
}

impl Commands {
    pub async fn execute(self) -> Result<()> {
        match self {
            Commands::Tune(args) => tune::execute(args).await,
            Commands::Check(args) => check::execute(args).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Debug, Parser)]
    struct TestCli {
        #[command(subcommand)]
        command: Commands,
    }

    #[test]
    fn test_parse_tune_command() {
        let cli = TestCli::parse_from(["test", "tune", "--config", "session.toml"]);
        assert!(matches!(cli.command, Commands::Tune(_)));
    }

    #[test]
    fn test_parse_check_command() {
        let cli = TestCli::parse_from(["test", "check", "--config", "session.toml"]);
        assert!(matches!(cli.command, Commands::Check(_)));
    }

    #[test]
    fn test_tune_generation_override() {
        let cli = TestCli::parse_from([
            "test",
            "tune",
            "--config",
            "session.toml",
            "--generations",
            "3",
        ]);
        match cli.command {
            Commands::Tune(args) => assert_eq!(args.generations, Some(3)),
            other => panic!("unexpected command {other:?}"),
        }
    }
}
