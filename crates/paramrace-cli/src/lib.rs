//! Library surface of the paramrace CLI: session configuration, the
//! subprocess target adapter, status snapshots and the command
//! implementations.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod status;
pub mod target;

pub use cli::Cli;
pub use commands::Commands;
pub use error::{CliError, Result};
