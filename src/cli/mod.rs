//! CLI module
//!
//! Command-line interface for running the ETL.
//!
//! # Commands
//!
//! - `run` - Execute one or both stages (default)
//! - `validate` - Check configuration and credentials
//! - `plan` - Show resolved sources, destinations and partitioning

mod commands;
mod runner;

pub use commands::{Cli, Commands, OutputFormat, StageSelection};
pub use runner::Runner;
