//! CLI commands and argument parsing

use crate::pipeline::StageKind;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Sparkify song-play ETL
#[derive(Parser, Debug)]
#[command(name = "songplay-etl")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (YAML); defaults to ./etl.yaml when present
    #[arg(short = 'C', long, global = true)]
    pub config: Option<PathBuf>,

    /// Credentials file (overrides storage.credentials_file)
    #[arg(long, global = true)]
    pub credentials: Option<PathBuf>,

    /// Output base location (overrides output.base)
    #[arg(short, long, global = true)]
    pub output: Option<String>,

    /// Song metadata location for both stages (overrides input.song_data)
    #[arg(long, global = true)]
    pub song_data: Option<String>,

    /// Event log location (overrides input.log_data)
    #[arg(long, global = true)]
    pub log_data: Option<String>,

    /// Output format
    #[arg(short, long, global = true, default_value = "json")]
    pub format: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Command to run (`run` when omitted)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// CLI subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Run the ETL (default when no subcommand is given)
    Run {
        /// Which stage(s) to run
        #[arg(long, value_enum, default_value = "all")]
        stage: StageSelection,
    },

    /// Load configuration and credentials and report problems
    Validate,

    /// Show resolved sources, destinations and partitioning
    Plan,
}

impl Default for Commands {
    fn default() -> Self {
        Commands::Run {
            stage: StageSelection::All,
        }
    }
}

/// Stage selection for `run`
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum StageSelection {
    /// songs + artists
    Songs,
    /// users + time + songplays
    Events,
    /// Both stages
    All,
}

impl StageSelection {
    /// Stages selected, in execution order
    pub fn kinds(self) -> Vec<StageKind> {
        match self {
            StageSelection::Songs => vec![StageKind::Songs],
            StageSelection::Events => vec![StageKind::Events],
            StageSelection::All => StageKind::ALL.to_vec(),
        }
    }
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output (one message per line)
    Json,
    /// Human-readable output
    Pretty,
}
