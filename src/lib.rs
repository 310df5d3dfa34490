// Allow common clippy pedantic lints that aren't critical for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::ref_option)]
#![allow(clippy::unused_self)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::unnecessary_wraps)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::match_wildcard_for_single_variants)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::unused_async)]

//! # songplay-etl
//!
//! Batch ETL for the Sparkify music-streaming data set: reads raw song
//! metadata and event logs (JSON) from object storage, reshapes them into a
//! star schema and writes each table back as Hive-partitioned Parquet.
//!
//! ## Tables
//!
//! - **songs** (`artist_id`, `year`) and **artists** (`artist_name`) from song metadata
//! - **users** (`lastName`) and **time** (`hour`) from `NextSong` events
//! - **songplays** (`year`, `month`) from events joined to songs on (artist, title)
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use songplay_etl::{pipeline, EtlConfig, EtlSession, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = EtlConfig::load(None)?.with_output_base("/tmp/sparkify");
//!     let session = EtlSession::from_config(config)?;
//!     let report = pipeline::run(&session, &pipeline::StageKind::ALL).await?;
//!     println!("{} rows written", report.total_rows());
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                 pipeline (SongStage, EventStage)             │
//! └──────────────────────────────┬───────────────────────────────┘
//!                                │ EtlSession
//! ┌────────────┬─────────────┬───┴─────────┬──────────┬──────────┐
//! │   config   │ credentials │   storage   │  table   │  output  │
//! ├────────────┼─────────────┼─────────────┼──────────┼──────────┤
//! │ YAML       │ dl.cfg      │ S3 / R2     │ filter   │ Parquet  │
//! │ defaults   │ explicit    │ local fs    │ select   │ Hive     │
//! │ overrides  │ masked      │ globs       │ join     │ _SUCCESS │
//! └────────────┴─────────────┴─────────────┴──────────┴──────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

// ============================================================================
// Module declarations
// ============================================================================

/// Error types for the job
pub mod error;

/// Common types and type aliases
pub mod types;

/// Job configuration (YAML)
pub mod config;

/// Storage credentials file
pub mod credentials;

/// Object storage locations and access
pub mod storage;

/// In-process Arrow table engine
pub mod table;

/// Timestamp and calendar derivations
pub mod derive;

/// Parquet encoding and partitioned writes
pub mod output;

/// Shared engine session
pub mod session;

/// The transformation stages
pub mod pipeline;

/// Command-line interface
pub mod cli;

// ============================================================================
// Re-exports
// ============================================================================

pub use config::EtlConfig;
pub use credentials::Credentials;
pub use error::{Error, Result};
pub use session::EtlSession;
pub use table::Table;
pub use types::*;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
