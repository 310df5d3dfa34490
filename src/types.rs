//! Common types used throughout songplay-etl
//!
//! This module contains shared enums for configuration knobs and
//! small utility traits used across multiple modules.

use crate::error::Error;
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Write Mode
// ============================================================================

/// How a table write treats data already present at the destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Replace everything under the destination
    #[default]
    Overwrite,
    /// Add new files next to existing ones
    Append,
    /// Fail if the destination already holds files
    ErrorIfExists,
    /// Skip the write if the destination already holds files
    Ignore,
}

// ============================================================================
// Record Policies
// ============================================================================

/// What to do with input lines that are not valid JSON objects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MalformedRecordPolicy {
    /// Skip the line and log a warning
    #[default]
    Drop,
    /// Abort the read
    Fail,
}

/// What to do when a derivation receives a value it cannot interpret
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidValuePolicy {
    /// Fail the whole stage
    #[default]
    Fail,
    /// Emit null for the derived field
    Null,
}

// ============================================================================
// Modelling Options
// ============================================================================

/// How `songplay_id` is produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SongplayIdStrategy {
    /// Copy `sessionId` (not unique when a session has several plays)
    #[default]
    SessionId,
    /// 1-based sequence over the final rows
    RowNumber,
}

/// Partition layout of the time dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimePartitioning {
    /// Partition by hour of day
    #[default]
    Hour,
    /// Partition by calendar year then month
    YearMonth,
}

impl TimePartitioning {
    /// Partition columns for the time table
    pub fn columns(self) -> &'static [&'static str] {
        match self {
            TimePartitioning::Hour => &["hour"],
            TimePartitioning::YearMonth => &["year", "month"],
        }
    }
}

/// How the (artist, title) join key is compared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinKeyMode {
    /// Compare each key column separately
    #[default]
    Composite,
    /// Compare the string concatenation of the key columns
    Concatenated,
}

// ============================================================================
// Compression
// ============================================================================

/// Parquet compression codec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionCodec {
    /// Snappy (Spark's default)
    #[default]
    Snappy,
    /// Zstandard, default level
    Zstd,
    /// Gzip, default level
    Gzip,
    /// Uncompressed
    None,
}

impl CompressionCodec {
    /// File name infix used by Spark-style part files
    pub fn file_infix(self) -> &'static str {
        match self {
            CompressionCodec::Snappy => ".snappy",
            CompressionCodec::Zstd => ".zstd",
            CompressionCodec::Gzip => ".gz",
            CompressionCodec::None => "",
        }
    }
}

// ============================================================================
// Time Zone
// ============================================================================

/// Zone used to render epoch seconds as wall-clock time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TimeZoneSetting {
    /// The process local zone
    #[default]
    Local,
    /// UTC
    Utc,
    /// A fixed offset from UTC
    Fixed(FixedOffset),
}

impl TryFrom<String> for TimeZoneSetting {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl std::str::FromStr for TimeZoneSetting {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "utc" | "z" => Ok(Self::Utc),
            other => other
                .parse::<FixedOffset>()
                .map(Self::Fixed)
                .map_err(|e| Error::invalid_value("transform.timezone", format!("{other}: {e}"))),
        }
    }
}

impl From<TimeZoneSetting> for String {
    fn from(tz: TimeZoneSetting) -> Self {
        tz.to_string()
    }
}

impl fmt::Display for TimeZoneSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeZoneSetting::Local => write!(f, "local"),
            TimeZoneSetting::Utc => write!(f, "utc"),
            TimeZoneSetting::Fixed(offset) => write!(f, "{offset}"),
        }
    }
}

// ============================================================================
// Output Tables
// ============================================================================

/// The five star-schema tables produced by a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputTable {
    /// Song dimension
    Songs,
    /// Artist dimension
    Artists,
    /// User dimension
    Users,
    /// Time dimension
    Time,
    /// Song-play facts
    Songplays,
}

impl OutputTable {
    /// All tables in write order
    pub const ALL: [OutputTable; 5] = [
        OutputTable::Songs,
        OutputTable::Artists,
        OutputTable::Users,
        OutputTable::Time,
        OutputTable::Songplays,
    ];

    /// Short table name
    pub fn name(self) -> &'static str {
        match self {
            OutputTable::Songs => "songs",
            OutputTable::Artists => "artists",
            OutputTable::Users => "users",
            OutputTable::Time => "time",
            OutputTable::Songplays => "songplays",
        }
    }

    /// Directory under the output base
    pub fn dir_name(self) -> &'static str {
        match self {
            OutputTable::Songs => "songs_table",
            OutputTable::Artists => "artists_table",
            OutputTable::Users => "users_table",
            OutputTable::Time => "time_table",
            OutputTable::Songplays => "songplays_table",
        }
    }
}

impl fmt::Display for OutputTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Utilities
// ============================================================================

/// Extension trait for Option<String> to handle empty strings
pub trait OptionStringExt {
    /// Returns None if the string is empty
    fn none_if_empty(self) -> Option<String>;
}

impl OptionStringExt for Option<String> {
    fn none_if_empty(self) -> Option<String> {
        self.filter(|s| !s.trim().is_empty())
    }
}
