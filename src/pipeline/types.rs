//! Stage and run reports

use crate::types::OutputTable;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The two transformation stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// songs + artists from song metadata
    Songs,
    /// users + time + songplays from event logs
    Events,
}

impl StageKind {
    /// Both stages in reference order
    pub const ALL: [StageKind; 2] = [StageKind::Songs, StageKind::Events];

    /// Tables written by this stage
    pub fn tables(self) -> &'static [OutputTable] {
        match self {
            StageKind::Songs => &[OutputTable::Songs, OutputTable::Artists],
            StageKind::Events => &[OutputTable::Users, OutputTable::Time, OutputTable::Songplays],
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageKind::Songs => write!(f, "songs"),
            StageKind::Events => write!(f, "events"),
        }
    }
}

/// Outcome of writing one output table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableReport {
    /// Which table
    pub table: OutputTable,
    /// Rows written
    pub rows: usize,
    /// Partition directories written
    pub partitions: usize,
    /// Part files written
    pub files: usize,
    /// Destination location
    pub path: String,
    /// Write skipped because the destination already held data
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub skipped: bool,
}

/// Rows read from one source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceReport {
    /// Source location as configured
    pub location: String,
    /// Objects read
    pub objects: usize,
    /// Records parsed
    pub records: usize,
    /// Lines dropped as malformed
    pub malformed: usize,
}

/// Outcome of one stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageReport {
    /// Which stage
    pub stage: StageKind,
    /// Sources read, in read order
    pub sources: Vec<SourceReport>,
    /// Tables written, in write order
    pub tables: Vec<TableReport>,
}

impl StageReport {
    /// Empty report for a stage
    pub fn new(stage: StageKind) -> Self {
        Self {
            stage,
            sources: Vec::new(),
            tables: Vec::new(),
        }
    }

    /// Report of one table, if this stage wrote it
    pub fn table(&self, table: OutputTable) -> Option<&TableReport> {
        self.tables.iter().find(|t| t.table == table)
    }
}

/// Outcome of a whole run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    /// Identifier embedded in part file names
    pub run_id: String,
    /// Stage reports in execution order
    pub stages: Vec<StageReport>,
    /// Wall-clock duration in milliseconds
    pub duration_ms: u64,
}

impl RunReport {
    /// Report of one table across all stages
    pub fn table(&self, table: OutputTable) -> Option<&TableReport> {
        self.stages.iter().find_map(|s| s.table(table))
    }

    /// Total rows written across all tables
    pub fn total_rows(&self) -> usize {
        self.stages
            .iter()
            .flat_map(|s| s.tables.iter())
            .map(|t| t.rows)
            .sum()
    }
}
