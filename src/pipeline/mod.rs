//! Transformation plan
//!
//! Two independent stages share one [`EtlSession`]:
//! - [`SongStage`]: song metadata → `songs`, `artists`
//! - [`EventStage`]: event logs (+ song metadata) → `users`, `time`, `songplays`
//!
//! The table-level transformations are plain functions over [`Table`]s so
//! they can be exercised without any storage.
//!
//! [`Table`]: crate::table::Table

mod events;
mod songs;
mod types;

pub use events::{
    next_song_plays, songplays_table, time_table, users_table, with_timestamps, EventStage,
    NEXT_SONG_PAGE, SONGPLAYS_COLUMNS, TIME_COLUMNS, USERS_COLUMNS,
};
pub use songs::{artists_table, songs_table, SongStage, ARTISTS_COLUMNS, SONGS_COLUMNS};
pub use types::{RunReport, SourceReport, StageKind, StageReport, TableReport};

use crate::error::Result;
use crate::session::EtlSession;
use async_trait::async_trait;
use std::time::Instant;
use tracing::info;

/// One transformation stage
#[async_trait]
pub trait Stage: Send + Sync {
    /// Which stage this is
    fn kind(&self) -> StageKind;

    /// Read sources, transform, and write this stage's tables
    async fn run(&self, session: &EtlSession) -> Result<StageReport>;
}

/// Stage implementation for a kind
pub fn stage_for(kind: StageKind) -> Box<dyn Stage> {
    match kind {
        StageKind::Songs => Box::new(SongStage),
        StageKind::Events => Box::new(EventStage),
    }
}

/// Run the given stages
///
/// Stages run in order, or concurrently when `run.parallel_stages` is set.
/// The first failure aborts the run.
pub async fn run(session: &EtlSession, kinds: &[StageKind]) -> Result<RunReport> {
    let started = Instant::now();
    let stages: Vec<Box<dyn Stage>> = kinds.iter().copied().map(stage_for).collect();

    let reports = if session.config().run.parallel_stages {
        info!(stages = stages.len(), "Running stages concurrently");
        futures::future::try_join_all(stages.iter().map(|stage| stage.run(session))).await?
    } else {
        let mut reports = Vec::with_capacity(stages.len());
        for stage in &stages {
            info!(stage = %stage.kind(), "Running stage");
            reports.push(stage.run(session).await?);
        }
        reports
    };

    let report = RunReport {
        run_id: session.run_id().to_string(),
        stages: reports,
        duration_ms: started.elapsed().as_millis() as u64,
    };

    info!(
        run_id = %report.run_id,
        rows = report.total_rows(),
        duration_ms = report.duration_ms,
        "Run complete"
    );
    Ok(report)
}
