//! Song dimension stage
//!
//! Projects the `songs` and `artists` dimensions straight out of the song
//! metadata. No filtering, no de-duplication.

use super::{SourceReport, Stage, StageKind, StageReport};
use crate::error::Result;
use crate::session::EtlSession;
use crate::table::Table;
use crate::types::OutputTable;
use async_trait::async_trait;
use tracing::info;

/// Columns of the songs table
pub const SONGS_COLUMNS: [&str; 5] = ["song_id", "title", "artist_id", "year", "duration"];

/// Columns of the artists table
pub const ARTISTS_COLUMNS: [&str; 5] = [
    "artist_id",
    "artist_name",
    "artist_location",
    "artist_latitude",
    "artist_longitude",
];

/// Project the songs dimension
pub fn songs_table(song_data: &Table) -> Result<Table> {
    song_data.select(&SONGS_COLUMNS)
}

/// Project the artists dimension
pub fn artists_table(song_data: &Table) -> Result<Table> {
    song_data.select(&ARTISTS_COLUMNS)
}

/// Loads song metadata and writes `songs` and `artists`
#[derive(Debug, Clone, Copy, Default)]
pub struct SongStage;

#[async_trait]
impl Stage for SongStage {
    fn kind(&self) -> StageKind {
        StageKind::Songs
    }

    async fn run(&self, session: &EtlSession) -> Result<StageReport> {
        let location = session.config().song_data_location()?;
        info!(location = %location, "Loading song data");
        let (song_data, source): (Table, SourceReport) = session.load_json(&location).await?;

        let mut report = StageReport::new(self.kind());
        report.sources.push(source);

        let songs = songs_table(&song_data)?;
        report
            .tables
            .push(session.write_table(OutputTable::Songs, &songs).await?);

        let artists = artists_table(&song_data)?;
        report
            .tables
            .push(session.write_table(OutputTable::Artists, &artists).await?);

        Ok(report)
    }
}
