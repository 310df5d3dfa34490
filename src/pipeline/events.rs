//! Event/fact stage
//!
//! Filters the event log to song plays, projects `users`, derives the `time`
//! dimension from `ts` and joins plays to song metadata to build
//! `songplays`.

use super::{Stage, StageKind, StageReport};
use crate::config::TransformConfig;
use crate::derive::{calendar_columns, datetime_string_column, epoch_seconds_column};
use crate::error::Result;
use crate::session::EtlSession;
use crate::table::Table;
use crate::types::{OutputTable, SongplayIdStrategy};
use arrow::array::{ArrayRef, Int64Array};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

/// Page value marking a song play
pub const NEXT_SONG_PAGE: &str = "NextSong";

/// Columns of the users table
pub const USERS_COLUMNS: [&str; 5] = ["userId", "firstName", "lastName", "gender", "level"];

/// Columns of the time table
pub const TIME_COLUMNS: [&str; 7] = ["date", "hour", "day", "week", "month", "year", "weekday"];

/// Columns of the songplays table, before partition columns are appended
pub const SONGPLAYS_COLUMNS: [(&str, &str); 9] = [
    ("sessionId", "songplay_id"),
    ("ts", "start_time"),
    ("userId", "user_id"),
    ("level", "level"),
    ("song_id", "song_id"),
    ("artist_id", "artist_id"),
    ("sessionId", "sessionId"),
    ("location", "location"),
    ("userAgent", "user_agent"),
];

/// Keep only song-play events
pub fn next_song_plays(logs: &Table) -> Result<Table> {
    logs.filter_eq("page", NEXT_SONG_PAGE)
}

/// Project the users dimension (one row per play, not de-duplicated)
pub fn users_table(plays: &Table) -> Result<Table> {
    plays.select(&USERS_COLUMNS)
}

/// Add `timestamp` (epoch seconds) and `date` (wall-clock string) columns
pub fn with_timestamps(plays: &Table, transform: &TransformConfig) -> Result<Table> {
    let timestamp = epoch_seconds_column(plays.column("ts")?.as_ref(), transform.invalid_values)?;
    let date = datetime_string_column(
        timestamp.as_ref(),
        transform.timezone,
        transform.invalid_values,
    )?;
    plays
        .with_column("timestamp", timestamp)?
        .with_column("date", date)
}

/// Derive the time dimension from a table carrying a `date` column
pub fn time_table(plays_with_dates: &Table, transform: &TransformConfig) -> Result<Table> {
    let dates = plays_with_dates.select(&["date"])?;
    let calendar = calendar_columns(dates.column("date")?.as_ref(), transform.invalid_values)?;
    dates
        .with_column("hour", calendar.hour)?
        .with_column("day", calendar.day)?
        .with_column("week", calendar.week)?
        .with_column("month", calendar.month)?
        .with_column("year", calendar.year)?
        .with_column("weekday", calendar.weekday)?
        .select(&TIME_COLUMNS)
}

/// Join plays to song metadata and build the songplays fact table
///
/// Plays match songs on `(artist, song) = (artist_name, title)`; unmatched
/// plays are dropped. `start_time` is recomputed as epoch seconds and
/// `year`/`month` are derived from it in the configured zone.
pub fn songplays_table(
    plays: &Table,
    song_data: &Table,
    transform: &TransformConfig,
) -> Result<Table> {
    let songs = song_data.select(&["artist_name", "title", "song_id", "artist_id"])?;
    let joined = plays.inner_join(
        &songs,
        &["artist", "song"],
        &["artist_name", "title"],
        transform.join_key,
    )?;
    debug!(plays = plays.num_rows(), matched = joined.num_rows(), "Joined plays to songs");

    let mut songplays = joined.select_as(&SONGPLAYS_COLUMNS)?;
    if transform.distinct_songplays {
        songplays = songplays.distinct()?;
    }

    let policy = transform.invalid_values;
    let start_time = epoch_seconds_column(songplays.column("start_time")?.as_ref(), policy)?;
    let date = datetime_string_column(start_time.as_ref(), transform.timezone, policy)?;
    let calendar = calendar_columns(date.as_ref(), policy)?;

    let mut songplays = songplays
        .with_column("start_time", start_time)?
        .with_column("month", calendar.month)?
        .with_column("year", calendar.year)?;

    if transform.songplay_id == SongplayIdStrategy::RowNumber {
        let ids: ArrayRef = Arc::new(Int64Array::from_iter_values(1..=songplays.num_rows() as i64));
        songplays = songplays.with_column("songplay_id", ids)?;
    }

    Ok(songplays)
}

/// Loads event logs and writes `users`, `time` and `songplays`
#[derive(Debug, Clone, Copy, Default)]
pub struct EventStage;

#[async_trait]
impl Stage for EventStage {
    fn kind(&self) -> StageKind {
        StageKind::Events
    }

    async fn run(&self, session: &EtlSession) -> Result<StageReport> {
        let config = session.config();
        let transform = &config.transform;
        let mut report = StageReport::new(self.kind());

        let log_location = config.log_data_location()?;
        info!(location = %log_location, "Loading log data");
        let (logs, source) = session.load_json(&log_location).await?;
        report.sources.push(source);

        let plays = next_song_plays(&logs)?;
        info!(events = logs.num_rows(), plays = plays.num_rows(), "Filtered song plays");

        let users = users_table(&plays)?;
        report
            .tables
            .push(session.write_table(OutputTable::Users, &users).await?);

        let plays = with_timestamps(&plays, transform)?;
        let time = time_table(&plays, transform)?;
        report
            .tables
            .push(session.write_table(OutputTable::Time, &time).await?);

        let song_location = config.songplays_song_data_location()?;
        info!(location = %song_location, "Loading song data for songplays");
        let (song_data, source) = session.load_json(&song_location).await?;
        report.sources.push(source);

        let songplays = songplays_table(&plays, &song_data, transform)?;
        report
            .tables
            .push(session.write_table(OutputTable::Songplays, &songplays).await?);

        Ok(report)
    }
}
