//! End-to-end tests: JSON sources on the local filesystem through both
//! stages to partitioned Parquet output.

use arrow::array::{AsArray, RecordBatch};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use songplay_etl::pipeline::{self, StageKind};
use songplay_etl::{EtlConfig, EtlSession, Error, OutputTable, TimeZoneSetting};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

// ============================================================================
// Fixtures
// ============================================================================

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }

    fn out(&self, relative: &str) -> PathBuf {
        self.root().join("out").join(relative)
    }

    fn write_json_lines(&self, relative: &str, records: &[Value]) {
        let path = self.root().join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let body: Vec<String> = records.iter().map(Value::to_string).collect();
        std::fs::write(path, body.join("\n")).unwrap();
    }

    fn config(&self) -> EtlConfig {
        let mut config = EtlConfig::default()
            .with_song_data(self.root().join("song_data").to_str().unwrap())
            .with_log_data(format!("{}/log_data/*/*/*.json", self.root().display()))
            .with_output_base(self.root().join("out").to_str().unwrap());
        config.transform.timezone = TimeZoneSetting::Utc;
        config
    }

    fn session(&self, config: EtlConfig) -> EtlSession {
        EtlSession::new(config, None).unwrap().with_run_id("test")
    }
}

fn song(song_id: &str, artist_id: &str, artist_name: &str, title: &str, year: i64) -> Value {
    json!({
        "num_songs": 1,
        "song_id": song_id,
        "title": title,
        "artist_id": artist_id,
        "artist_name": artist_name,
        "artist_location": "",
        "artist_latitude": null,
        "artist_longitude": null,
        "year": year,
        "duration": 200.0
    })
}

fn event(page: &str, song: &str, ts: i64) -> Value {
    json!({
        "page": page,
        "artist": "Artist",
        "song": song,
        "ts": ts,
        "userId": "7",
        "sessionId": "42",
        "level": "free",
        "location": "LA",
        "userAgent": "UA",
        "firstName": "J",
        "lastName": "Doe",
        "gender": "M",
        "auth": "Logged In",
        "method": "PUT",
        "status": 200
    })
}

fn seed(fixture: &Fixture, play_song: &str) {
    fixture.write_json_lines(
        "song_data/A/A/A/TRAAAAW128F429D538.json",
        &[song("S1", "AR1", "Artist", "Song", 2000)],
    );
    fixture.write_json_lines(
        "song_data/A/A/B/TRAABJL12903CDCF1A.json",
        &[song("S2", "AR2", "AC/DC", "Thunder", 0)],
    );
    fixture.write_json_lines(
        "log_data/2018/11/2018-11-01-events.json",
        &[
            event("NextSong", play_song, 1_000_000),
            event("Home", "", 1_000_500),
        ],
    );
}

/// Relative paths of every file below `root`, sorted
fn list_files(root: &Path) -> Vec<String> {
    fn walk(dir: &Path, root: &Path, out: &mut Vec<String>) {
        for entry in std::fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                walk(&path, root, out);
            } else {
                out.push(path.strip_prefix(root).unwrap().to_string_lossy().to_string());
            }
        }
    }
    let mut out = Vec::new();
    walk(root, root, &mut out);
    out.sort();
    out
}

/// Partition directories (`col=value/...`) holding part files
fn partition_dirs(root: &Path) -> BTreeSet<String> {
    list_files(root)
        .into_iter()
        .filter(|f| f.ends_with(".parquet"))
        .filter_map(|f| f.rsplit_once('/').map(|(dir, _)| dir.to_string()))
        .collect()
}

fn read_table(root: &Path) -> Vec<RecordBatch> {
    list_files(root)
        .into_iter()
        .filter(|f| f.ends_with(".parquet"))
        .flat_map(|f| {
            let file = std::fs::File::open(root.join(f)).unwrap();
            ParquetRecordBatchReaderBuilder::try_new(file)
                .unwrap()
                .build()
                .unwrap()
                .map(Result::unwrap)
                .collect::<Vec<_>>()
        })
        .collect()
}

fn column_names(batch: &RecordBatch) -> Vec<String> {
    batch.schema().fields().iter().map(|f| f.name().clone()).collect()
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_end_to_end_reference_scenario() {
    let fixture = Fixture::new();
    seed(&fixture, "Song");

    let session = fixture.session(fixture.config());
    let report = pipeline::run(&session, &StageKind::ALL).await.unwrap();

    assert_eq!(report.run_id, "test");
    assert_eq!(report.stages.len(), 2);
    assert_eq!(report.table(OutputTable::Songs).unwrap().rows, 2);
    assert_eq!(report.table(OutputTable::Artists).unwrap().rows, 2);
    assert_eq!(report.table(OutputTable::Users).unwrap().rows, 1);
    assert_eq!(report.table(OutputTable::Time).unwrap().rows, 1);
    assert_eq!(report.table(OutputTable::Songplays).unwrap().rows, 1);

    // Songplays partitioned by year then month, partition columns removed
    let songplays_root = fixture.out("songplays_table");
    assert_eq!(
        list_files(&songplays_root),
        vec!["_SUCCESS", "year=1970/month=1/part-00000-test.snappy.parquet"]
    );

    let batches = read_table(&songplays_root);
    assert_eq!(batches.len(), 1);
    let batch = &batches[0];
    assert_eq!(
        column_names(batch),
        vec![
            "songplay_id", "start_time", "user_id", "level", "song_id", "artist_id",
            "sessionId", "location", "user_agent"
        ]
    );
    let string = |name: &str| {
        let column = batch.column_by_name(name).unwrap();
        column.as_string::<i32>().value(0).to_string()
    };
    assert_eq!(string("songplay_id"), "42");
    assert_eq!(string("user_id"), "7");
    assert_eq!(string("song_id"), "S1");
    assert_eq!(string("artist_id"), "AR1");
}

#[tokio::test]
async fn test_negative_scenario_writes_empty_songplays() {
    let fixture = Fixture::new();
    seed(&fixture, "Other");

    let session = fixture.session(fixture.config());
    let report = pipeline::run(&session, &StageKind::ALL).await.unwrap();

    let songplays = report.table(OutputTable::Songplays).unwrap();
    assert_eq!(songplays.rows, 0);
    assert_eq!(songplays.partitions, 0);
    assert_eq!(list_files(&fixture.out("songplays_table")), vec!["_SUCCESS"]);

    // The play is still a NextSong event for users and time
    assert_eq!(report.table(OutputTable::Users).unwrap().rows, 1);
}

#[tokio::test]
async fn test_dimension_tables_columns_and_partitions() {
    let fixture = Fixture::new();
    seed(&fixture, "Song");

    let session = fixture.session(fixture.config());
    pipeline::run(&session, &StageKind::ALL).await.unwrap();

    // Every distinct partition value maps to an enumerable directory
    assert_eq!(
        partition_dirs(&fixture.out("songs_table")),
        BTreeSet::from([
            "artist_id=AR1/year=2000".to_string(),
            "artist_id=AR2/year=0".to_string(),
        ])
    );
    assert_eq!(
        partition_dirs(&fixture.out("artists_table")),
        BTreeSet::from([
            "artist_name=AC%2FDC".to_string(),
            "artist_name=Artist".to_string(),
        ])
    );
    assert_eq!(
        partition_dirs(&fixture.out("users_table")),
        BTreeSet::from(["lastName=Doe".to_string()])
    );
    assert_eq!(
        partition_dirs(&fixture.out("time_table")),
        BTreeSet::from(["hour=0".to_string()])
    );

    let songs = read_table(&fixture.out("songs_table"));
    assert_eq!(column_names(&songs[0]), vec!["song_id", "title", "duration"]);
    assert_eq!(songs.iter().map(RecordBatch::num_rows).sum::<usize>(), 2);

    let artists = read_table(&fixture.out("artists_table"));
    assert_eq!(
        column_names(&artists[0]),
        vec!["artist_id", "artist_location", "artist_latitude", "artist_longitude"]
    );

    let users = read_table(&fixture.out("users_table"));
    assert_eq!(column_names(&users[0]), vec!["userId", "firstName", "gender", "level"]);

    let time = read_table(&fixture.out("time_table"));
    assert_eq!(
        column_names(&time[0]),
        vec!["date", "day", "week", "month", "year", "weekday"]
    );
    let date = time[0].column_by_name("date").unwrap().as_string::<i32>().value(0).to_string();
    assert_eq!(date, "1970-01-01 00:16:40");
}

#[tokio::test]
async fn test_rerun_overwrites_previous_output() {
    let fixture = Fixture::new();
    seed(&fixture, "Song");

    let first = EtlSession::new(fixture.config(), None).unwrap().with_run_id("first");
    pipeline::run(&first, &StageKind::ALL).await.unwrap();

    let second = EtlSession::new(fixture.config(), None).unwrap().with_run_id("second");
    pipeline::run(&second, &StageKind::ALL).await.unwrap();

    for table in OutputTable::ALL {
        let files = list_files(&fixture.out(table.dir_name()));
        assert!(files.iter().all(|f| !f.contains("-first")), "{table}: {files:?}");
        assert!(files.contains(&"_SUCCESS".to_string()));
    }
}

#[tokio::test]
async fn test_parallel_stages_match_sequential() {
    let sequential = Fixture::new();
    seed(&sequential, "Song");
    pipeline::run(&sequential.session(sequential.config()), &StageKind::ALL)
        .await
        .unwrap();

    let parallel = Fixture::new();
    seed(&parallel, "Song");
    let mut config = parallel.config();
    config.run.parallel_stages = true;
    let report = pipeline::run(&parallel.session(config), &StageKind::ALL)
        .await
        .unwrap();

    assert_eq!(report.stages[0].stage, StageKind::Songs);
    assert_eq!(report.stages[1].stage, StageKind::Events);
    for table in OutputTable::ALL {
        assert_eq!(
            list_files(&sequential.out(table.dir_name())),
            list_files(&parallel.out(table.dir_name())),
        );
    }
}

#[tokio::test]
async fn test_single_stage_run() {
    let fixture = Fixture::new();
    seed(&fixture, "Song");

    let session = fixture.session(fixture.config());
    let report = pipeline::run(&session, &[StageKind::Songs]).await.unwrap();

    assert_eq!(report.stages.len(), 1);
    assert!(fixture.out("songs_table/_SUCCESS").exists());
    assert!(!fixture.out("songplays_table").exists());
}

#[tokio::test]
async fn test_missing_source_aborts() {
    let fixture = Fixture::new();
    seed(&fixture, "Song");

    let config = fixture
        .config()
        .with_log_data(format!("{}/no_such_logs/*.json", fixture.root().display()));
    let session = fixture.session(config);
    let err = pipeline::run(&session, &StageKind::ALL).await.unwrap_err();

    assert!(matches!(err, Error::SourceRead { .. }), "{err}");
}

#[tokio::test]
async fn test_songplays_with_year_month_time_partitions() {
    let fixture = Fixture::new();
    seed(&fixture, "Song");

    let config = EtlConfig::from_yaml_str(&format!(
        "input:\n  song_data: {root}/song_data\n  songplays_song_data: \
         {root}/song_data/*/*/*/*.json\n  log_data: {root}/log_data\n\
         output:\n  base: {root}/out\n  compression: none\n\
         transform:\n  timezone: utc\n  time_partitioning: year_month\n  songplay_id: row_number\n",
        root = fixture.root().display()
    ))
    .unwrap();
    let session = fixture.session(config);
    pipeline::run(&session, &StageKind::ALL).await.unwrap();

    assert_eq!(
        partition_dirs(&fixture.out("time_table")),
        BTreeSet::from(["year=1970/month=1".to_string()])
    );
    assert!(fixture
        .out("songplays_table/year=1970/month=1/part-00000-test.parquet")
        .exists());

    let songplays = read_table(&fixture.out("songplays_table"));
    let ids = songplays[0]
        .column_by_name("songplay_id")
        .unwrap()
        .as_primitive::<arrow::datatypes::Int64Type>();
    assert_eq!(ids.value(0), 1);
}
