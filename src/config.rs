//! Job configuration
//!
//! All settings live in one optional YAML file. Every key has a default equal
//! to the reference behaviour, so an empty file (or none at all) runs the
//! job against the public Udacity buckets.
//!
//! ```yaml
//! input:
//!   song_data: s3a://udacity-dend/song_data/A/A/A/
//!   log_data: s3a://udacity-dend/log-data/*/*/*.json
//! output:
//!   base: s3a://emr-test4/
//! transform:
//!   timezone: utc
//! ```

use crate::credentials::Credentials;
use crate::error::{Error, Result};
use crate::output::{ParquetWriterConfig, DEFAULT_ROW_GROUP_SIZE};
use crate::storage::{Location, StorageOptions};
use crate::types::{
    CompressionCodec, InvalidValuePolicy, JoinKeyMode, MalformedRecordPolicy, OptionStringExt,
    OutputTable, SongplayIdStrategy, TimePartitioning, TimeZoneSetting, WriteMode,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Config file picked up from the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "etl.yaml";

// ============================================================================
// Top-Level Config
// ============================================================================

/// Complete job configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EtlConfig {
    /// Source locations
    #[serde(default)]
    pub input: InputConfig,

    /// Destination and file format
    #[serde(default)]
    pub output: OutputConfig,

    /// Object storage connection
    #[serde(default)]
    pub storage: StorageConfig,

    /// Transformation knobs
    #[serde(default)]
    pub transform: TransformConfig,

    /// Execution options
    #[serde(default)]
    pub run: RunConfig,
}

// ============================================================================
// Sections
// ============================================================================

/// Source locations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InputConfig {
    /// Song metadata read by the song dimension stage
    #[serde(default = "default_song_data")]
    pub song_data: String,

    /// Song metadata joined against plays; falls back to `song_data` when null
    #[serde(default = "default_songplays_song_data")]
    pub songplays_song_data: Option<String>,

    /// Event logs
    #[serde(default = "default_log_data")]
    pub log_data: String,

    /// Handling of lines that are not JSON objects
    #[serde(default)]
    pub malformed_records: MalformedRecordPolicy,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            song_data: default_song_data(),
            songplays_song_data: default_songplays_song_data(),
            log_data: default_log_data(),
            malformed_records: MalformedRecordPolicy::default(),
        }
    }
}

fn default_song_data() -> String {
    "s3a://udacity-dend/song_data/A/A/A/".to_string()
}

fn default_songplays_song_data() -> Option<String> {
    Some("s3a://udacity-dend/song_data/A/*/*/*.json".to_string())
}

fn default_log_data() -> String {
    "s3a://udacity-dend/log-data/*/*/*.json".to_string()
}

/// Destination and Parquet settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    /// Base location; each table gets its own directory below it
    #[serde(default = "default_output_base")]
    pub base: String,

    /// Parquet compression codec
    #[serde(default)]
    pub compression: CompressionCodec,

    /// Maximum rows per row group
    #[serde(default = "default_row_group_size")]
    pub row_group_size: usize,

    /// Treatment of existing data at each table destination
    #[serde(default)]
    pub write_mode: WriteMode,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            base: default_output_base(),
            compression: CompressionCodec::default(),
            row_group_size: default_row_group_size(),
            write_mode: WriteMode::default(),
        }
    }
}

fn default_output_base() -> String {
    "s3a://emr-test4/".to_string()
}

fn default_row_group_size() -> usize {
    DEFAULT_ROW_GROUP_SIZE
}

/// Object storage connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Key-value file holding the access key pair
    #[serde(default = "default_credentials_file")]
    pub credentials_file: PathBuf,

    /// Bucket region
    #[serde(default = "default_region")]
    pub region: Option<String>,

    /// Custom S3-compatible endpoint
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            credentials_file: default_credentials_file(),
            region: default_region(),
            endpoint: None,
        }
    }
}

fn default_credentials_file() -> PathBuf {
    PathBuf::from("dl.cfg")
}

fn default_region() -> Option<String> {
    Some("us-west-2".to_string())
}

/// Transformation knobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransformConfig {
    /// Zone used to render timestamps
    #[serde(default)]
    pub timezone: TimeZoneSetting,

    /// Handling of values a derivation cannot interpret
    #[serde(default)]
    pub invalid_values: InvalidValuePolicy,

    /// Source of `songplay_id`
    #[serde(default)]
    pub songplay_id: SongplayIdStrategy,

    /// Partition layout of the time table
    #[serde(default)]
    pub time_partitioning: TimePartitioning,

    /// Comparison of the (artist, title) join key
    #[serde(default)]
    pub join_key: JoinKeyMode,

    /// De-duplicate the songplays projection
    #[serde(default = "default_true")]
    pub distinct_songplays: bool,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            timezone: TimeZoneSetting::default(),
            invalid_values: InvalidValuePolicy::default(),
            songplay_id: SongplayIdStrategy::default(),
            time_partitioning: TimePartitioning::default(),
            join_key: JoinKeyMode::default(),
            distinct_songplays: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Execution options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    /// Run both stages concurrently
    #[serde(default)]
    pub parallel_stages: bool,
}

// ============================================================================
// Loading
// ============================================================================

impl EtlConfig {
    /// Load and validate a config file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::config(format!("config file '{}' not found", path.display()))
            } else {
                Error::config(format!("Failed to read config file '{}': {e}", path.display()))
            }
        })?;
        Self::from_yaml_str(&content)
    }

    /// Parse and validate a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: EtlConfig = if yaml.trim().is_empty() {
            EtlConfig::default()
        } else {
            serde_yaml::from_str(yaml)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Load the given file, else `etl.yaml` if present, else the defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                Self::from_file(DEFAULT_CONFIG_FILE)
            }
            None => {
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    /// Check every location and numeric setting
    pub fn validate(&self) -> Result<()> {
        self.song_data_location()?;
        self.songplays_song_data_location()?;
        self.log_data_location()?;

        let base = self.output_base()?;
        if base.has_glob() {
            return Err(Error::invalid_value(
                "output.base",
                format!("'{base}' must not contain a pattern"),
            ));
        }

        if self.output.row_group_size == 0 {
            return Err(Error::invalid_value(
                "output.row_group_size",
                "must be greater than zero",
            ));
        }

        Ok(())
    }

    // ========================================================================
    // Overrides
    // ========================================================================

    /// Replace the output base
    #[must_use]
    pub fn with_output_base(mut self, base: impl Into<String>) -> Self {
        self.output.base = base.into();
        self
    }

    /// Replace the song metadata location for both stages
    #[must_use]
    pub fn with_song_data(mut self, location: impl Into<String>) -> Self {
        self.input.song_data = location.into();
        self.input.songplays_song_data = None;
        self
    }

    /// Replace the log location
    #[must_use]
    pub fn with_log_data(mut self, location: impl Into<String>) -> Self {
        self.input.log_data = location.into();
        self
    }

    /// Replace the credentials file
    #[must_use]
    pub fn with_credentials_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage.credentials_file = path.into();
        self
    }

    // ========================================================================
    // Resolved Values
    // ========================================================================

    /// Song metadata for the song dimension stage
    pub fn song_data_location(&self) -> Result<Location> {
        Location::parse(&self.input.song_data)
    }

    /// Song metadata for the songplays join
    pub fn songplays_song_data_location(&self) -> Result<Location> {
        match self.input.songplays_song_data.clone().none_if_empty() {
            Some(location) => Location::parse(&location),
            None => self.song_data_location(),
        }
    }

    /// Event logs
    pub fn log_data_location(&self) -> Result<Location> {
        Location::parse(&self.input.log_data)
    }

    /// Output base
    pub fn output_base(&self) -> Result<Location> {
        Location::parse(&self.output.base)
    }

    /// Destination of one output table
    pub fn table_location(&self, table: OutputTable) -> Result<Location> {
        Ok(self.output_base()?.join(table.dir_name()))
    }

    /// Partition columns of one output table
    pub fn partition_columns(&self, table: OutputTable) -> &'static [&'static str] {
        match table {
            OutputTable::Songs => &["artist_id", "year"],
            OutputTable::Artists => &["artist_name"],
            OutputTable::Users => &["lastName"],
            OutputTable::Time => self.transform.time_partitioning.columns(),
            OutputTable::Songplays => &["year", "month"],
        }
    }

    /// Whether any configured location lives in remote storage
    pub fn requires_credentials(&self) -> Result<bool> {
        Ok([
            self.song_data_location()?,
            self.songplays_song_data_location()?,
            self.log_data_location()?,
            self.output_base()?,
        ]
        .iter()
        .any(|location| location.scheme().is_remote()))
    }

    /// Load credentials when a remote location needs them
    pub fn load_credentials(&self) -> Result<Option<Credentials>> {
        if self.requires_credentials()? {
            Credentials::from_file(&self.storage.credentials_file).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Object store connection options
    pub fn storage_options(&self) -> StorageOptions {
        StorageOptions {
            region: self.storage.region.clone().none_if_empty(),
            endpoint: self.storage.endpoint.clone().none_if_empty(),
        }
    }

    /// Parquet encoder settings
    pub fn parquet_config(&self) -> ParquetWriterConfig {
        ParquetWriterConfig::new()
            .with_codec(self.output.compression)
            .with_row_group_size(self.output.row_group_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_defaults_match_reference_job() {
        let config = EtlConfig::from_yaml_str("").unwrap();
        assert_eq!(config.input.song_data, "s3a://udacity-dend/song_data/A/A/A/");
        assert_eq!(
            config.input.songplays_song_data.as_deref(),
            Some("s3a://udacity-dend/song_data/A/*/*/*.json")
        );
        assert_eq!(config.input.log_data, "s3a://udacity-dend/log-data/*/*/*.json");
        assert_eq!(config.output.base, "s3a://emr-test4/");
        assert_eq!(config.output.row_group_size, 1_048_576);
        assert_eq!(config.storage.region.as_deref(), Some("us-west-2"));
        assert!(config.transform.distinct_songplays);
        assert!(!config.run.parallel_stages);
        assert!(config.requires_credentials().unwrap());
    }

    #[test]
    fn test_example_file_spells_out_defaults() {
        let example = EtlConfig::from_yaml_str(include_str!("../etl.example.yaml")).unwrap();
        assert_eq!(example, EtlConfig::default());
    }

    #[test]
    fn test_partial_yaml_keeps_other_defaults() {
        let config = EtlConfig::from_yaml_str(
            r#"
output:
  base: /tmp/out
  compression: zstd
transform:
  timezone: utc
  time_partitioning: year_month
  songplay_id: row_number
"#,
        )
        .unwrap();

        assert_eq!(config.output.compression, CompressionCodec::Zstd);
        assert_eq!(config.output.write_mode, WriteMode::Overwrite);
        assert_eq!(config.transform.timezone, TimeZoneSetting::Utc);
        assert_eq!(config.transform.songplay_id, SongplayIdStrategy::RowNumber);
        assert_eq!(config.partition_columns(OutputTable::Time), &["year", "month"]);
        assert_eq!(config.input.log_data, "s3a://udacity-dend/log-data/*/*/*.json");
    }

    #[test]
    fn test_songplays_song_data_null_falls_back() {
        let config = EtlConfig::from_yaml_str(
            "input:\n  song_data: /data/songs\n  songplays_song_data: null\n",
        )
        .unwrap();
        assert_eq!(
            config.songplays_song_data_location().unwrap(),
            config.song_data_location().unwrap()
        );
    }

    #[test]
    fn test_with_song_data_unifies_sources() {
        let config = EtlConfig::default().with_song_data("/data/songs");
        assert_eq!(config.songplays_song_data_location().unwrap().key(), "data/songs");
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = EtlConfig::from_yaml_str("output:\n  bsae: /tmp\n").unwrap_err();
        assert!(matches!(err, Error::YamlParse(_)));
    }

    #[test]
    fn test_invalid_values() {
        assert!(EtlConfig::from_yaml_str("transform:\n  timezone: nowhere\n").is_err());
        assert!(EtlConfig::from_yaml_str("output:\n  write_mode: replace\n").is_err());

        let err = EtlConfig::from_yaml_str("output:\n  row_group_size: 0\n").unwrap_err();
        assert!(matches!(err, Error::InvalidConfigValue { .. }));

        let err = EtlConfig::from_yaml_str("output:\n  base: s3://b/out/*\n").unwrap_err();
        assert!(err.is_configuration());

        let err = EtlConfig::from_yaml_str("input:\n  log_data: ftp://host/logs\n").unwrap_err();
        assert!(matches!(err, Error::InvalidLocation { .. }));
    }

    #[test]
    fn test_table_locations_and_partitions() {
        let config = EtlConfig::default();
        assert_eq!(
            config.table_location(OutputTable::Songs).unwrap().as_str(),
            "s3a://emr-test4/songs_table"
        );
        assert_eq!(
            config.table_location(OutputTable::Songplays).unwrap().key(),
            "songplays_table"
        );
        assert_eq!(config.partition_columns(OutputTable::Songs), &["artist_id", "year"]);
        assert_eq!(config.partition_columns(OutputTable::Artists), &["artist_name"]);
        assert_eq!(config.partition_columns(OutputTable::Users), &["lastName"]);
        assert_eq!(config.partition_columns(OutputTable::Time), &["hour"]);
        assert_eq!(config.partition_columns(OutputTable::Songplays), &["year", "month"]);
    }

    #[test]
    fn test_local_only_needs_no_credentials() {
        let config = EtlConfig::default()
            .with_song_data("/data/songs")
            .with_log_data("/data/logs/*.json")
            .with_output_base("/data/out")
            .with_credentials_file("/definitely/missing/dl.cfg");
        assert!(!config.requires_credentials().unwrap());
        assert!(config.load_credentials().unwrap().is_none());
    }

    #[test]
    fn test_remote_requires_credentials_file() {
        let config = EtlConfig::default().with_credentials_file("/definitely/missing/dl.cfg");
        let err = config.load_credentials().unwrap_err();
        assert!(matches!(err, Error::Credentials { .. }));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "run:\n  parallel_stages: true").unwrap();
        let config = EtlConfig::from_file(file.path()).unwrap();
        assert!(config.run.parallel_stages);

        let err = EtlConfig::from_file("/definitely/missing/etl.yaml").unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_parquet_config() {
        let yaml = "output:\n  compression: none\n  row_group_size: 10\n";
        let config = EtlConfig::from_yaml_str(yaml).unwrap();
        let parquet = config.parquet_config();
        assert_eq!(parquet.codec(), CompressionCodec::None);
        assert_eq!(parquet.row_group_size(), 10);
    }
}
