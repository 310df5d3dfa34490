//! Engine session
//!
//! The one handle both stages share: resolved configuration, an object store
//! client built from explicit credentials, and the run identifier stamped on
//! every file the run writes.

use crate::config::EtlConfig;
use crate::credentials::Credentials;
use crate::error::{Error, Result};
use crate::output::PartitionedWriter;
use crate::pipeline::{SourceReport, TableReport};
use crate::storage::{Location, StorageClient};
use crate::table::{parse_json_records, Table};
use crate::types::OutputTable;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

/// Shared engine handle for one run
#[derive(Debug)]
pub struct EtlSession {
    config: EtlConfig,
    storage: StorageClient,
    run_id: String,
}

impl EtlSession {
    /// Create a session
    ///
    /// Credentials must be present when any configured location is remote.
    pub fn new(config: EtlConfig, credentials: Option<Credentials>) -> Result<Self> {
        config.validate()?;
        if credentials.is_none() && config.requires_credentials()? {
            return Err(Error::credentials(
                "remote storage is configured but no credentials were provided",
            ));
        }

        let storage = StorageClient::new(credentials, config.storage_options());
        Ok(Self {
            config,
            storage,
            run_id: new_run_id(),
        })
    }

    /// Create a session, loading credentials from the configured file if needed
    pub fn from_config(config: EtlConfig) -> Result<Self> {
        let credentials = config.load_credentials()?;
        Self::new(config, credentials)
    }

    /// Use a fixed run identifier (part file names become reproducible)
    #[must_use]
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    /// Resolved configuration
    pub fn config(&self) -> &EtlConfig {
        &self.config
    }

    /// Object store client
    pub fn storage(&self) -> &StorageClient {
        &self.storage
    }

    /// Run identifier
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Load every JSON record selected by a location into one table
    ///
    /// An empty selection, or one holding no records, is a source error.
    pub async fn load_json(&self, location: &Location) -> Result<(Table, SourceReport)> {
        let policy = self.config.input.malformed_records;
        let objects = self.storage.read_all(location).await?;

        let mut records = Vec::new();
        let mut malformed = 0;
        for (path, bytes) in &objects {
            let text = std::str::from_utf8(bytes)
                .map_err(|e| Error::source_read(path.as_str(), format!("not UTF-8: {e}")))?;
            let parsed = parse_json_records(text, policy, path)?;
            malformed += parsed.malformed;
            records.extend(parsed.records);
        }

        if records.is_empty() {
            return Err(Error::source_read(location.as_str(), "no records found"));
        }

        debug!(
            location = %location,
            objects = objects.len(),
            records = records.len(),
            malformed,
            "Loaded JSON source"
        );

        let report = SourceReport {
            location: location.to_string(),
            objects: objects.len(),
            records: records.len(),
            malformed,
        };
        Ok((Table::from_json_records(&records)?, report))
    }

    /// Write one output table to its configured destination
    pub async fn write_table(&self, table: OutputTable, data: &Table) -> Result<TableReport> {
        let destination = self.config.table_location(table)?;
        let partition_columns = self.config.partition_columns(table);

        let writer =
            PartitionedWriter::new(&self.storage, self.config.parquet_config(), &self.run_id);
        let outcome = writer
            .write(
                data.batch(),
                &destination,
                partition_columns,
                self.config.output.write_mode,
            )
            .await
            .map_err(|e| Error::table_write(table, e))?;

        info!(
            table = %table,
            rows = outcome.rows,
            partitions = outcome.partitions,
            path = %destination,
            "Wrote table"
        );

        Ok(TableReport {
            table,
            rows: outcome.rows,
            partitions: outcome.partitions,
            files: outcome.files,
            path: destination.to_string(),
            skipped: outcome.skipped,
        })
    }
}

/// Time-based run identifier
fn new_run_id() -> String {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    format!("{timestamp:x}")
}
