//! Hive-partitioned table writer
//!
//! Output layout:
//!
//! ```text
//! {destination}/{col}={value}/.../part-{NNNNN}-{run_id}.snappy.parquet
//! {destination}/_SUCCESS
//! ```
//!
//! Partition columns are dropped from the data files. Values are escaped
//! the way Hive/Spark escape path names so they can be read back by any
//! engine that understands the layout.

use super::writer::{encode_batch, ParquetWriterConfig};
use crate::error::{Error, Result};
use crate::storage::{Location, StorageClient};
use crate::types::WriteMode;
use arrow::array::{Array, ArrayRef, UInt32Array};
use arrow::compute::take_record_batch;
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use arrow::util::display::{ArrayFormatter, FormatOptions};
use bytes::Bytes;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::collections::HashMap;
use tracing::{debug, info};

/// Directory name used for null or empty partition values
pub const DEFAULT_PARTITION: &str = "__HIVE_DEFAULT_PARTITION__";

/// Marker written after every successful table write
pub const SUCCESS_MARKER: &str = "_SUCCESS";

/// Number of part files uploaded concurrently
const PUT_CONCURRENCY: usize = 8;

// ============================================================================
// Partitioning
// ============================================================================

/// Rows sharing one combination of partition values
#[derive(Debug, Clone)]
pub struct PartitionChunk {
    /// Relative directory, e.g. `year=2018/month=11` (empty when unpartitioned)
    pub dir: String,
    /// Rows with partition columns removed
    pub batch: RecordBatch,
}

/// Escape a partition value for use in a `col=value` path segment
pub fn escape_partition_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if needs_escape(c) {
            escaped.push_str(&format!("%{:02X}", c as u32));
        } else {
            escaped.push(c);
        }
    }
    escaped
}

fn needs_escape(c: char) -> bool {
    matches!(
        c,
        '"' | '#' | '%' | '\'' | '*' | '/' | ':' | '=' | '?' | '\\' | '{' | '[' | ']' | '^'
    ) || c == '\u{7f}'
        || (c as u32) < 0x20
}

/// Split a batch into one chunk per distinct combination of partition values
///
/// Chunks are returned in order of first appearance. An empty batch yields
/// no chunks.
pub fn partition_batch(
    batch: &RecordBatch,
    partition_columns: &[&str],
) -> Result<Vec<PartitionChunk>> {
    let schema = batch.schema();
    let mut partition_indices = Vec::with_capacity(partition_columns.len());
    for name in partition_columns {
        let (idx, _) = schema
            .column_with_name(name)
            .ok_or_else(|| Error::column_not_found(*name))?;
        partition_indices.push(idx);
    }

    let data_indices: Vec<usize> = (0..batch.num_columns())
        .filter(|idx| !partition_indices.contains(idx))
        .collect();
    if data_indices.is_empty() && batch.num_columns() > 0 {
        return Err(Error::output(format!(
            "cannot partition by every column ({})",
            partition_columns.join(", ")
        )));
    }

    let data = batch.project(&data_indices)?;
    if batch.num_rows() == 0 {
        return Ok(Vec::new());
    }
    if partition_columns.is_empty() {
        return Ok(vec![PartitionChunk {
            dir: String::new(),
            batch: data,
        }]);
    }

    let options = FormatOptions::default();
    let mut columns = Vec::with_capacity(partition_indices.len());
    for &idx in &partition_indices {
        let column: &ArrayRef = batch.column(idx);
        // All-null columns carry no formatter; every row is the default partition
        let formatter = match column.data_type() {
            DataType::Null => None,
            _ => Some(ArrayFormatter::try_new(column.as_ref(), &options)?),
        };
        columns.push((column.logical_nulls(), formatter));
    }

    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<u32>> = HashMap::new();

    for row in 0..batch.num_rows() {
        let mut segments = Vec::with_capacity(partition_columns.len());
        for (name, (nulls, formatter)) in partition_columns.iter().zip(&columns) {
            let is_null = nulls.as_ref().is_some_and(|n| n.is_null(row));
            let rendered = match formatter {
                Some(formatter) if !is_null => formatter.value(row).to_string(),
                _ => String::new(),
            };
            let value = if rendered.is_empty() {
                DEFAULT_PARTITION.to_string()
            } else {
                escape_partition_value(&rendered)
            };
            segments.push(format!("{}={value}", escape_partition_value(name)));
        }

        let dir = segments.join("/");
        groups
            .entry(dir.clone())
            .or_insert_with(|| {
                order.push(dir);
                Vec::new()
            })
            .push(row as u32);
    }

    order
        .into_iter()
        .map(|dir| {
            let rows = groups.remove(&dir).unwrap_or_default();
            let batch = take_record_batch(&data, &UInt32Array::from(rows))?;
            Ok(PartitionChunk { dir, batch })
        })
        .collect()
}

// ============================================================================
// Writer
// ============================================================================

/// Result of writing one table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteOutcome {
    /// Rows written
    pub rows: usize,
    /// Distinct partition directories written
    pub partitions: usize,
    /// Part files written
    pub files: usize,
    /// Whether the write was skipped because the destination existed
    pub skipped: bool,
}

/// Writes batches as partitioned Parquet tables
pub struct PartitionedWriter<'a> {
    storage: &'a StorageClient,
    config: ParquetWriterConfig,
    run_id: String,
}

impl<'a> PartitionedWriter<'a> {
    /// Create a writer; `run_id` is embedded in every part file name
    pub fn new(
        storage: &'a StorageClient,
        config: ParquetWriterConfig,
        run_id: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            config,
            run_id: run_id.into(),
        }
    }

    /// Part file name for the n-th file of this run
    pub fn part_file_name(&self, index: usize) -> String {
        format!(
            "part-{index:05}-{}{}.parquet",
            self.run_id,
            self.config.codec().file_infix()
        )
    }

    /// Write a batch to `destination`, partitioned by `partition_columns`
    pub async fn write(
        &self,
        batch: &RecordBatch,
        destination: &Location,
        partition_columns: &[&str],
        mode: WriteMode,
    ) -> Result<WriteOutcome> {
        match mode {
            WriteMode::Overwrite => self.storage.delete_prefix(destination).await?,
            WriteMode::Append => {}
            WriteMode::ErrorIfExists => {
                if self.storage.exists_any(destination).await? {
                    return Err(Error::write(destination.as_str(), "destination already exists"));
                }
            }
            WriteMode::Ignore => {
                if self.storage.exists_any(destination).await? {
                    info!(destination = %destination, "Destination exists, skipping write");
                    return Ok(WriteOutcome {
                        skipped: true,
                        ..WriteOutcome::default()
                    });
                }
            }
        }

        let chunks = partition_batch(batch, partition_columns)?;
        let partitions = chunks.len();
        debug!(destination = %destination, partitions, "Partitioned batch");

        let files: Vec<(String, Bytes)> = chunks
            .iter()
            .enumerate()
            .map(|(i, chunk)| {
                let name = self.part_file_name(i);
                let relative = if chunk.dir.is_empty() {
                    name
                } else {
                    format!("{}/{name}", chunk.dir)
                };
                Ok((relative, encode_batch(&chunk.batch, &self.config)?))
            })
            .collect::<Result<_>>()?;
        let file_count = files.len();

        stream::iter(files)
            .map(|(relative, data)| async move {
                self.storage.put(destination, &relative, data).await
            })
            .buffer_unordered(PUT_CONCURRENCY)
            .try_collect::<Vec<_>>()
            .await?;

        self.storage
            .put(destination, SUCCESS_MARKER, Bytes::new())
            .await?;

        Ok(WriteOutcome {
            rows: batch.num_rows(),
            partitions,
            files: file_count,
            skipped: false,
        })
    }
}
