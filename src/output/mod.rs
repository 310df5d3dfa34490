//! Output module
//!
//! Handles Parquet encoding and partitioned table writes.
//!
//! # Overview
//!
//! This module provides utilities for:
//! - Encoding Arrow RecordBatches as Parquet files
//! - Splitting batches by partition values into Hive-style directories
//! - Writing tables to object storage with overwrite/append semantics

mod partitioned;
mod writer;

pub use partitioned::{
    escape_partition_value, partition_batch, PartitionChunk, PartitionedWriter, WriteOutcome,
    DEFAULT_PARTITION, SUCCESS_MARKER,
};
pub use writer::{encode_batch, ParquetWriter, ParquetWriterConfig, DEFAULT_ROW_GROUP_SIZE};
