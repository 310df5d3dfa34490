//! Parquet encoding
//!
//! Part files are small enough to build in memory and hand to the object
//! store in a single put.

use crate::error::{Error, Result};
use crate::types::CompressionCodec;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, GzipLevel, ZstdLevel};
use parquet::file::properties::WriterProperties;

/// Row-group cap used when none is configured
pub const DEFAULT_ROW_GROUP_SIZE: usize = 1024 * 1024;

/// Encoding settings shared by every part file of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParquetWriterConfig {
    codec: CompressionCodec,
    row_group_size: usize,
}

impl Default for ParquetWriterConfig {
    fn default() -> Self {
        Self {
            codec: CompressionCodec::Snappy,
            row_group_size: DEFAULT_ROW_GROUP_SIZE,
        }
    }
}

impl ParquetWriterConfig {
    /// Snappy, 1M-row groups
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set compression codec
    #[must_use]
    pub fn with_codec(mut self, codec: CompressionCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Set the maximum rows per row group
    #[must_use]
    pub fn with_row_group_size(mut self, size: usize) -> Self {
        self.row_group_size = size;
        self
    }

    /// Compression codec
    pub fn codec(&self) -> CompressionCodec {
        self.codec
    }

    /// Maximum rows per row group
    pub fn row_group_size(&self) -> usize {
        self.row_group_size
    }

    /// Writer properties; files are stamped with this crate's name and version
    pub fn properties(&self) -> WriterProperties {
        WriterProperties::builder()
            .set_compression(self.codec.into())
            .set_max_row_group_size(self.row_group_size.max(1))
            .set_created_by(format!("{} version {}", crate::NAME, crate::VERSION))
            .build()
    }
}

impl From<CompressionCodec> for Compression {
    fn from(codec: CompressionCodec) -> Self {
        match codec {
            CompressionCodec::Snappy => Compression::SNAPPY,
            CompressionCodec::Zstd => Compression::ZSTD(ZstdLevel::default()),
            CompressionCodec::Gzip => Compression::GZIP(GzipLevel::default()),
            CompressionCodec::None => Compression::UNCOMPRESSED,
        }
    }
}

/// One Parquet file being built in memory
pub struct ParquetWriter {
    inner: ArrowWriter<Vec<u8>>,
    rows: usize,
}

impl ParquetWriter {
    /// Start a file with the given schema
    pub fn new(schema: SchemaRef, config: &ParquetWriterConfig) -> Result<Self> {
        let inner = ArrowWriter::try_new(Vec::new(), schema, Some(config.properties()))?;
        Ok(Self { inner, rows: 0 })
    }

    /// Append a batch; its schema must match the file's
    pub fn write(&mut self, batch: &RecordBatch) -> Result<()> {
        self.inner.write(batch)?;
        self.rows += batch.num_rows();
        Ok(())
    }

    /// Rows appended so far
    pub fn rows_written(&self) -> usize {
        self.rows
    }

    /// Close the file, returning its bytes and row count
    pub fn finish(self) -> Result<(Bytes, usize)> {
        let rows = self.rows;
        let buf = self
            .inner
            .into_inner()
            .map_err(|e| Error::output(format!("closing parquet file: {e}")))?;
        Ok((Bytes::from(buf), rows))
    }
}

/// Encode one batch as a complete Parquet file
pub fn encode_batch(batch: &RecordBatch, config: &ParquetWriterConfig) -> Result<Bytes> {
    let mut writer = ParquetWriter::new(batch.schema(), config)?;
    writer.write(batch)?;
    let (bytes, _) = writer.finish()?;
    Ok(bytes)
}
