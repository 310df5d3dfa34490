//! Error types for songplay-etl
//!
//! This module defines the error hierarchy for the whole job.
//! All public APIs return `Result<T, Error>` where Error is defined here.

use crate::types::OutputTable;
use thiserror::Error;

/// The main error type for songplay-etl
#[derive(Error, Debug)]
pub enum Error {
    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Missing required config field: {field}")]
    MissingConfigField { field: String },

    #[error("Invalid config value for '{field}': {message}")]
    InvalidConfigValue { field: String, message: String },

    #[error("Credentials error: {message}")]
    Credentials { message: String },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    // ============================================================================
    // Source Errors
    // ============================================================================
    #[error("Failed to read source '{path}': {message}")]
    SourceRead { path: String, message: String },

    #[error("Invalid storage location '{location}': {message}")]
    InvalidLocation { location: String, message: String },

    // ============================================================================
    // Transform Errors
    // ============================================================================
    #[error("Transform error: {message}")]
    Transform { message: String },

    #[error("Column not found: {column}")]
    ColumnNotFound { column: String },

    #[error("Invalid timestamp value: {value}")]
    InvalidTimestamp { value: String },

    // ============================================================================
    // Arrow/Parquet Errors
    // ============================================================================
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Output error: {message}")]
    Output { message: String },

    #[error("Failed to write '{path}': {message}")]
    Write { path: String, message: String },

    #[error("Failed to write {table} table: {source}")]
    TableWrite {
        table: OutputTable,
        #[source]
        source: Box<Error>,
    },

    // ============================================================================
    // Storage Errors
    // ============================================================================
    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("Invalid object path: {0}")]
    ObjectPath(#[from] object_store::path::Error),

    // ============================================================================
    // I/O Errors
    // ============================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ============================================================================
    // Generic Errors
    // ============================================================================
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a missing field error
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingConfigField {
            field: field.into(),
        }
    }

    /// Create an invalid config value error
    pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfigValue {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a credentials error
    pub fn credentials(message: impl Into<String>) -> Self {
        Self::Credentials {
            message: message.into(),
        }
    }

    /// Create a source read error
    pub fn source_read(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SourceRead {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an invalid location error
    pub fn invalid_location(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidLocation {
            location: location.into(),
            message: message.into(),
        }
    }

    /// Create a transform error
    pub fn transform(message: impl Into<String>) -> Self {
        Self::Transform {
            message: message.into(),
        }
    }

    /// Create a column not found error
    pub fn column_not_found(column: impl Into<String>) -> Self {
        Self::ColumnNotFound {
            column: column.into(),
        }
    }

    /// Create an output error
    pub fn output(message: impl Into<String>) -> Self {
        Self::Output {
            message: message.into(),
        }
    }

    /// Create a write error
    pub fn write(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Write {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Attach the output table a write failure belongs to
    pub fn table_write(table: OutputTable, source: Error) -> Self {
        Self::TableWrite {
            table,
            source: Box::new(source),
        }
    }

    /// Check if this error happened before any engine work started
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::Config { .. }
                | Error::MissingConfigField { .. }
                | Error::InvalidConfigValue { .. }
                | Error::Credentials { .. }
                | Error::YamlParse(_)
                | Error::InvalidLocation { .. }
        )
    }
}

/// Result type alias for songplay-etl
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::config("test message");
        assert_eq!(err.to_string(), "Configuration error: test message");

        let err = Error::missing_field("output.base");
        assert_eq!(err.to_string(), "Missing required config field: output.base");

        let err = Error::source_read("s3://bucket/logs/*.json", "no objects matched");
        assert_eq!(
            err.to_string(),
            "Failed to read source 's3://bucket/logs/*.json': no objects matched"
        );

        let err = Error::column_not_found("ts");
        assert_eq!(err.to_string(), "Column not found: ts");
    }

    #[test]
    fn test_is_configuration() {
        assert!(Error::config("bad").is_configuration());
        assert!(Error::credentials("missing key").is_configuration());
        assert!(Error::missing_field("input.log_data").is_configuration());
        assert!(Error::invalid_location("ftp://x", "unsupported scheme").is_configuration());

        assert!(!Error::source_read("x", "y").is_configuration());
        assert!(!Error::transform("bad ts").is_configuration());
        assert!(!Error::write("out", "denied").is_configuration());
    }

    #[test]
    fn test_table_write_keeps_source() {
        let err = Error::table_write(
            OutputTable::Users,
            Error::write("out/users_table", "destination already exists"),
        );
        assert_eq!(
            err.to_string(),
            "Failed to write users table: \
             Failed to write 'out/users_table': destination already exists"
        );
        assert!(matches!(
            &err,
            Error::TableWrite { source, .. } if matches!(**source, Error::Write { .. })
        ));
        assert!(std::error::Error::source(&err).is_some());
        assert!(!err.is_configuration());
    }
}
