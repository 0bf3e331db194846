use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the shaker ingestion pipeline.
///
/// Per-row parse problems never surface here; they are counted in
/// `ParseStats` and the batch continues. Every variant below aborts the batch.
#[derive(Error, Debug)]
pub enum ShakerError {
    /// The upload claims to be a ZIP archive but cannot be opened as one.
    #[error("Failed to open archive {name}: {source}")]
    ArchiveFormat {
        name: String,
        #[source]
        source: zip::result::ZipError,
    },

    /// Neither a candidate pattern nor the permissive pass produced a
    /// single valid timestamp.
    #[error("Timestamp column \"{column}\" is unparseable ({non_missing} non-missing values, none valid)")]
    TimestampUnparseable { column: String, non_missing: usize },

    /// The schema detector could not resolve a required role.
    #[error("Required {role} column not found among [{}]", .columns.join(", "))]
    RequiredColumnMissing { role: String, columns: Vec<String> },

    /// Merging produced zero rows, or no files were supplied.
    #[error("Batch is empty: {files} file(s) merged into zero rows")]
    EmptyBatch { files: usize },

    /// Every row was dropped while coercing load values and timestamps.
    #[error("No usable rows: {total} rows merged, {dropped_load} with non-numeric load, {dropped_time} with unparseable time")]
    NoUsableRows {
        total: usize,
        dropped_load: usize,
        dropped_time: usize,
    },

    /// A file could not be opened or read from disk.
    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Writing delimited output failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A JSON document could not be produced or parsed.
    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Pass-through for any raw I/O error that does not carry a path.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Catch-all for errors from third-party crates via `anyhow`.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ShakerError {
    /// Stable machine-readable reason code for the failure.
    pub fn reason_code(&self) -> &'static str {
        match self {
            ShakerError::ArchiveFormat { .. } => "archive_format",
            ShakerError::TimestampUnparseable { .. } => "timestamp_unparseable",
            ShakerError::RequiredColumnMissing { .. } => "required_column_missing",
            ShakerError::EmptyBatch { .. } => "empty_batch",
            ShakerError::NoUsableRows { .. } => "no_usable_rows",
            ShakerError::FileRead { .. } => "file_read",
            ShakerError::Config(_) => "config",
            ShakerError::Csv(_) => "csv",
            ShakerError::Json(_) => "json",
            ShakerError::Io(_) => "io",
            ShakerError::Other(_) => "other",
        }
    }
}

/// Convenience alias used throughout the shaker crates.
pub type Result<T> = std::result::Result<T, ShakerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_archive_format() {
        let err = ShakerError::ArchiveFormat {
            name: "upload.zip".to_string(),
            source: zip::result::ZipError::InvalidArchive("bad magic".into()),
        };
        let msg = err.to_string();
        assert!(msg.contains("Failed to open archive upload.zip"));
        assert_eq!(err.reason_code(), "archive_format");
    }

    #[test]
    fn test_error_display_timestamp_unparseable() {
        let err = ShakerError::TimestampUnparseable {
            column: "Timestamp".to_string(),
            non_missing: 12,
        };
        assert_eq!(
            err.to_string(),
            "Timestamp column \"Timestamp\" is unparseable (12 non-missing values, none valid)"
        );
    }

    #[test]
    fn test_error_display_required_column_missing() {
        let err = ShakerError::RequiredColumnMissing {
            role: "load".to_string(),
            columns: vec!["Date".to_string(), "Bit Depth".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Required load column not found among [Date, Bit Depth]"
        );
        assert_eq!(err.reason_code(), "required_column_missing");
    }

    #[test]
    fn test_error_display_empty_batch() {
        let err = ShakerError::EmptyBatch { files: 0 };
        assert_eq!(
            err.to_string(),
            "Batch is empty: 0 file(s) merged into zero rows"
        );
    }

    #[test]
    fn test_error_display_no_usable_rows() {
        let err = ShakerError::NoUsableRows {
            total: 10,
            dropped_load: 4,
            dropped_time: 6,
        };
        let msg = err.to_string();
        assert!(msg.contains("10 rows merged"));
        assert!(msg.contains("4 with non-numeric load"));
        assert!(msg.contains("6 with unparseable time"));
        assert_eq!(err.reason_code(), "no_usable_rows");
    }

    #[test]
    fn test_error_display_file_read() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = ShakerError::FileRead {
            path: PathBuf::from("/data/shaker.csv"),
            source: io_err,
        };
        let msg = err.to_string();
        assert!(msg.contains("Failed to read file"));
        assert!(msg.contains("/data/shaker.csv"));
        assert!(msg.contains("no such file"));
    }

    #[test]
    fn test_error_display_config() {
        let err = ShakerError::Config("threshold must be within 50-100".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: threshold must be within 50-100"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: ShakerError = io_err.into();
        assert!(err.to_string().contains("denied"));
        assert_eq!(err.reason_code(), "io");
    }

    #[test]
    fn test_error_from_serde_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{invalid}").unwrap_err();
        let err: ShakerError = json_err.into();
        assert!(err.to_string().contains("Failed to parse JSON"));
    }
}
