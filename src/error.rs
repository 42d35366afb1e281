use std::path::PathBuf;
use thiserror::Error;

/// All errors produced while loading, aggregating or exporting a remark file.
#[derive(Error, Debug)]
pub enum ReportError {
    /// One or more required headers are absent from the sheet.
    #[error("Missing required column(s): {}", .0.join(", "))]
    MissingColumn(Vec<String>),

    /// A file could not be opened or read from disk.
    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The spreadsheet reader rejected the workbook.
    #[error("Failed to read workbook: {0}")]
    Workbook(#[from] calamine::Error),

    #[error("Failed to read CSV: {0}")]
    Csv(#[from] csv::Error),

    /// The workbook has no worksheet or the first sheet has no header row.
    #[error("No data found in {0}")]
    EmptySheet(PathBuf),

    #[error("Unsupported file type: {0}")]
    UnsupportedFormat(PathBuf),

    /// The configuration file could not be parsed.
    #[error("Configuration error: {0}")]
    Config(#[from] serde_json::Error),

    /// The JSON summary could not be serialized.
    #[error("Failed to serialize summary: {0}")]
    Summary(#[source] serde_json::Error),

    #[error("Invalid cycle pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("Invalid date range: {start} is after {end}")]
    InvalidRange {
        start: chrono::NaiveDate,
        end: chrono::NaiveDate,
    },

    /// The export workbook could not be serialized.
    #[error("Export failed: {0}")]
    Export(#[from] rust_xlsxwriter::XlsxError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ReportError>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_missing_column_lists_every_header() {
        let err = ReportError::MissingColumn(vec!["CLIENT".into(), "STATUS".into()]);
        assert_eq!(err.to_string(), "Missing required column(s): CLIENT, STATUS");
    }

    #[test]
    fn test_file_read_display() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = ReportError::FileRead {
            path: PathBuf::from("/tmp/remarks.xlsx"),
            source: io_err,
        };
        let msg = err.to_string();
        assert!(msg.contains("/tmp/remarks.xlsx"));
        assert!(msg.contains("no such file"));
    }

    #[test]
    fn test_invalid_range_display() {
        let err = ReportError::InvalidRange {
            start: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid date range: 2024-02-01 is after 2024-01-01"
        );
    }

    #[test]
    fn test_error_from_serde_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{invalid}").unwrap_err();
        let err: ReportError = json_err.into();
        assert!(err.to_string().starts_with("Configuration error"));
    }

    #[test]
    fn test_summary_error_is_not_reported_as_config() {
        let json_err = serde_json::from_str::<serde_json::Value>("[").unwrap_err();
        let err = ReportError::Summary(json_err);
        assert!(err.to_string().starts_with("Failed to serialize summary"));
    }
}
