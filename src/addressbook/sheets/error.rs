use std::path::PathBuf;

use thiserror::Error;

/// Convenient alias for fallible results returned throughout the crate.
pub type Result<T> = std::result::Result<T, ExportError>;

/// Error type covering the failures that abort an export run. Problems with
/// a single attribute or a single upload batch are not errors at this level;
/// they are recorded on the contact or in the upload report instead.
#[derive(Debug, Error)]
pub enum ExportError {
    /// Wrapper for IO failures such as reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Raised when JSON parsing or serialization fails.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Errors bubbled up from the Excel writer implementation.
    #[error("Excel write error: {0}")]
    ExcelWrite(#[from] rust_xlsxwriter::XlsxError),

    /// Errors bubbled up from the delimited text writer.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Transport-level HTTP failures.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The spreadsheet service answered with a non-success status.
    #[error("Sheets API error {status}: {message}")]
    SheetsApi { status: u16, message: String },

    /// Raised when a request URL cannot be built from the API base.
    #[error("invalid API endpoint '{base}': {reason}")]
    Endpoint { base: String, reason: String },

    /// Raised when a cell would not fit the destination worksheet.
    #[error("cell at row {row}, column {column} exceeds the worksheet limit: {reason}")]
    CellLimit {
        row: usize,
        column: usize,
        reason: String,
    },

    /// The configured sheet tab does not exist in the spreadsheet.
    #[error("sheet '{0}' not found in spreadsheet")]
    SheetNotFound(String),

    /// Raised when the address-book export cannot be read as a whole.
    #[error("invalid contact source: {0}")]
    InvalidSource(String),

    /// Raised when the input file extension is not a known address-book format.
    #[error("unsupported contact source: {0}")]
    UnsupportedSource(PathBuf),

    /// Raised when the user provides a path that does not exist.
    #[error("input file not found: {0}")]
    MissingInput(PathBuf),

    /// Raised when a required setting is absent from flags and environment.
    #[error("missing configuration value: {0}")]
    MissingConfig(&'static str),

    /// Raised when the OAuth client secrets are missing or malformed.
    #[error("invalid credentials: {0}")]
    Credentials(String),

    /// Raised when no usable access token can be obtained.
    #[error("authorization failed: {0}")]
    Auth(String),

    /// Raised when the tracing subscriber fails to initialise.
    #[error("failed to initialise logging: {0}")]
    Logging(String),
}
