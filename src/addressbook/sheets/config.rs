use std::path::PathBuf;
use std::time::Duration;

use crate::addressbook::sheets::error::{ExportError, Result};
use crate::addressbook::sheets::upload::{DEFAULT_BATCH_SIZE, UploadOptions};

pub const DEFAULT_SHEET_NAME: &str = "Contacts";
pub const DEFAULT_EXPORT_DIR: &str = "exports";
pub const DEFAULT_CREDENTIALS_PATH: &str = "credentials.json";
pub const DEFAULT_TOKEN_PATH: &str = "token.json";
/// One write per second stays under the Sheets per-minute write quota.
pub const DEFAULT_BATCH_DELAY_MS: u64 = 1000;

/// Settings resolved from flags and environment for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportConfig {
    pub sheet_id: Option<String>,
    pub sheet_name: String,
    pub export_dir: PathBuf,
    pub credentials: PathBuf,
    pub token: PathBuf,
    pub upload: UploadOptions,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            sheet_id: None,
            sheet_name: DEFAULT_SHEET_NAME.to_string(),
            export_dir: PathBuf::from(DEFAULT_EXPORT_DIR),
            credentials: PathBuf::from(DEFAULT_CREDENTIALS_PATH),
            token: PathBuf::from(DEFAULT_TOKEN_PATH),
            upload: UploadOptions::new(
                DEFAULT_BATCH_SIZE,
                Duration::from_millis(DEFAULT_BATCH_DELAY_MS),
            ),
        }
    }
}

impl ExportConfig {
    /// The spreadsheet id; blank values count as missing.
    pub fn require_sheet_id(&self) -> Result<&str> {
        self.sheet_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or(ExportError::MissingConfig("GOOGLE_SHEET_ID"))
    }
}
