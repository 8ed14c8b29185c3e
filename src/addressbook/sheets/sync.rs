use std::fmt;
use std::path::{Path, PathBuf};

use reqwest::Url;
use tracing::{debug, info, instrument, warn};

use crate::addressbook::sheets::config::ExportConfig;
use crate::addressbook::sheets::error::Result;
use crate::addressbook::sheets::io::google_sheets::SheetsClient;
use crate::addressbook::sheets::io::xlsx_sheet::XlsxSheet;
use crate::addressbook::sheets::io::{backup, delimited, oauth, source};
use crate::addressbook::sheets::model::ColumnLayout;
use crate::addressbook::sheets::normalize::{ContactTable, build_table};
use crate::addressbook::sheets::upload::{
    BatchUploader, SheetWriter, UploadOptions, UploadProgress, UploadReport,
};

/// What one export pass did, printed at the end of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub contacts_seen: usize,
    pub contacts_skipped: usize,
    pub rows_normalized: usize,
    pub backup: Option<PathBuf>,
    pub upload: Option<UploadReport>,
}

impl RunSummary {
    pub fn failed_batches(&self) -> Vec<usize> {
        self.upload
            .as_ref()
            .map(UploadReport::failed_batches)
            .unwrap_or_default()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "contacts seen: {} (skipped: {})",
            self.contacts_seen, self.contacts_skipped
        )?;
        write!(f, "rows normalized: {}", self.rows_normalized)?;
        if let Some(path) = &self.backup {
            write!(f, "\nbackup: {}", path.display())?;
        }
        if let Some(report) = &self.upload {
            write!(f, "\nrows uploaded: {report}")?;
            let failed = report.failed_batches();
            if !failed.is_empty() {
                let indices: Vec<String> = failed.iter().map(usize::to_string).collect();
                write!(f, "\nfailed batches: {}", indices.join(", "))?;
            }
            if let Some(error) = &report.formatting_error {
                write!(f, "\nformatting failed: {error}")?;
            }
        }
        Ok(())
    }
}

struct LoadedTable {
    table: ContactTable,
    seen: usize,
    skipped: usize,
}

fn load_table(input: &Path, layout: ColumnLayout) -> Result<LoadedTable> {
    let read = source::read_contacts(input)?;
    let unreadable: usize = read.contacts.iter().map(|contact| contact.unreadable_count()).sum();
    if unreadable > 0 {
        warn!(unreadable, "some contact fields could not be read and were left empty");
    }
    let table = build_table(&read.contacts, layout);
    debug!(rows = table.rows.len(), columns = table.headers.len(), "contacts normalized");
    Ok(LoadedTable {
        seen: read.seen(),
        skipped: read.skipped,
        table,
    })
}

fn log_progress(progress: &UploadProgress) {
    let percent = if progress.total == 0 {
        100
    } else {
        progress.written * 100 / progress.total
    };
    info!(
        batch = progress.batch + 1,
        batches = progress.batches,
        written = progress.written,
        total = progress.total,
        percent,
        "upload progress"
    );
}

/// Pushes a normalized table through `writer` in batches.
pub fn upload_table(
    table: &ContactTable,
    writer: &mut dyn SheetWriter,
    options: UploadOptions,
) -> Result<UploadReport> {
    let headers = table.headers.names();
    let mut uploader = BatchUploader::new(options).on_progress(log_progress);
    let report = uploader.upload(writer, &headers, &table.rows)?;
    info!(
        uploaded = report.rows_uploaded,
        total = report.rows_total,
        failed_batches = report.failures.len(),
        "upload finished"
    );
    Ok(report)
}

fn export_through(
    input: &Path,
    layout: ColumnLayout,
    config: &ExportConfig,
    take_backup: bool,
    writer: &mut dyn SheetWriter,
) -> Result<RunSummary> {
    let loaded = load_table(input, layout)?;
    let backup = if take_backup {
        let path = backup::write_backup(&config.export_dir, &loaded.table)?;
        info!(backup = %path.display(), "backup written");
        Some(path)
    } else {
        None
    };
    let report = upload_table(&loaded.table, writer, config.upload)?;
    Ok(RunSummary {
        contacts_seen: loaded.seen,
        contacts_skipped: loaded.skipped,
        rows_normalized: loaded.table.rows.len(),
        backup,
        upload: Some(report),
    })
}

/// Authenticates, then exports every contact into the configured Google
/// Sheets tab.
#[instrument(
    level = "info",
    skip_all,
    fields(input = %input.display(), ?layout, sheet = %config.sheet_name)
)]
pub fn export_to_google_sheets(
    input: &Path,
    layout: ColumnLayout,
    config: &ExportConfig,
    take_backup: bool,
) -> Result<RunSummary> {
    let sheet_id = config.require_sheet_id()?;
    let access_token = oauth::authorize(&config.credentials, &config.token)?;
    let mut client = SheetsClient::new(sheet_id, config.sheet_name.as_str(), access_token)?;
    let summary = export_through(input, layout, config, take_backup, &mut client)?;
    info!(url = %client.web_url(), "spreadsheet updated");
    Ok(summary)
}

/// Exports every contact into a local workbook with the same layout and
/// formatting as the Google Sheets destination.
#[instrument(
    level = "info",
    skip_all,
    fields(input = %input.display(), output = %output.display(), ?layout)
)]
pub fn export_to_xlsx(
    input: &Path,
    output: &Path,
    layout: ColumnLayout,
    config: &ExportConfig,
    take_backup: bool,
) -> Result<RunSummary> {
    let mut sheet = XlsxSheet::new(&config.sheet_name)?;
    let summary = export_through(input, layout, config, take_backup, &mut sheet)?;
    sheet.save(output)?;
    Ok(summary)
}

/// Writes every contact to a fully quoted CSV file for manual import.
#[instrument(
    level = "info",
    skip_all,
    fields(input = %input.display(), output = %output.display(), ?layout)
)]
pub fn export_to_csv(input: &Path, output: &Path, layout: ColumnLayout) -> Result<RunSummary> {
    let loaded = load_table(input, layout)?;
    delimited::write_csv(output, &loaded.table)?;
    info!(rows = loaded.table.rows.len(), "CSV written");
    Ok(RunSummary {
        contacts_seen: loaded.seen,
        contacts_skipped: loaded.skipped,
        rows_normalized: loaded.table.rows.len(),
        backup: None,
        upload: None,
    })
}

/// Where the one-time authorization stands after `setup`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetupOutcome {
    /// A cached grant already exists.
    Ready,
    /// No grant yet; the user must open this URL and pass back the code.
    ConsentRequired(Url),
    /// The code was exchanged and the grant stored at this path.
    TokenSaved(PathBuf),
}

/// Prepares the working directory and the OAuth grant.
#[instrument(level = "info", skip_all, fields(credentials = %config.credentials.display()))]
pub fn setup(config: &ExportConfig, auth_code: Option<&str>) -> Result<SetupOutcome> {
    std::fs::create_dir_all(&config.export_dir)?;
    let secrets = oauth::load_client_secrets(&config.credentials)?;

    if let Some(code) = auth_code {
        let client = reqwest::blocking::Client::builder().build()?;
        let token = oauth::exchange_code(&client, &secrets, code)?;
        oauth::save_token(&config.token, &token)?;
        info!(token = %config.token.display(), "authorization stored");
        return Ok(SetupOutcome::TokenSaved(config.token.clone()));
    }

    if oauth::load_token(&config.token)?.is_some() {
        return Ok(SetupOutcome::Ready);
    }
    Ok(SetupOutcome::ConsentRequired(oauth::consent_url(&secrets)?))
}
