//! Sequential, fixed-size batch uploads against a spreadsheet handle.
//!
//! Rows are written in source order, one batch per request. A failing batch
//! is recorded and skipped; the remaining batches are still attempted and the
//! formatting pass runs once after the last batch.

use std::fmt;
use std::thread;
use std::time::Duration;

use tracing::{debug, instrument, warn};

use crate::addressbook::sheets::error::Result;
use crate::addressbook::sheets::model::NormalizedRow;

/// Rows per write request. Keeps a 25-column request well inside the
/// provider's payload limit.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Dimensions handed to the formatting pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SheetShape {
    pub columns: usize,
    pub data_rows: usize,
}

impl SheetShape {
    /// Row count including the header row.
    pub fn total_rows(&self) -> usize {
        self.data_rows + 1
    }
}

/// An authenticated destination able to receive rows.
pub trait SheetWriter {
    /// Clears previous content and writes the header row.
    fn prepare(&mut self, headers: &[String]) -> Result<()>;

    /// Writes `rows` starting at the zero-based data row `start_row`; the
    /// header row is not counted.
    fn write_rows(&mut self, start_row: usize, rows: &[NormalizedRow]) -> Result<()>;

    /// Styles the header, enables filtering and sizes the columns.
    fn apply_formatting(&mut self, shape: &SheetShape) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadOptions {
    pub batch_size: usize,
    /// Pause between consecutive batches, used to stay under per-minute
    /// write quotas.
    pub batch_delay: Duration,
}

impl UploadOptions {
    pub fn new(batch_size: usize, batch_delay: Duration) -> Self {
        Self {
            batch_size: batch_size.max(1),
            batch_delay,
        }
    }
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE, Duration::ZERO)
    }
}

/// A contiguous slice of rows written with one request.
#[derive(Debug, Clone, Copy)]
pub struct Batch<'a> {
    pub index: usize,
    /// Zero-based data row of the first row in the batch.
    pub start: usize,
    pub rows: &'a [NormalizedRow],
}

impl Batch<'_> {
    /// Exclusive end row.
    pub fn end(&self) -> usize {
        self.start + self.rows.len()
    }
}

/// Splits `rows` into consecutive batches of at most `batch_size` rows.
pub fn plan_batches(
    rows: &[NormalizedRow],
    batch_size: usize,
) -> impl Iterator<Item = Batch<'_>> {
    let size = batch_size.max(1);
    rows.chunks(size)
        .enumerate()
        .map(move |(index, rows)| Batch {
            index,
            start: index * size,
            rows,
        })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    NotStarted,
    Uploading { batch: usize },
    Formatting,
    Done,
}

/// A batch that could not be written, with the rows it covered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFailure {
    pub index: usize,
    pub start: usize,
    pub end: usize,
    pub error: String,
}

impl fmt::Display for BatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "batch {} (rows {}-{}): {}",
            self.index,
            self.start + 1,
            self.end,
            self.error
        )
    }
}

/// Progress after each batch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadProgress {
    pub batch: usize,
    pub batches: usize,
    pub written: usize,
    pub total: usize,
    pub succeeded: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReport {
    pub rows_total: usize,
    pub rows_uploaded: usize,
    pub batches: usize,
    pub failures: Vec<BatchFailure>,
    pub formatting_error: Option<String>,
    pub state: UploadState,
}

impl UploadReport {
    pub fn failed_batches(&self) -> Vec<usize> {
        self.failures.iter().map(|failure| failure.index).collect()
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.rows_uploaded == self.rows_total
    }
}

impl fmt::Display for UploadReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of {} rows uploaded", self.rows_uploaded, self.rows_total)
    }
}

type ProgressObserver<'o> = Box<dyn FnMut(&UploadProgress) + 'o>;

/// Drives one upload run through `NotStarted → Uploading → Formatting → Done`.
pub struct BatchUploader<'o> {
    options: UploadOptions,
    state: UploadState,
    observer: Option<ProgressObserver<'o>>,
}

impl<'o> BatchUploader<'o> {
    pub fn new(options: UploadOptions) -> Self {
        Self {
            options,
            state: UploadState::NotStarted,
            observer: None,
        }
    }

    /// Registers a callback invoked after every batch attempt.
    pub fn on_progress(mut self, observer: impl FnMut(&UploadProgress) + 'o) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn state(&self) -> UploadState {
        self.state
    }

    /// Writes the header row, every batch, then the formatting pass.
    ///
    /// Only a failure to prepare the destination is returned as an error;
    /// batch and formatting failures are collected in the report.
    #[instrument(
        level = "info",
        skip_all,
        fields(rows = rows.len(), batch_size = self.options.batch_size)
    )]
    pub fn upload(
        &mut self,
        writer: &mut dyn SheetWriter,
        headers: &[String],
        rows: &[NormalizedRow],
    ) -> Result<UploadReport> {
        writer.prepare(headers)?;
        debug!(columns = headers.len(), "header row written");

        let batch_size = self.options.batch_size.max(1);
        let total = rows.len();
        let batches = total.div_ceil(batch_size);
        let mut written = 0;
        let mut failures = Vec::new();

        for batch in plan_batches(rows, batch_size) {
            if batch.index > 0 && !self.options.batch_delay.is_zero() {
                thread::sleep(self.options.batch_delay);
            }
            self.state = UploadState::Uploading { batch: batch.index };

            let succeeded = match writer.write_rows(batch.start, batch.rows) {
                Ok(()) => {
                    written += batch.rows.len();
                    debug!(batch = batch.index, written, total, "batch uploaded");
                    true
                }
                Err(error) => {
                    warn!(
                        batch = batch.index,
                        first_row = batch.start + 1,
                        last_row = batch.end(),
                        %error,
                        "batch upload failed; continuing with next batch"
                    );
                    failures.push(BatchFailure {
                        index: batch.index,
                        start: batch.start,
                        end: batch.end(),
                        error: error.to_string(),
                    });
                    false
                }
            };

            if let Some(observer) = self.observer.as_mut() {
                observer(&UploadProgress {
                    batch: batch.index,
                    batches,
                    written,
                    total,
                    succeeded,
                });
            }
        }

        self.state = UploadState::Formatting;
        let shape = SheetShape {
            columns: headers.len(),
            data_rows: total,
        };
        let formatting_error = match writer.apply_formatting(&shape) {
            Ok(()) => None,
            Err(error) => {
                warn!(%error, "formatting pass failed");
                Some(error.to_string())
            }
        };

        self.state = UploadState::Done;
        Ok(UploadReport {
            rows_total: total,
            rows_uploaded: written,
            batches,
            failures,
            formatting_error,
            state: self.state,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addressbook::sheets::error::ExportError;
    use std::collections::BTreeSet;

    #[derive(Default)]
    struct RecordingWriter {
        headers: Vec<String>,
        writes: Vec<(usize, usize)>,
        fail_batches_at: BTreeSet<usize>,
        formatting_calls: Vec<SheetShape>,
        fail_prepare: bool,
    }

    impl SheetWriter for RecordingWriter {
        fn prepare(&mut self, headers: &[String]) -> Result<()> {
            if self.fail_prepare {
                return Err(ExportError::Auth("token revoked".into()));
            }
            self.headers = headers.to_vec();
            Ok(())
        }

        fn write_rows(&mut self, start_row: usize, rows: &[NormalizedRow]) -> Result<()> {
            if self.fail_batches_at.contains(&start_row) {
                return Err(ExportError::SheetsApi {
                    status: 503,
                    message: "backend unavailable".into(),
                });
            }
            self.writes.push((start_row, rows.len()));
            Ok(())
        }

        fn apply_formatting(&mut self, shape: &SheetShape) -> Result<()> {
            self.formatting_calls.push(*shape);
            Ok(())
        }
    }

    fn rows(count: usize) -> Vec<NormalizedRow> {
        (0..count)
            .map(|n| NormalizedRow::new(vec![n.to_string(), String::new()]))
            .collect()
    }

    fn headers() -> Vec<String> {
        vec!["First Name".to_string(), "Last Name".to_string()]
    }

    #[test]
    fn batches_are_fixed_size_with_short_tail() {
        let rows = rows(7);
        let sizes: Vec<_> = plan_batches(&rows, 3)
            .map(|batch| (batch.start, batch.rows.len()))
            .collect();
        assert_eq!(sizes, vec![(0, 3), (3, 3), (6, 1)]);
    }

    #[test]
    fn zero_batch_size_is_treated_as_one() {
        let rows = rows(2);
        assert_eq!(plan_batches(&rows, 0).count(), 2);
        assert_eq!(UploadOptions::new(0, Duration::ZERO).batch_size, 1);
    }

    #[test]
    fn zero_batch_size_set_directly_uploads_row_by_row() {
        let rows = rows(3);
        let mut writer = RecordingWriter::default();
        let options = UploadOptions {
            batch_size: 0,
            batch_delay: Duration::ZERO,
        };
        let report = BatchUploader::new(options)
            .upload(&mut writer, &headers(), &rows)
            .expect("upload");
        assert_eq!(writer.writes, vec![(0, 1), (1, 1), (2, 1)]);
        assert_eq!(report.batches, 3);
        assert!(report.is_complete());
    }

    #[test]
    fn failed_batch_does_not_stop_later_batches() {
        let rows = rows(10);
        let mut writer = RecordingWriter {
            fail_batches_at: BTreeSet::from([4]),
            ..Default::default()
        };
        let mut uploader = BatchUploader::new(UploadOptions::new(4, Duration::ZERO));
        let report = uploader
            .upload(&mut writer, &headers(), &rows)
            .expect("upload runs to completion");

        assert_eq!(writer.writes, vec![(0, 4), (8, 2)]);
        assert_eq!(report.rows_uploaded, 6);
        assert_eq!(report.rows_total, 10);
        assert_eq!(report.failed_batches(), vec![1]);
        assert_eq!(report.failures[0].start, 4);
        assert_eq!(report.failures[0].end, 8);
        assert_eq!(report.state, UploadState::Done);
        assert_eq!(report.to_string(), "6 of 10 rows uploaded");
        assert!(!report.is_complete());
    }

    #[test]
    fn formatting_runs_once_after_all_batches() {
        let rows = rows(5);
        let mut writer = RecordingWriter::default();
        let mut uploader = BatchUploader::new(UploadOptions::new(2, Duration::ZERO));
        let report = uploader.upload(&mut writer, &headers(), &rows).expect("upload");

        assert_eq!(writer.headers, headers());
        assert_eq!(
            writer.formatting_calls,
            vec![SheetShape {
                columns: 2,
                data_rows: 5
            }]
        );
        assert_eq!(report.batches, 3);
        assert!(report.is_complete());
        assert_eq!(uploader.state(), UploadState::Done);
    }

    #[test]
    fn progress_is_reported_after_every_batch() {
        let rows = rows(5);
        let mut writer = RecordingWriter {
            fail_batches_at: BTreeSet::from([0]),
            ..Default::default()
        };
        let mut seen = Vec::new();
        {
            let mut uploader = BatchUploader::new(UploadOptions::new(2, Duration::ZERO))
                .on_progress(|progress| {
                    seen.push((progress.batch, progress.written, progress.succeeded))
                });
            uploader.upload(&mut writer, &headers(), &rows).expect("upload");
        }
        assert_eq!(seen, vec![(0, 0, false), (1, 2, true), (2, 3, true)]);
    }

    #[test]
    fn prepare_failure_aborts_before_any_batch() {
        let rows = rows(3);
        let mut writer = RecordingWriter {
            fail_prepare: true,
            ..Default::default()
        };
        let mut uploader = BatchUploader::new(UploadOptions::default());
        let result = uploader.upload(&mut writer, &headers(), &rows);
        assert!(matches!(result, Err(ExportError::Auth(_))));
        assert!(writer.writes.is_empty());
        assert_eq!(uploader.state(), UploadState::NotStarted);
    }

    #[test]
    fn empty_row_set_still_formats_header() {
        let mut writer = RecordingWriter::default();
        let mut uploader = BatchUploader::new(UploadOptions::default());
        let report = uploader.upload(&mut writer, &headers(), &[]).expect("upload");
        assert_eq!(report.batches, 0);
        assert_eq!(writer.formatting_calls.len(), 1);
        assert_eq!(report.to_string(), "0 of 0 rows uploaded");
    }
}
