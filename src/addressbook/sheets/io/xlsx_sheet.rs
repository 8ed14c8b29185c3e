use std::path::Path;

use rust_xlsxwriter::{Format, Workbook, Worksheet};

use crate::addressbook::sheets::error::{ExportError, Result};
use crate::addressbook::sheets::model::NormalizedRow;
use crate::addressbook::sheets::upload::{SheetShape, SheetWriter};

const MAX_SHEET_NAME_CHARS: usize = 31;
const MAX_CELL_CHARS: usize = 32_767;
const MAX_ROWS: usize = 1_048_576;
const MAX_COLUMNS: usize = 16_384;

/// A local workbook standing in for the remote spreadsheet. Rows are
/// buffered in a single worksheet and written to disk by [`XlsxSheet::save`].
pub struct XlsxSheet {
    worksheet: Worksheet,
    headers: Vec<String>,
}

impl XlsxSheet {
    pub fn new(sheet_name: &str) -> Result<Self> {
        let mut worksheet = Worksheet::new();
        worksheet.set_name(&sanitize_sheet_name(sheet_name))?;
        Ok(Self {
            worksheet,
            headers: Vec::new(),
        })
    }

    pub fn save(self, path: &Path) -> Result<()> {
        let mut workbook = Workbook::new();
        workbook.push_worksheet(self.worksheet);
        workbook.save(path)?;
        Ok(())
    }
}

impl SheetWriter for XlsxSheet {
    fn prepare(&mut self, headers: &[String]) -> Result<()> {
        for (col_idx, header) in headers.iter().enumerate() {
            self.worksheet.write_string(0, col_idx as u16, header)?;
        }
        self.headers = headers.to_vec();
        Ok(())
    }

    /// The whole batch is checked first; a rejected batch writes nothing.
    fn write_rows(&mut self, start_row: usize, rows: &[NormalizedRow]) -> Result<()> {
        check_batch(start_row, rows)?;
        for (offset, row) in rows.iter().enumerate() {
            let row_idx = (start_row + offset + 1) as u32;
            for (col_idx, cell) in row.cells().iter().enumerate() {
                if !cell.is_empty() {
                    self.worksheet.write_string(row_idx, col_idx as u16, cell)?;
                }
            }
        }
        Ok(())
    }

    fn apply_formatting(&mut self, shape: &SheetShape) -> Result<()> {
        let bold = Format::new().set_bold();
        for (col_idx, header) in self.headers.iter().enumerate() {
            self.worksheet
                .write_string_with_format(0, col_idx as u16, header, &bold)?;
        }
        self.worksheet.set_freeze_panes(1, 0)?;

        let col_end = (shape.columns as u16).saturating_sub(1);
        self.worksheet
            .autofilter(0, 0, shape.data_rows as u32, col_end)?;
        self.worksheet.autofit();
        Ok(())
    }
}

/// Fails on the first row or cell that Excel cannot hold. Rows are
/// one-based here, as a user sees them in the workbook.
fn check_batch(start_row: usize, rows: &[NormalizedRow]) -> Result<()> {
    for (offset, row) in rows.iter().enumerate() {
        let sheet_row = start_row + offset + 1;
        if sheet_row >= MAX_ROWS {
            return Err(ExportError::CellLimit {
                row: sheet_row + 1,
                column: 1,
                reason: format!("worksheets hold at most {MAX_ROWS} rows"),
            });
        }
        if row.len() > MAX_COLUMNS {
            return Err(ExportError::CellLimit {
                row: sheet_row + 1,
                column: MAX_COLUMNS + 1,
                reason: format!("worksheets hold at most {MAX_COLUMNS} columns"),
            });
        }
        for (col_idx, cell) in row.cells().iter().enumerate() {
            let length = cell.chars().count();
            if length > MAX_CELL_CHARS {
                return Err(ExportError::CellLimit {
                    row: sheet_row + 1,
                    column: col_idx + 1,
                    reason: format!("{length} characters, at most {MAX_CELL_CHARS} allowed"),
                });
            }
        }
    }
    Ok(())
}

/// Replaces characters Excel rejects in tab names and caps the length.
fn sanitize_sheet_name(raw: &str) -> String {
    let invalid = [':', '\\', '/', '?', '*', '[', ']', '\'', '"'];
    let sanitized: String = raw
        .chars()
        .map(|ch| {
            if invalid.contains(&ch) || ch.is_control() {
                '_'
            } else {
                ch
            }
        })
        .collect();

    let trimmed = sanitized.trim();
    if trimmed.is_empty() {
        return "Contacts".to_string();
    }
    trimmed.chars().take(MAX_SHEET_NAME_CHARS).collect()
}
