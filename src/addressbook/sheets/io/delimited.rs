use std::fs::File;
use std::io::Write;
use std::path::Path;

use csv::{QuoteStyle, Terminator, WriterBuilder};

use crate::addressbook::sheets::error::Result;
use crate::addressbook::sheets::normalize::ContactTable;

/// Writes `table` as CSV for manual import.
pub fn write_csv(path: &Path, table: &ContactTable) -> Result<()> {
    let file = File::create(path)?;
    write_csv_to(file, table)
}

/// Every field is wrapped in double quotes and interior quotes are doubled,
/// so notes and addresses can never break a row apart.
pub fn write_csv_to<W: Write>(writer: W, table: &ContactTable) -> Result<()> {
    let mut csv_writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .terminator(Terminator::CRLF)
        .from_writer(writer);

    csv_writer.write_record(table.headers.names())?;
    for row in &table.rows {
        csv_writer.write_record(row.cells())?;
    }
    csv_writer.flush()?;
    Ok(())
}
