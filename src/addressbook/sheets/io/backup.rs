use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::addressbook::sheets::error::Result;
use crate::addressbook::sheets::normalize::ContactTable;

/// File name of a backup taken at `timestamp`, e.g. `contacts_20240229_080500.json`.
pub fn backup_file_name(timestamp: DateTime<Local>) -> String {
    format!("contacts_{}.json", timestamp.format("%Y%m%d_%H%M%S"))
}

/// Writes a timestamped backup of `table` into `dir`, creating it if needed.
pub fn write_backup(dir: &Path, table: &ContactTable) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(backup_file_name(Local::now()));
    let file = File::create(&path)?;
    write_backup_to(BufWriter::new(file), table)?;
    Ok(path)
}

/// Serializes the rows as a JSON array of objects keyed by header, keys in
/// column order.
pub fn write_backup_to<W: Write>(mut writer: W, table: &ContactTable) -> Result<()> {
    let headers = table.headers.names();
    let records: Vec<RowRecord<'_>> = table
        .rows
        .iter()
        .map(|row| RowRecord {
            headers: &headers,
            cells: row.cells(),
        })
        .collect();
    serde_json::to_writer_pretty(&mut writer, &records)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

struct RowRecord<'a> {
    headers: &'a [String],
    cells: &'a [String],
}

impl Serialize for RowRecord<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.headers.len()))?;
        for (header, cell) in self.headers.iter().zip(self.cells) {
            map.serialize_entry(header, cell)?;
        }
        map.end()
    }
}
