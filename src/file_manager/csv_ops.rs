// Delimited table reading and writing

use crate::error::EngineError;
use std::path::Path;

/// A header row plus data rows
pub type Table = (Vec<String>, Vec<Vec<String>>);

/// Read a table whose first record is the header. An empty file yields an empty table.
pub fn read_csv_table(path: &Path) -> Result<Table, EngineError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|e| csv_error(path, e))?;

    let mut records = reader.records();
    let header = match records.next() {
        Some(record) => record_to_row(record.map_err(|e| csv_error(path, e))?),
        None => return Ok((Vec::new(), Vec::new())),
    };

    let mut rows = Vec::new();
    for record in records {
        rows.push(record_to_row(record.map_err(|e| csv_error(path, e))?));
    }
    Ok((header, rows))
}

/// Write a single-column table
pub fn write_csv_column(path: &Path, column: &str, values: &[String]) -> Result<(), EngineError> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| csv_error(path, e))?;
    writer.write_record([column]).map_err(|e| csv_error(path, e))?;
    for value in values {
        writer.write_record([value]).map_err(|e| csv_error(path, e))?;
    }
    writer.flush()?;
    Ok(())
}

fn record_to_row(record: csv::StringRecord) -> Vec<String> {
    record.iter().map(str::to_string).collect()
}

fn csv_error(path: &Path, e: csv::Error) -> EngineError {
    match e.into_kind() {
        csv::ErrorKind::Io(io) => EngineError::Io(io),
        other => EngineError::Codec(format!("Failed to read table {:?}: {:?}", path, other)),
    }
}
