//! Record-oriented rows and their CSV form.

use serde_json::Value;
use std::collections::HashSet;

/// One row: column name to value, in column order.
pub type Record = serde_json::Map<String, Value>;

#[derive(Debug, thiserror::Error)]
pub enum RowsError {
    #[error("no rows to send")]
    Empty,

    #[error("rows have no columns")]
    NoColumns,

    #[error("duplicate column {0:?} in CSV header")]
    DuplicateColumn(String),

    #[error("row {row} has columns {found:?}, expected {expected:?}")]
    InconsistentColumns {
        row: usize,
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub fn columns(record: &Record) -> Vec<String> {
    record.keys().cloned().collect()
}

/// Every column used by any row, in first-seen order.
pub fn union_columns(rows: &[Record]) -> Vec<String> {
    let mut seen = HashSet::new();
    rows.iter()
        .flat_map(|row| row.keys())
        .filter(|column| seen.insert(column.as_str()))
        .cloned()
        .collect()
}

/// Checks that every row shares the first row's column set and returns
/// those columns in the first row's order.
pub fn ensure_consistent(rows: &[Record]) -> Result<Vec<String>, RowsError> {
    let first = rows.first().ok_or(RowsError::Empty)?;
    let expected = columns(first);
    if expected.is_empty() {
        return Err(RowsError::NoColumns);
    }

    for (index, row) in rows.iter().enumerate().skip(1) {
        let same = row.len() == first.len() && expected.iter().all(|c| row.contains_key(c));
        if !same {
            return Err(RowsError::InconsistentColumns {
                row: index,
                expected,
                found: columns(row),
            });
        }
    }

    Ok(expected)
}

/// Parses CSV with a header row.
///
/// Cells are kept as strings so the file round-trips unchanged; empty cells
/// become `null`.
pub fn read_csv(bytes: &[u8]) -> Result<Vec<Record>, RowsError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(bytes);

    let headers = reader.headers()?.clone();
    let mut seen = HashSet::new();
    for header in headers.iter() {
        if !seen.insert(header) {
            return Err(RowsError::DuplicateColumn(header.to_string()));
        }
    }

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        let row: Record = headers
            .iter()
            .zip(record.iter())
            .map(|(column, cell)| {
                let value = if cell.is_empty() {
                    Value::Null
                } else {
                    Value::String(cell.to_string())
                };
                (column.to_string(), value)
            })
            .collect();
        rows.push(row);
    }

    Ok(rows)
}

/// Encodes rows as CSV, header first, columns in the first row's order.
///
/// Every row must have the same columns.
pub fn write_csv(rows: &[Record]) -> Result<Vec<u8>, RowsError> {
    let columns = ensure_consistent(rows)?;
    write_columns(rows, &columns)
}

/// Encodes rows as CSV over the union of their columns. A row missing a
/// column gets an empty cell.
pub fn write_csv_lenient(rows: &[Record]) -> Result<Vec<u8>, RowsError> {
    let columns = union_columns(rows);
    if columns.is_empty() {
        return Ok(Vec::new());
    }
    write_columns(rows, &columns)
}

fn write_columns(rows: &[Record], columns: &[String]) -> Result<Vec<u8>, RowsError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(columns)?;
    for row in rows {
        writer.write_record(
            columns
                .iter()
                .map(|column| row.get(column).map(cell_text).unwrap_or_default()),
        )?;
    }

    writer
        .into_inner()
        .map_err(|e| RowsError::Csv(e.into_error().into()))
}

/// Text form of a cell: strings verbatim, null as empty, everything else as JSON.
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
