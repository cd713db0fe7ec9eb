//! CSV ingest into a `DataTable`.
//!
//! Rules:
//! - the first row is a header; column names must be unique
//! - a column is numeric when every non-empty cell parses as a number;
//!   other columns (ids, labels) are skipped and reported
//! - a row with an empty or non-finite value in a numeric column is skipped
//!   and reported, so every kept column has the same rows
//!
//! All failures here are input problems (exit code 2).

use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::StringRecord;
use log::{info, warn};

use crate::data::DataTable;
use crate::error::AppError;

/// A row-level problem encountered during ingest.
#[derive(Debug, Clone, PartialEq)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct IngestedTable {
    pub table: DataTable,
    pub skipped_columns: Vec<String>,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
    pub rows_used: usize,
}

/// Load a CSV file from disk.
pub fn load_table(path: &Path) -> Result<IngestedTable, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open CSV '{}': {e}", path.display())))?;
    let ingested = read_table(file)?;
    info!(
        "read {} of {} rows from '{}'",
        ingested.rows_used,
        ingested.rows_read,
        path.display()
    );
    Ok(ingested)
}

pub fn read_table<R: Read>(source: R) -> Result<IngestedTable, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(source);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| AppError::new(2, format!("Failed to read CSV headers: {e}")))?
        .iter()
        .map(str::to_string)
        .collect();
    for (i, name) in headers.iter().enumerate() {
        if name.is_empty() {
            return Err(AppError::new(2, format!("CSV header {} is empty.", i + 1)));
        }
        if headers[..i].contains(name) {
            return Err(AppError::new(2, format!("CSV header '{name}' appears more than once.")));
        }
    }

    let mut records: Vec<(usize, StringRecord)> = Vec::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;
    for (idx, result) in reader.records().enumerate() {
        // +2: 1-based lines, after the header.
        let line = idx + 2;
        rows_read += 1;
        match result {
            Ok(record) => records.push((line, record)),
            Err(e) => row_errors.push(RowError {
                line,
                message: format!("CSV parse error: {e}"),
            }),
        }
    }

    let numeric: Vec<bool> = (0..headers.len())
        .map(|col| {
            let mut cells = records
                .iter()
                .filter_map(|(_, r)| r.get(col))
                .filter(|cell| !cell.is_empty())
                .peekable();
            cells.peek().is_some() && cells.all(|cell| cell.parse::<f64>().is_ok())
        })
        .collect();

    let skipped_columns: Vec<String> = headers
        .iter()
        .zip(&numeric)
        .filter(|(_, is_numeric)| !**is_numeric)
        .map(|(name, _)| name.clone())
        .collect();
    if !skipped_columns.is_empty() {
        warn!("skipping non-numeric columns: {}", skipped_columns.join(", "));
    }

    let kept: Vec<usize> = (0..headers.len()).filter(|&col| numeric[col]).collect();
    if kept.is_empty() {
        return Err(AppError::new(2, "CSV has no numeric columns."));
    }

    let mut columns: Vec<Vec<f64>> = vec![Vec::with_capacity(records.len()); kept.len()];
    for (line, record) in &records {
        match parse_row(record, &kept, &headers) {
            Ok(values) => {
                for (column, v) in columns.iter_mut().zip(values) {
                    column.push(v);
                }
            }
            Err(message) => row_errors.push(RowError { line: *line, message }),
        }
    }
    row_errors.sort_by_key(|e| e.line);
    for e in &row_errors {
        warn!("line {}: {}", e.line, e.message);
    }

    let rows_used = columns.first().map_or(0, Vec::len);
    if rows_used == 0 {
        return Err(AppError::new(2, "CSV has no usable rows."));
    }

    let table = DataTable::from_columns(kept.iter().map(|&col| headers[col].clone()).zip(columns))?;
    Ok(IngestedTable {
        table,
        skipped_columns,
        row_errors,
        rows_read,
        rows_used,
    })
}

fn parse_row(record: &StringRecord, kept: &[usize], headers: &[String]) -> Result<Vec<f64>, String> {
    kept.iter()
        .map(|&col| {
            let cell = record.get(col).unwrap_or("");
            if cell.is_empty() {
                return Err(format!("missing value in column '{}'", headers[col]));
            }
            match cell.parse::<f64>() {
                Ok(v) if v.is_finite() => Ok(v),
                _ => Err(format!("'{cell}' in column '{}' is not a finite number", headers[col])),
            }
        })
        .collect()
}
