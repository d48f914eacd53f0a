use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::VaultError;
use crate::store::Row;

pub const PREVIEW_ROW_LIMIT: usize = 50;

/// Parsed tabular file: header names in file order plus rows keyed by
/// header. Values carry no inferred types beyond what the format itself
/// encodes; CSV cells are always strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableFile {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum FileKind {
    Csv,
    Spreadsheet,
}

fn file_kind(path: &Path) -> Result<FileKind, VaultError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match extension.as_str() {
        "csv" => Ok(FileKind::Csv),
        "xlsx" | "xls" => Ok(FileKind::Spreadsheet),
        _ => Err(VaultError::UnsupportedFileType { extension }),
    }
}

/// First rows of a file, for schema confirmation before import.
pub fn read_preview(path: &Path) -> Result<TableFile, VaultError> {
    read_table(path, Some(PREVIEW_ROW_LIMIT))
}

/// Every row of the file. Import re-reads with this rather than trusting a
/// cached preview.
pub fn read_full(path: &Path) -> Result<TableFile, VaultError> {
    read_table(path, None)
}

fn read_table(path: &Path, limit: Option<usize>) -> Result<TableFile, VaultError> {
    match file_kind(path)? {
        FileKind::Csv => read_csv(path, limit),
        FileKind::Spreadsheet => read_spreadsheet(path, limit),
    }
}

fn read_csv(path: &Path, limit: Option<usize>) -> Result<TableFile, VaultError> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let columns: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.iter().all(|field| field.is_empty()) {
            continue;
        }

        let mut row = Row::new();
        for (i, column) in columns.iter().enumerate() {
            if let Some(field) = record.get(i) {
                row.insert(column.clone(), Value::String(field.to_string()));
            }
        }
        rows.push(row);

        if let Some(cap) = limit {
            if rows.len() >= cap {
                break;
            }
        }
    }

    Ok(TableFile { columns, rows })
}

fn read_spreadsheet(path: &Path, limit: Option<usize>) -> Result<TableFile, VaultError> {
    let mut workbook = open_workbook_auto(path)?;
    // First sheet only; the column list comes from its first row.
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| VaultError::InvalidInput {
            message: "spreadsheet has no sheets".to_string(),
        })??;

    let mut sheet_rows = range.rows();
    let columns: Vec<String> = match sheet_rows.next() {
        Some(header) => header.iter().map(cell_to_header).collect(),
        None => Vec::new(),
    };

    let mut rows = Vec::new();
    for sheet_row in sheet_rows {
        if sheet_row.iter().all(cell_is_blank) {
            continue;
        }

        let mut row = Row::new();
        for (i, column) in columns.iter().enumerate() {
            if let Some(cell) = sheet_row.get(i) {
                let value = cell_to_value(cell);
                if !value.is_null() {
                    row.insert(column.clone(), value);
                }
            }
        }
        rows.push(row);

        if let Some(cap) = limit {
            if rows.len() >= cap {
                break;
            }
        }
    }

    Ok(TableFile { columns, rows })
}

fn cell_is_blank(cell: &Data) -> bool {
    match cell {
        Data::Empty => true,
        Data::String(s) => s.is_empty(),
        _ => false,
    }
}

fn cell_to_header(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.clone(),
        Data::Empty => String::new(),
        other => other.to_string(),
    }
}

fn cell_to_value(cell: &Data) -> Value {
    match cell {
        Data::Empty => Value::Null,
        Data::String(s) => Value::String(s.clone()),
        Data::Int(i) => Value::Number((*i).into()),
        Data::Float(f) => serde_json::Number::from_f64(*f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Data::Bool(b) => Value::Bool(*b),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(|d| Value::String(d.to_string()))
            .unwrap_or(Value::Null),
        Data::DateTimeIso(s) => Value::String(s.clone()),
        Data::DurationIso(s) => Value::String(s.clone()),
        Data::Error(_) => Value::Null,
    }
}
