//! Tabular ingest for uploaded well-log, core and prediction files.
//!
//! Two container formats are accepted:
//!
//! - **CSV** - header row, comma separated, quote aware (`csv` module)
//! - **XLSX** - first worksheet of an Office Open XML workbook (`xlsx` module)
//!
//! Both readers produce raw string cells; `build_table` decides per column
//! whether it is numeric (every non-missing cell parses as `f64`) or
//! categorical.

pub mod csv;
pub mod xlsx;

use std::path::Path;

use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::table::{Column, Table};

/// Extensions accepted by `load_tabular`.
pub const ALLOWED_EXTENSIONS: [&str; 2] = ["csv", "xlsx"];

/// Parse an uploaded byte stream into a typed table.
pub fn load_tabular(bytes: &[u8], extension: &str) -> Result<Table> {
    let ext = extension.trim().trim_start_matches('.').to_ascii_lowercase();
    let (header, rows) = match ext.as_str() {
        "csv" => csv::read_records(bytes)?,
        "xlsx" => xlsx::read_first_sheet(bytes)?,
        _ => return Err(PipelineError::UnsupportedFormat(extension.to_string())),
    };
    let table = build_table("uploaded table", &header, rows)?;
    debug!(
        format = %ext,
        rows = table.row_count(),
        columns = table.column_count(),
        "Loaded tabular file"
    );
    Ok(table)
}

/// Read a file from disk, dispatching on its extension.
pub fn load_path(path: &Path) -> Result<Table> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_string();
    if !ALLOWED_EXTENSIONS.contains(&extension.to_ascii_lowercase().as_str()) {
        return Err(PipelineError::UnsupportedFormat(extension));
    }
    let bytes = std::fs::read(path)?;
    let label = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("uploaded table")
        .to_string();
    Ok(load_tabular(&bytes, &extension)?.with_label(label))
}

/// Cell text that counts as missing.
fn is_missing_token(cell: &str) -> bool {
    matches!(cell, "" | "NaN" | "nan" | "NA" | "N/A" | "null" | "None")
}

/// Type raw string cells into numeric or categorical columns.
pub(crate) fn build_table(
    label: &str,
    header: &[String],
    rows: Vec<Vec<Option<String>>>,
) -> Result<Table> {
    if header.is_empty() {
        return Err(PipelineError::Parse("file has no header row".to_string()));
    }

    let mut columns = Vec::with_capacity(header.len());
    for (idx, name) in header.iter().enumerate() {
        let cells: Vec<Option<&str>> = rows
            .iter()
            .map(|row| {
                row.get(idx)
                    .and_then(|c| c.as_deref())
                    .map(str::trim)
                    .filter(|c| !is_missing_token(c))
            })
            .collect();

        let parsed: Option<Vec<f64>> = cells
            .iter()
            .map(|cell| match cell {
                None => Some(f64::NAN),
                Some(text) => text.parse::<f64>().ok(),
            })
            .collect();

        let column = match parsed {
            Some(values) => Column::numeric(name.trim(), values),
            None => Column::categorical(
                name.trim(),
                cells.into_iter().map(|c| c.map(str::to_string)).collect(),
            ),
        };
        columns.push(column);
    }

    Table::from_columns(label, columns)
}
