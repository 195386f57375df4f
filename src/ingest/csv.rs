//! Quote-aware CSV reading and writing.
//!
//! Records are line-based: quotes protect separators inside a field, but a
//! newline always ends the record, even inside quotes. Well-log and core
//! exports never embed newlines in cells.

use std::io::Write;

use crate::error::{PipelineError, Result};

/// Split a CSV line respecting quoted fields (handles commas inside quotes).
/// Returns owned strings because quoted fields need unquoting.
pub fn csv_split(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' => {
                if in_quotes {
                    // Escaped quote ("")
                    if chars.peek() == Some(&'"') {
                        current.push('"');
                        chars.next();
                    } else {
                        in_quotes = false;
                    }
                } else {
                    in_quotes = true;
                }
            }
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut current));
            }
            _ => current.push(ch),
        }
    }
    fields.push(current);
    fields
}

/// Quote a field when it contains a separator, quote or line break.
pub fn csv_escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Parse CSV bytes into a header and raw cell rows.
pub fn read_records(bytes: &[u8]) -> Result<(Vec<String>, Vec<Vec<Option<String>>>)> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| PipelineError::Parse(format!("CSV is not valid UTF-8: {e}")))?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let header = match lines.next() {
        Some(line) => csv_split(line),
        None => return Err(PipelineError::Parse("CSV file is empty".to_string())),
    };

    let rows = lines
        .map(|line| csv_split(line).into_iter().map(Some).collect())
        .collect();

    Ok((header, rows))
}

/// Write numeric columns as UTF-8 CSV without an index column.
/// `NaN` cells are written empty.
pub fn write_numeric<W: Write>(
    writer: &mut W,
    header: &[&str],
    columns: &[&[f64]],
) -> std::io::Result<()> {
    let escaped: Vec<String> = header.iter().map(|h| csv_escape(h)).collect();
    writeln!(writer, "{}", escaped.join(","))?;

    let rows = columns.iter().map(|c| c.len()).min().unwrap_or(0);
    for r in 0..rows {
        let cells: Vec<String> = columns
            .iter()
            .map(|c| if c[r].is_nan() { String::new() } else { c[r].to_string() })
            .collect();
        writeln!(writer, "{}", cells.join(","))?;
    }
    writer.flush()
}
