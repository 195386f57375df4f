//! XLSX worksheet reader.
//!
//! An `.xlsx` file is a zip archive of XML parts. Only two parts matter here:
//! `xl/sharedStrings.xml` (the string pool referenced by `t="s"` cells) and the
//! first `xl/worksheets/sheetN.xml`. Cells carry an `r` reference such as `C12`;
//! gaps in a row are filled with missing cells. The first row is the header.

use std::borrow::Cow;
use std::io::{Cursor, Read, Seek};

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;
use zip::result::ZipError;
use zip::ZipArchive;

use crate::error::{PipelineError, Result};

const SHARED_STRINGS: &str = "xl/sharedStrings.xml";
const WORKSHEET_PREFIX: &str = "xl/worksheets/sheet";

fn xml_err(e: impl std::fmt::Display) -> PipelineError {
    PipelineError::Parse(format!("XLSX XML error: {e}"))
}

/// Read the first worksheet into a header and raw cell rows.
pub fn read_first_sheet(bytes: &[u8]) -> Result<(Vec<String>, Vec<Vec<Option<String>>>)> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| PipelineError::Parse(format!("not a valid XLSX archive: {e}")))?;

    let shared = match read_entry(&mut archive, SHARED_STRINGS)? {
        Some(xml) => parse_shared_strings(&xml)?,
        None => Vec::new(),
    };

    let sheet_path = first_sheet_path(&archive)
        .ok_or_else(|| PipelineError::Parse("XLSX workbook has no worksheets".to_string()))?;
    let sheet_xml = read_entry(&mut archive, &sheet_path)?
        .ok_or_else(|| PipelineError::Parse(format!("missing worksheet part {sheet_path}")))?;

    let mut grid = parse_sheet(&sheet_xml, &shared)?.into_iter();
    let header = grid
        .next()
        .ok_or_else(|| PipelineError::Parse("worksheet is empty".to_string()))?
        .into_iter()
        .map(Option::unwrap_or_default)
        .collect();

    Ok((header, grid.collect()))
}

fn read_entry<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> Result<Option<String>> {
    match archive.by_name(name) {
        Ok(mut entry) => {
            let mut content = String::new();
            entry.read_to_string(&mut content)?;
            Ok(Some(content))
        }
        Err(ZipError::FileNotFound) => Ok(None),
        Err(e) => Err(PipelineError::Parse(format!("failed to read {name}: {e}"))),
    }
}

/// Lowest-numbered `xl/worksheets/sheetN.xml` part.
fn first_sheet_path<R: Read + Seek>(archive: &ZipArchive<R>) -> Option<String> {
    archive
        .file_names()
        .filter_map(|name| {
            let number = name
                .strip_prefix(WORKSHEET_PREFIX)?
                .strip_suffix(".xml")?
                .parse::<u32>()
                .ok()?;
            Some((number, name.to_string()))
        })
        .min_by_key(|(number, _)| *number)
        .map(|(_, name)| name)
}

fn parse_shared_strings(xml: &str) -> Result<Vec<String>> {
    let mut reader = Reader::from_str(xml);
    let mut strings = Vec::new();
    let mut current = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event().map_err(xml_err)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"si" => current.clear(),
                b"t" => in_text = true,
                _ => {}
            },
            Event::Text(t) if in_text => {
                current.push_str(&t.unescape().map_err(xml_err)?);
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"si" => strings.push(std::mem::take(&mut current)),
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(strings)
}

/// Zero-based column index from letters of a cell reference (`A` = 0, `AA` = 26).
fn column_index(letters: &str) -> usize {
    letters
        .bytes()
        .fold(0usize, |acc, b| acc * 26 + usize::from(b - b'A') + 1)
        - 1
}

fn attribute<'a>(e: &'a BytesStart<'_>, name: &str) -> Result<Option<Cow<'a, str>>> {
    match e.try_get_attribute(name).map_err(xml_err)? {
        Some(attr) => Ok(Some(attr.unescape_value().map_err(xml_err)?)),
        None => Ok(None),
    }
}

#[derive(Default)]
struct PendingCell {
    column: usize,
    kind: String,
    text: String,
}

fn resolve_cell(cell: PendingCell, shared: &[String]) -> Result<Option<String>> {
    let value = match cell.kind.as_str() {
        "s" => {
            let idx: usize = cell.text.trim().parse().map_err(|_| {
                PipelineError::Parse(format!("bad shared string index '{}'", cell.text))
            })?;
            Some(shared.get(idx).cloned().ok_or_else(|| {
                PipelineError::Parse(format!("shared string index {idx} out of range"))
            })?)
        }
        "e" => None,
        _ => Some(cell.text),
    };
    Ok(value.filter(|v| !v.is_empty()))
}

fn parse_sheet(xml: &str, shared: &[String]) -> Result<Vec<Vec<Option<String>>>> {
    let cell_ref = Regex::new(r"^([A-Z]+)(\d+)$").map_err(xml_err)?;
    let mut reader = Reader::from_str(xml);
    let mut rows: Vec<Vec<Option<String>>> = Vec::new();
    let mut row: Vec<Option<String>> = Vec::new();
    let mut cell: Option<PendingCell> = None;
    let mut in_value = false;

    loop {
        match reader.read_event().map_err(xml_err)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"row" => row.clear(),
                b"c" => {
                    let column = match attribute(&e, "r")? {
                        Some(r) => cell_ref
                            .captures(&r)
                            .and_then(|c| c.get(1))
                            .map_or(row.len(), |m| column_index(m.as_str())),
                        None => row.len(),
                    };
                    let kind = attribute(&e, "t")?.map(Cow::into_owned).unwrap_or_default();
                    cell = Some(PendingCell { column, kind, text: String::new() });
                }
                b"v" | b"t" => in_value = true,
                _ => {}
            },
            Event::Text(t) if in_value => {
                if let Some(c) = cell.as_mut() {
                    c.text.push_str(&t.unescape().map_err(xml_err)?);
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"v" | b"t" => in_value = false,
                b"c" => {
                    if let Some(done) = cell.take() {
                        let column = done.column;
                        let value = resolve_cell(done, shared)?;
                        if row.len() <= column {
                            row.resize(column + 1, None);
                        }
                        row[column] = value;
                    }
                }
                b"row" => rows.push(std::mem::take(&mut row)),
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(rows)
}
