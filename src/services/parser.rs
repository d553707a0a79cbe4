//! CSV parsing for the import pipeline
//!
//! The first line is the header row; every following non-blank line becomes
//! one raw row keyed by those headers. Parsing is all-or-nothing: the first
//! structurally broken line aborts with no partial result.

use std::collections::BTreeMap;

use thiserror::Error;

/// A parsed CSV row: original header -> raw string value.
pub type RawRow = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCsv {
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("CSV file contains no data rows")]
    EmptyFile,
    #[error("Malformed CSV at line {line}: {message}")]
    MalformedRow { line: u64, message: String },
}

/// Parse CSV content into headers plus raw rows.
pub fn parse(content: &str) -> Result<ParsedCsv, ParseError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(to_parse_error)?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.map_err(to_parse_error)?;
        let mut row = RawRow::new();
        for (i, header) in headers.iter().enumerate() {
            if let Some(value) = record.get(i) {
                row.insert(header.clone(), value.to_string());
            }
        }
        rows.push(row);
    }

    if rows.is_empty() {
        return Err(ParseError::EmptyFile);
    }

    Ok(ParsedCsv { headers, rows })
}

fn to_parse_error(err: csv::Error) -> ParseError {
    let line = err.position().map(|p| p.line()).unwrap_or(0);
    ParseError::MalformedRow {
        line,
        message: err.to_string(),
    }
}
