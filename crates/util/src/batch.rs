//! Batch input files.
//!
//! A batch file is a header row followed by one data row per run. Fields are comma separated without quoting; blank
//! lines and lines starting with `#` are ignored, values are trimmed, and a row shorter than the header leaves the
//! remaining fields as empty strings.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use thiserror::Error;

/// One data row keyed by header name, in header order.
pub type BatchRecord = IndexMap<String, String>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BatchError {
    #[error("batch file has no header row")]
    MissingHeader,
    #[error("batch header has an empty column name at position {0}")]
    EmptyColumn(usize),
}

/// Parses batch text into records.
pub fn parse_batch(text: &str) -> Result<Vec<BatchRecord>, BatchError> {
    let mut lines = text
        .lines()
        .filter(|line| !line.trim().is_empty() && !line.trim_start().starts_with('#'));

    let header_line = lines.next().ok_or(BatchError::MissingHeader)?;
    let headers: Vec<String> = header_line.split(',').map(|header| header.trim().to_string()).collect();
    if let Some(position) = headers.iter().position(String::is_empty) {
        return Err(BatchError::EmptyColumn(position + 1));
    }

    let records = lines
        .map(|line| {
            let values: Vec<&str> = line.split(',').map(str::trim).collect();
            headers
                .iter()
                .enumerate()
                .map(|(index, header)| (header.clone(), values.get(index).copied().unwrap_or_default().to_string()))
                .collect()
        })
        .collect();
    Ok(records)
}

/// Reads and parses a batch file.
pub fn load_batch(path: impl AsRef<Path>) -> Result<Vec<BatchRecord>> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).with_context(|| format!("Failed to read batch file: {}", path.display()))?;
    parse_batch(&text).with_context(|| format!("Invalid batch file: {}", path.display()))
}
