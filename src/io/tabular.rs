//! Delimited tabular loader.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use csv::ReaderBuilder;
use tracing::info;

const BOM: char = '\u{feff}';

/// A delimited table held as raw strings: header names plus rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Load a delimited file with a header row.
pub fn load_table(path: &Path, delimiter: u8) -> Result<Table> {
    info!("Loading table from {}", path.display());

    let file = File::open(path)
        .with_context(|| format!("Failed to open tabular file: {}", path.display()))?;
    let table = read_table(file, delimiter)
        .with_context(|| format!("Failed to parse tabular file: {}", path.display()))?;

    info!("Loaded {} rows ({} columns)", table.len(), table.headers.len());
    Ok(table)
}

/// Read a delimited table from any reader. Rows may be ragged.
pub fn read_table<R: Read>(reader: R, delimiter: u8) -> Result<Table> {
    let mut csv_reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(reader);

    let mut headers: Vec<String> = csv_reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    if let Some(first) = headers.first_mut() {
        *first = first.trim_start_matches(BOM).to_string();
    }

    let mut rows = Vec::new();
    for result in csv_reader.records() {
        let record = result?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    Ok(Table { headers, rows })
}
