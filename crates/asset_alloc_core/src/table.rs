//! In-memory view of an uploaded CSV file.

use thiserror::Error;

/// Header prefix pandas-style writers give to index or blank columns.
pub const PLACEHOLDER_COLUMN_PREFIX: &str = "unnamed";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableError {
    #[error("csv decode failed: {0}")]
    Csv(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AllocationTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl AllocationTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    pub fn from_csv_bytes(bytes: &[u8]) -> Result<Self, TableError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(bytes);

        let headers = reader
            .headers()
            .map_err(|error| TableError::Csv(error.to_string()))?
            .iter()
            .map(str::to_string)
            .collect::<Vec<_>>();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|error| TableError::Csv(error.to_string()))?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        Ok(Self { headers, rows })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty() || self.rows.is_empty()
    }

    /// Header names with placeholder columns removed.
    pub fn named_columns(&self) -> impl Iterator<Item = &str> {
        self.headers
            .iter()
            .map(String::as_str)
            .filter(|name| !is_placeholder_column(name))
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|header| header == name)
    }

    /// Cell values of one column, top to bottom. Short rows yield `""`.
    pub fn column<'a>(&'a self, name: &str) -> Option<impl Iterator<Item = &'a str> + 'a> {
        let index = self.column_index(name)?;
        Some(
            self.rows
                .iter()
                .map(move |row| row.get(index).map(String::as_str).unwrap_or_default()),
        )
    }
}

pub fn is_placeholder_column(name: &str) -> bool {
    let trimmed = name.trim();
    trimmed.is_empty()
        || trimmed
            .to_ascii_lowercase()
            .starts_with(PLACEHOLDER_COLUMN_PREFIX)
}
