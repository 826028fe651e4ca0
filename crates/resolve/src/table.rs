use serde::Serialize;

use crate::error::ResolveError;

/// A fully materialized header + rows table. The only shape the engine
/// exchanges with its loaders and writers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of `name` in the header row. `table` names the role for the
    /// error message (`registry`, `source`, `override:<name>`).
    pub fn column_index(&self, table: &str, name: &str) -> Result<usize, ResolveError> {
        self.headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| ResolveError::MissingColumn {
                table: table.into(),
                column: name.into(),
            })
    }

    /// Cell text, or `None` when the cell is missing or blank.
    pub fn cell(&self, row: usize, col: usize) -> Option<&str> {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map(|s| s.as_str())
            .filter(|s| !s.trim().is_empty())
    }

    pub fn push_row(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }
}
