//! In-process cell grid with the read/write/append semantics of the Sheets API.

use crate::a1::CellRange;
use crate::error::{Result, SheetsError};

/// A sparse-ish grid of string cells, row-major.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Grid {
    rows: Vec<Vec<String>>,
}

impl Grid {
    #[must_use]
    pub fn from_rows(rows: Vec<Vec<String>>) -> Self {
        Self { rows }
    }

    /// All rows, as stored.
    #[must_use]
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    #[must_use]
    pub fn cell(&self, row: usize, col: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map_or("", String::as_str)
    }

    /// Reads a range. Trailing blank cells of each row and trailing blank
    /// rows are omitted, so callers must tolerate ragged results.
    #[must_use]
    pub fn read(&self, range: &CellRange) -> Vec<Vec<String>> {
        let last_row = range
            .last_row
            .unwrap_or_else(|| self.rows.len().saturating_sub(1));

        let mut out: Vec<Vec<String>> = (range.first_row..=last_row)
            .map(|r| {
                let mut row: Vec<String> = (range.first_col..=range.last_col)
                    .map(|c| self.cell(r, c).to_string())
                    .collect();
                while row.last().is_some_and(String::is_empty) {
                    row.pop();
                }
                row
            })
            .collect();
        while out.last().is_some_and(Vec::is_empty) {
            out.pop();
        }
        out
    }

    /// Writes `values` starting at the top-left of `range`.
    ///
    /// A single-cell range acts as an anchor and may be overflowed; a
    /// larger range must contain every written cell.
    ///
    /// # Errors
    /// Returns `InvalidRange` if the values do not fit the range.
    pub fn write(&mut self, range: &CellRange, values: &[Vec<String>]) -> Result<()> {
        let is_anchor = range.width() == 1 && range.height() == Some(1);
        if !is_anchor {
            let widest = values.iter().map(Vec::len).max().unwrap_or(0);
            let too_wide = widest > range.width();
            let too_tall = range.height().is_some_and(|h| values.len() > h);
            if too_wide || too_tall {
                return Err(SheetsError::InvalidRange(format!(
                    "{} rows x {} cols do not fit in {range}",
                    values.len(),
                    widest
                )));
            }
        }

        for (i, row) in values.iter().enumerate() {
            for (j, value) in row.iter().enumerate() {
                self.set(range.first_row + i, range.first_col + j, value.clone());
            }
        }
        Ok(())
    }

    /// Appends `values` below the last non-blank row of the table in `range`.
    ///
    /// Returns the zero-based row the first value landed on.
    pub fn append(&mut self, range: &CellRange, values: &[Vec<String>]) -> usize {
        let last_used = (range.first_row..self.rows.len())
            .rev()
            .find(|&r| (range.first_col..=range.last_col).any(|c| !self.cell(r, c).is_empty()));
        let start = last_used.map_or(range.first_row, |r| r + 1);

        for (i, row) in values.iter().enumerate() {
            for (j, value) in row.iter().enumerate() {
                self.set(start + i, range.first_col + j, value.clone());
            }
        }
        start
    }

    fn set(&mut self, row: usize, col: usize, value: String) {
        if self.rows.len() <= row {
            self.rows.resize_with(row + 1, Vec::new);
        }
        let cells = &mut self.rows[row];
        if cells.len() <= col {
            cells.resize(col + 1, String::new());
        }
        cells[col] = value;
    }
}
