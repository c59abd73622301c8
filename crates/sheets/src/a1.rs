//! A1-notation ranges.

use std::fmt;
use std::str::FromStr;

use crate::error::SheetsError;

/// A rectangular range with zero-based, inclusive bounds.
///
/// `last_row` is `None` for ranges open towards the bottom of the sheet
/// (`J1:N`), matching how the Sheets API treats a missing row number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRange {
    pub first_col: usize,
    pub first_row: usize,
    pub last_col: usize,
    pub last_row: Option<usize>,
}

impl CellRange {
    /// Number of columns spanned.
    #[must_use]
    pub const fn width(&self) -> usize {
        self.last_col - self.first_col + 1
    }

    /// Number of rows spanned, if bounded.
    #[must_use]
    pub fn height(&self) -> Option<usize> {
        self.last_row.map(|last| last - self.first_row + 1)
    }

    /// True if the zero-based cell lies inside the range.
    #[must_use]
    pub fn contains(&self, row: usize, col: usize) -> bool {
        col >= self.first_col
            && col <= self.last_col
            && row >= self.first_row
            && self.last_row.map_or(true, |last| row <= last)
    }
}

impl FromStr for CellRange {
    type Err = SheetsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || SheetsError::InvalidRange(s.to_string());
        let s = s.trim();
        let (start, end) = match s.split_once(':') {
            Some((start, end)) => (start, Some(end)),
            None => (s, None),
        };

        let (first_col, first_row) = parse_cell(start).ok_or_else(invalid)?;
        let first_row = first_row.unwrap_or(0);

        let (last_col, last_row) = match end {
            // A lone cell is a 1x1 range.
            None => (first_col, Some(first_row)),
            Some(end) => parse_cell(end).ok_or_else(invalid)?,
        };

        if last_col < first_col || last_row.is_some_and(|r| r < first_row) {
            return Err(invalid());
        }

        Ok(Self {
            first_col,
            first_row,
            last_col,
            last_row,
        })
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}:{}",
            column_letters(self.first_col),
            self.first_row + 1,
            column_letters(self.last_col)
        )?;
        if let Some(last) = self.last_row {
            write!(f, "{}", last + 1)?;
        }
        Ok(())
    }
}

/// Parses `H500` into `(7, Some(499))` and `N` into `(13, None)`.
fn parse_cell(cell: &str) -> Option<(usize, Option<usize>)> {
    let split = cell
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(cell.len());
    let (letters, digits) = cell.split_at(split);
    let col = column_index(letters)?;
    if digits.is_empty() {
        return Some((col, None));
    }
    let row: usize = digits.parse().ok()?;
    if row == 0 {
        return None;
    }
    Some((col, Some(row - 1)))
}

/// Converts column letters to a zero-based index (`A` → 0, `AA` → 26).
#[must_use]
pub fn column_index(letters: &str) -> Option<usize> {
    if letters.is_empty() || letters.len() > 3 {
        return None;
    }
    letters.chars().try_fold(0usize, |acc, c| {
        if !c.is_ascii_alphabetic() {
            return None;
        }
        let digit = (c.to_ascii_uppercase() as u8 - b'A') as usize + 1;
        Some(acc * 26 + digit)
    })
    .map(|n| n - 1)
}

/// Converts a zero-based column index to letters (0 → `A`, 26 → `AA`).
#[must_use]
pub fn column_letters(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    letters.reverse();
    String::from_utf8_lossy(&letters).into_owned()
}
