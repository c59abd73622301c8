//! The worksheet abstraction and its in-memory backend.

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::a1::CellRange;
use crate::error::Result;
use crate::grid::Grid;

/// A single tab of a spreadsheet addressed in A1 notation.
#[async_trait]
pub trait Worksheet: Send + Sync {
    /// Creates the worksheet if it does not exist yet.
    async fn ensure_exists(&self) -> Result<()>;

    /// Reads a range. Rows may be ragged and trailing blank rows omitted.
    async fn read_range(&self, range: &str) -> Result<Vec<Vec<String>>>;

    /// Overwrites cells starting at the top-left of `range`.
    async fn write_range(&self, range: &str, rows: &[Vec<String>]) -> Result<()>;

    /// Appends rows after the last non-blank row of the table at `range`.
    async fn append_rows(&self, range: &str, rows: &[Vec<String>]) -> Result<()>;
}

/// Worksheet held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryWorksheet {
    grid: Mutex<Grid>,
}

impl MemoryWorksheet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from existing cell contents.
    #[must_use]
    pub fn with_rows(rows: Vec<Vec<String>>) -> Self {
        Self {
            grid: Mutex::new(Grid::from_rows(rows)),
        }
    }

    /// Copy of the current grid.
    #[must_use]
    pub fn snapshot(&self) -> Grid {
        self.grid.lock().clone()
    }
}

#[async_trait]
impl Worksheet for MemoryWorksheet {
    async fn ensure_exists(&self) -> Result<()> {
        Ok(())
    }

    async fn read_range(&self, range: &str) -> Result<Vec<Vec<String>>> {
        let range: CellRange = range.parse()?;
        Ok(self.grid.lock().read(&range))
    }

    async fn write_range(&self, range: &str, rows: &[Vec<String>]) -> Result<()> {
        let range: CellRange = range.parse()?;
        self.grid.lock().write(&range, rows)
    }

    async fn append_rows(&self, range: &str, rows: &[Vec<String>]) -> Result<()> {
        let range: CellRange = range.parse()?;
        self.grid.lock().append(&range, rows);
        Ok(())
    }
}
