//! Worksheet stored as a local CSV file.
//!
//! The whole grid is read, modified and rewritten on every operation. The
//! rewrite goes through a sibling temp file and a rename, so a crash never
//! leaves a half-written grid behind.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::a1::CellRange;
use crate::error::{Result, SheetsError};
use crate::grid::Grid;
use crate::worksheet::Worksheet;

/// File I/O runs on the blocking pool, so a caller's timeout is not held
/// up by a slow disk. A timed-out operation still completes in the
/// background and keeps the file lock until it does.
#[derive(Debug, Clone)]
pub struct CsvWorksheet {
    file: Arc<CsvFile>,
}

#[derive(Debug)]
struct CsvFile {
    path: PathBuf,
    lock: Mutex<()>,
}

impl CsvWorksheet {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            file: Arc::new(CsvFile {
                path: path.into(),
                lock: Mutex::new(()),
            }),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.file.path
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&CsvFile) -> Result<T> + Send + 'static,
    {
        let file = Arc::clone(&self.file);
        tokio::task::spawn_blocking(move || op(&file))
            .await
            .map_err(|e| SheetsError::Io(format!("CSV worksheet task failed: {e}")))?
    }
}

impl CsvFile {
    fn load(&self) -> Result<Grid> {
        if !self.path.exists() {
            return Ok(Grid::default());
        }
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(&self.path)?;

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(str::to_string).collect());
        }
        Ok(Grid::from_rows(rows))
    }

    fn save(&self, grid: &Grid) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let tmp = self.path.with_extension("csv.tmp");
        {
            let mut writer = csv::WriterBuilder::new()
                .has_headers(false)
                .flexible(true)
                .from_path(&tmp)?;
            // Fixed width keeps blank rows as `,,,` lines; a truly empty
            // line would be skipped on read and shift every row below it.
            let width = grid
                .rows()
                .iter()
                .filter_map(|row| row.iter().rposition(|c| !c.is_empty()))
                .max()
                .map_or(2, |last| (last + 1).max(2));
            for row in grid.rows() {
                let padded = (0..width).map(|i| row.get(i).map_or("", String::as_str));
                writer.write_record(padded)?;
            }
            writer.flush()?;
        }
        fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), rows = grid.rows().len(), "CSV worksheet saved");
        Ok(())
    }

    fn modify<T>(&self, apply: impl FnOnce(&mut Grid) -> Result<T>) -> Result<T> {
        let _guard = self.lock.lock();
        let mut grid = self.load()?;
        let out = apply(&mut grid)?;
        self.save(&grid)?;
        Ok(out)
    }
}

#[async_trait]
impl Worksheet for CsvWorksheet {
    async fn ensure_exists(&self) -> Result<()> {
        self.blocking(|file| {
            let _guard = file.lock.lock();
            if file.path.exists() {
                return Ok(());
            }
            info!(path = %file.path.display(), "Creating CSV worksheet");
            file.save(&Grid::default())
        })
        .await
    }

    async fn read_range(&self, range: &str) -> Result<Vec<Vec<String>>> {
        let range: CellRange = range.parse()?;
        self.blocking(move |file| {
            let _guard = file.lock.lock();
            Ok(file.load()?.read(&range))
        })
        .await
    }

    async fn write_range(&self, range: &str, rows: &[Vec<String>]) -> Result<()> {
        let range: CellRange = range.parse()?;
        let rows = rows.to_vec();
        self.blocking(move |file| file.modify(|grid| grid.write(&range, &rows)))
            .await
    }

    async fn append_rows(&self, range: &str, rows: &[Vec<String>]) -> Result<()> {
        let range: CellRange = range.parse()?;
        let rows = rows.to_vec();
        self.blocking(move |file| {
            file.modify(|grid| {
                grid.append(&range, &rows);
                Ok(())
            })
        })
        .await
    }
}
