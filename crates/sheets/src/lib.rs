//! Worksheet-backed persistence for the trailing-stop monitor.
//!
//! The tracker lives in a single worksheet tab:
//!
//! - `A1:H1` active header, active rows below it up to a fixed capacity
//! - `J1:N1` closed-trades header, closed trades appended below it
//!
//! [`SheetStateStore`] implements `StateStore` over any [`Worksheet`].
//! Backends:
//!
//! - [`GoogleSheetsWorksheet`]: Sheets v4 REST API with a service account
//! - [`CsvWorksheet`]: a local CSV file holding the same grid
//! - [`MemoryWorksheet`]: in-process, for tests and dry runs

pub mod a1;
pub mod csv_sheet;
pub mod error;
pub mod google;
pub mod grid;
pub mod layout;
pub mod merge;
pub mod store;
pub mod worksheet;

pub use csv_sheet::CsvWorksheet;
pub use error::{Result, SheetsError};
pub use google::{GoogleSheetsWorksheet, ServiceAccountAuth, SpreadsheetRef};
pub use grid::Grid;
pub use store::SheetStateStore;
pub use worksheet::{MemoryWorksheet, Worksheet};
