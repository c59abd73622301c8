//! Google Sheets backend.

pub mod auth;
pub mod client;

pub use auth::ServiceAccountAuth;
pub use client::{GoogleSheetsWorksheet, SpreadsheetRef, DRIVE_API_URL, SHEETS_API_URL};
