//! Fixed worksheet layout shared by every backend.
//!
//! ```text
//!   A..H  active tracker (header in row 1, data from row 2)
//!   J..N  closed trades  (header in row 1, appended below)
//! ```

/// Active tracker header, `A1:H1`.
pub const ACTIVE_HEADER: [&str; 8] = [
    "Ticker",
    "Qty",
    "Cost Basis",
    "Current Price",
    "% Gain",
    "All-Time High % Gain",
    "Armed?",
    "Last Updated",
];

/// Closed trades header, `J1:N1`. Data rows leave column J blank.
pub const CLOSED_HEADER: [&str; 5] = ["Closed Trades", "Ticker", "% Gain/Loss", "Armed?", "Closed At"];

pub const ACTIVE_HEADER_RANGE: &str = "A1:H1";
pub const CLOSED_HEADER_RANGE: &str = "J1:N1";

/// Table anchor used when appending closed trades.
pub const CLOSED_TABLE_RANGE: &str = "J1:N";

/// Columns in the active region.
pub const ACTIVE_COLUMNS: usize = ACTIVE_HEADER.len();

/// Size of a freshly created worksheet.
pub const NEW_SHEET_ROWS: usize = 500;
pub const NEW_SHEET_COLUMNS: usize = 20;

/// Data range of the active region for a capacity counted in sheet rows,
/// header included: 500 gives `A2:H500`, i.e. 499 tracked tickers.
#[must_use]
pub fn active_data_range(capacity_rows: usize) -> String {
    format!("A2:H{}", capacity_rows.max(2))
}

/// Number of ticker rows that fit in the active region.
#[must_use]
pub fn active_data_rows(capacity_rows: usize) -> usize {
    capacity_rows.max(2) - 1
}

/// True if the first cells of `existing` equal `expected`.
#[must_use]
pub fn header_matches(existing: Option<&Vec<String>>, expected: &[&str]) -> bool {
    existing.is_some_and(|row| {
        row.len() >= expected.len() && row.iter().zip(expected).all(|(have, want)| have == want)
    })
}

/// `expected` as an owned row for writing.
#[must_use]
pub fn header_row(expected: &[&str]) -> Vec<Vec<String>> {
    vec![expected.iter().map(|s| (*s).to_string()).collect()]
}
