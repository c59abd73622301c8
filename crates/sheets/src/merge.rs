//! Conversion between worksheet rows and tracker records.
//!
//! Loading is lenient: rows may be ragged, cells blank or unparseable.
//! A blank watermark is carried as `None` so the decision engine seeds
//! it from the live gain on the next cycle.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use tracing::{debug, warn};
use trailstop_core::{parse_decimal, ActiveRecord, ClosedTradeRecord};

use crate::layout::ACTIVE_COLUMNS;

/// Rows ready to be written over the active region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveBlock {
    /// Exactly `capacity` rows of `ACTIVE_COLUMNS` cells, blank-padded.
    pub rows: Vec<Vec<String>>,
    pub written: usize,
    /// Tickers that did not fit.
    pub dropped: Vec<String>,
}

/// Parses the active region into records keyed by ticker.
///
/// Fully empty rows and rows without a ticker are ignored. If a ticker
/// appears more than once, the first row wins.
#[must_use]
pub fn records_from_rows(rows: &[Vec<String>]) -> HashMap<String, ActiveRecord> {
    let mut records = HashMap::new();
    for (index, row) in rows.iter().enumerate() {
        let Some(record) = record_from_row(row) else {
            continue;
        };
        if records.contains_key(&record.ticker) {
            warn!(ticker = %record.ticker, row = index + 2, "Duplicate ticker in active table, keeping first row");
            continue;
        }
        records.insert(record.ticker.clone(), record);
    }
    records
}

/// Parses one row, right-padding short rows with blanks.
#[must_use]
pub fn record_from_row(row: &[String]) -> Option<ActiveRecord> {
    if row.iter().all(|cell| cell.trim().is_empty()) {
        return None;
    }
    let cell = |i: usize| row.get(i).map_or("", |s| s.trim());

    let ticker = cell(0);
    if ticker.is_empty() {
        debug!(?row, "Ignoring active row without a ticker");
        return None;
    }

    Some(ActiveRecord {
        ticker: ticker.to_string(),
        quantity: parse_decimal(Some(cell(1))),
        cost_basis: parse_decimal(Some(cell(2))),
        current_price: parse_decimal(Some(cell(3))),
        percent_gain: parse_decimal(Some(cell(4))),
        all_time_high_pct: parse_decimal(Some(cell(5))),
        armed: cell(6).eq_ignore_ascii_case("TRUE"),
        last_updated: parse_timestamp(cell(7)),
    })
}

/// Renders a record as the eight active-table cells.
#[must_use]
pub fn record_to_row(record: &ActiveRecord) -> Vec<String> {
    vec![
        record.ticker.clone(),
        decimal_cell(record.quantity),
        decimal_cell(record.cost_basis),
        decimal_cell(record.current_price),
        decimal_cell(record.percent_gain),
        decimal_cell(record.all_time_high_pct),
        bool_cell(record.armed),
        record.last_updated.map(timestamp_cell).unwrap_or_default(),
    ]
}

/// Builds the full active block for a region of `capacity` data rows.
///
/// Records beyond capacity are not written; their tickers are returned
/// in [`ActiveBlock::dropped`] and logged.
#[must_use]
pub fn active_block(records: &[ActiveRecord], capacity: usize) -> ActiveBlock {
    let (fits, overflow) = records.split_at(records.len().min(capacity));

    let mut rows: Vec<Vec<String>> = fits.iter().map(record_to_row).collect();
    rows.resize_with(capacity, || vec![String::new(); ACTIVE_COLUMNS]);

    let dropped: Vec<String> = overflow.iter().map(|r| r.ticker.clone()).collect();
    if !dropped.is_empty() {
        warn!(
            capacity,
            dropped = dropped.len(),
            tickers = ?dropped,
            "Active table is full, rows beyond capacity are not persisted"
        );
    }

    ActiveBlock {
        rows,
        written: fits.len(),
        dropped,
    }
}

/// Renders a closed trade as the five cells of `J:N`.
#[must_use]
pub fn closed_row(record: &ClosedTradeRecord) -> Vec<String> {
    vec![
        String::new(),
        record.ticker.clone(),
        record.realized_pct.round_dp(2).to_string(),
        bool_cell(record.armed_at_close),
        timestamp_cell(record.closed_at),
    ]
}

fn decimal_cell(value: Option<Decimal>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn bool_cell(value: bool) -> String {
    let cell = if value { "TRUE" } else { "FALSE" };
    cell.to_string()
}

fn timestamp_cell(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, false)
}

/// Accepts RFC 3339 with any offset, or a naive timestamp read as UTC.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if raw.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
                .ok()
                .map(|naive| naive.and_utc())
        })
}
