//! `StateStore` over any [`Worksheet`].

use std::collections::HashMap;

use async_trait::async_trait;
use tracing::{debug, info};
use trailstop_core::{
    ActiveRecord, ClosedTradeRecord, MonitorError, ReplaceOutcome, Result as MonitorResult,
    StateStore,
};

use crate::error::{Result, SheetsError};
use crate::layout::{
    active_data_range, active_data_rows, header_matches, header_row, ACTIVE_HEADER,
    ACTIVE_HEADER_RANGE, CLOSED_HEADER, CLOSED_HEADER_RANGE, CLOSED_TABLE_RANGE,
};
use crate::merge::{active_block, closed_row, records_from_rows};
use crate::worksheet::Worksheet;

/// Tracker state kept in a worksheet: active rows in `A:H`, closed
/// trades appended to `J:N`.
#[derive(Debug)]
pub struct SheetStateStore<W> {
    worksheet: W,
    /// Active region size in sheet rows, header included.
    capacity_rows: usize,
}

impl<W: Worksheet> SheetStateStore<W> {
    pub fn new(worksheet: W, capacity_rows: usize) -> Self {
        Self {
            worksheet,
            capacity_rows,
        }
    }

    #[must_use]
    pub fn worksheet(&self) -> &W {
        &self.worksheet
    }

    /// Rewrites a header row if it is missing or differs from `expected`.
    async fn ensure_header(&self, range: &str, expected: &[&str]) -> Result<()> {
        let existing = self.worksheet.read_range(range).await?;
        if header_matches(existing.first(), expected) {
            return Ok(());
        }
        info!(range, "Header missing or mismatched, rewriting");
        self.worksheet.write_range(range, &header_row(expected)).await
    }

    async fn prepare_inner(&self) -> Result<()> {
        self.worksheet.ensure_exists().await?;
        self.ensure_header(ACTIVE_HEADER_RANGE, &ACTIVE_HEADER).await?;
        self.ensure_header(CLOSED_HEADER_RANGE, &CLOSED_HEADER).await
    }
}

fn boundary(operation: &'static str) -> impl FnOnce(SheetsError) -> MonitorError {
    move |err| err.into_monitor(operation)
}

#[async_trait]
impl<W: Worksheet> StateStore for SheetStateStore<W> {
    async fn prepare(&self) -> MonitorResult<()> {
        self.prepare_inner().await.map_err(boundary("prepare"))
    }

    async fn load_all(&self) -> MonitorResult<HashMap<String, ActiveRecord>> {
        let rows = self
            .worksheet
            .read_range(&active_data_range(self.capacity_rows))
            .await
            .map_err(boundary("load_all"))?;
        let records = records_from_rows(&rows);
        debug!(rows = rows.len(), records = records.len(), "Loaded active tracker");
        Ok(records)
    }

    async fn replace_active(&self, records: &[ActiveRecord]) -> MonitorResult<ReplaceOutcome> {
        let block = active_block(records, active_data_rows(self.capacity_rows));
        self.worksheet
            .write_range(&active_data_range(self.capacity_rows), &block.rows)
            .await
            .map_err(boundary("replace_active"))?;
        debug!(written = block.written, dropped = block.dropped.len(), "Active tracker replaced");
        Ok(ReplaceOutcome {
            written: block.written,
            dropped: block.dropped,
        })
    }

    async fn append_closed(&self, record: &ClosedTradeRecord) -> MonitorResult<()> {
        self.worksheet
            .append_rows(CLOSED_TABLE_RANGE, &[closed_row(record)])
            .await
            .map_err(boundary("append_closed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worksheet::MemoryWorksheet;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn store() -> SheetStateStore<MemoryWorksheet> {
        SheetStateStore::new(MemoryWorksheet::new(), 5)
    }

    fn record(ticker: &str) -> ActiveRecord {
        ActiveRecord {
            ticker: ticker.to_string(),
            quantity: Some(dec!(1)),
            cost_basis: Some(dec!(100)),
            current_price: Some(dec!(102)),
            percent_gain: Some(dec!(2)),
            all_time_high_pct: Some(dec!(6)),
            armed: true,
            last_updated: Some(Utc::now()),
        }
    }

    #[tokio::test]
    async fn prepare_writes_both_headers() {
        let store = store();
        store.prepare().await.unwrap();

        let grid = store.worksheet().snapshot();
        assert_eq!(grid.cell(0, 0), "Ticker");
        assert_eq!(grid.cell(0, 7), "Last Updated");
        assert_eq!(grid.cell(0, 8), "");
        assert_eq!(grid.cell(0, 9), "Closed Trades");
        assert_eq!(grid.cell(0, 13), "Closed At");
    }

    #[tokio::test]
    async fn prepare_repairs_a_mismatched_header_without_touching_data() {
        let rows = vec![
            vec!["Symbol".to_string(), "Qty".to_string()],
            vec!["AAPL".to_string(), "10".to_string()],
        ];
        let store = SheetStateStore::new(MemoryWorksheet::with_rows(rows), 5);
        store.prepare().await.unwrap();

        let grid = store.worksheet().snapshot();
        assert_eq!(grid.cell(0, 0), "Ticker");
        assert_eq!(grid.cell(1, 0), "AAPL");
    }

    #[tokio::test]
    async fn replace_then_load_round_trips() {
        let store = store();
        store.prepare().await.unwrap();

        let outcome = store.replace_active(&[record("AAPL"), record("MSFT")]).await.unwrap();
        assert_eq!(outcome.written, 2);

        let loaded = store.load_all().await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded["AAPL"].all_time_high_pct, Some(dec!(6)));
        assert!(loaded["MSFT"].armed);
    }

    #[tokio::test]
    async fn replace_clears_rows_of_tickers_no_longer_present() {
        let store = store();
        store.replace_active(&[record("AAPL"), record("MSFT")]).await.unwrap();
        store.replace_active(&[record("MSFT")]).await.unwrap();

        let loaded = store.load_all().await.unwrap();
        assert_eq!(loaded.keys().collect::<Vec<_>>(), vec!["MSFT"]);
        assert_eq!(store.worksheet().snapshot().cell(2, 0), "");
    }

    #[tokio::test]
    async fn overflow_beyond_capacity_is_reported() {
        let store = store();
        let records: Vec<ActiveRecord> = ["A", "B", "C", "D", "E", "F"].iter().map(|t| record(t)).collect();

        let outcome = store.replace_active(&records).await.unwrap();

        assert_eq!(outcome.written, 4);
        assert_eq!(outcome.dropped, vec!["E".to_string(), "F".to_string()]);
        // Row 6 lies outside A2:H5.
        assert_eq!(store.worksheet().snapshot().cell(5, 0), "");
    }

    #[tokio::test]
    async fn closed_trades_are_appended_under_their_header() {
        let store = store();
        store.prepare().await.unwrap();
        for ticker in ["TSLA", "NVDA"] {
            store
                .append_closed(&ClosedTradeRecord {
                    ticker: ticker.to_string(),
                    realized_pct: dec!(-3.5),
                    armed_at_close: false,
                    closed_at: Utc::now(),
                })
                .await
                .unwrap();
        }

        let grid = store.worksheet().snapshot();
        assert_eq!(grid.cell(1, 10), "TSLA");
        assert_eq!(grid.cell(2, 10), "NVDA");
        assert_eq!(grid.cell(2, 11), "-3.5");
        assert_eq!(grid.cell(2, 12), "FALSE");
    }
}
