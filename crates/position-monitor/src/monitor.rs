//! Bookkeeping for the active rows written back at the end of a cycle.

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};
use trailstop_core::{ActiveRecord, TrackedState};

/// Collects the rows that replace the active region.
///
/// Every ticker the broker still reports ends up in exactly one of three
/// states: a fresh row (kept), its previous row unchanged (skipped or
/// failed close), or absent (closed). Tickers the broker no longer reports
/// are not carried forward.
#[derive(Debug)]
pub struct ActiveSet<'a> {
    persisted: &'a HashMap<String, ActiveRecord>,
    seen: HashSet<String>,
    rows: Vec<ActiveRecord>,
}

impl<'a> ActiveSet<'a> {
    #[must_use]
    pub fn new(persisted: &'a HashMap<String, ActiveRecord>) -> Self {
        Self {
            persisted,
            seen: HashSet::new(),
            rows: Vec::with_capacity(persisted.len()),
        }
    }

    /// Marks `ticker` as handled this cycle. Returns false if the broker
    /// reported it more than once; later copies are ignored.
    pub fn claim(&mut self, ticker: &str) -> bool {
        if self.seen.insert(ticker.to_string()) {
            return true;
        }
        warn!(ticker, "Position reported twice, ignoring the duplicate");
        false
    }

    /// Tracked state persisted by the previous cycle, if any.
    #[must_use]
    pub fn prior_state(&self, ticker: &str) -> Option<TrackedState> {
        self.persisted.get(ticker).map(ActiveRecord::tracked_state)
    }

    pub fn keep(&mut self, record: ActiveRecord) {
        self.rows.push(record);
    }

    /// Writes the previous row back unchanged. Returns false if there was none.
    pub fn carry_forward(&mut self, ticker: &str) -> bool {
        match self.persisted.get(ticker) {
            Some(prior) => {
                debug!(ticker, "Carrying previous row forward");
                self.rows.push(prior.clone());
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn into_rows(self) -> Vec<ActiveRecord> {
        let vanished = self
            .persisted
            .keys()
            .filter(|t| !self.seen.contains(*t))
            .count();
        if vanished > 0 {
            debug!(count = vanished, "Dropping rows for positions no longer held");
        }
        self.rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn row(ticker: &str) -> ActiveRecord {
        ActiveRecord {
            ticker: ticker.to_string(),
            quantity: Some(dec!(1)),
            cost_basis: Some(dec!(100)),
            current_price: Some(dec!(101)),
            percent_gain: Some(dec!(1)),
            all_time_high_pct: Some(dec!(7)),
            armed: true,
            last_updated: None,
        }
    }

    fn persisted() -> HashMap<String, ActiveRecord> {
        ["AAPL", "GONE"]
            .into_iter()
            .map(|t| (t.to_string(), row(t)))
            .collect()
    }

    #[test]
    fn duplicates_are_claimed_once() {
        let persisted = persisted();
        let mut set = ActiveSet::new(&persisted);
        assert!(set.claim("AAPL"));
        assert!(!set.claim("AAPL"));
    }

    #[test]
    fn carry_forward_reuses_the_previous_row() {
        let persisted = persisted();
        let mut set = ActiveSet::new(&persisted);
        set.claim("AAPL");
        assert!(set.carry_forward("AAPL"));
        assert!(!set.carry_forward("NEW"));
        assert_eq!(set.into_rows(), vec![row("AAPL")]);
    }

    #[test]
    fn prior_state_exposes_watermark_and_arming() {
        let persisted = persisted();
        let set = ActiveSet::new(&persisted);
        let state = set.prior_state("AAPL").unwrap();
        assert_eq!(state.all_time_high_pct, Some(dec!(7)));
        assert!(state.armed);
        assert!(set.prior_state("MSFT").is_none());
    }

    #[test]
    fn unreported_tickers_are_not_carried() {
        let persisted = persisted();
        let mut set = ActiveSet::new(&persisted);
        set.claim("AAPL");
        set.keep(row("AAPL"));
        let rows = set.into_rows();
        assert_eq!(rows.len(), 1);
        assert!(rows.iter().all(|r| r.ticker != "GONE"));
    }
}
