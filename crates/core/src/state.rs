//! State carried between cycles: the active tracker rows and closed trades.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Watermark and arming state derived for one ticker.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TrackedState {
    /// Highest percent gain since the last drawdown reset. `None` means
    /// nothing usable was persisted and the live gain seeds the watermark.
    pub all_time_high_pct: Option<Decimal>,
    /// Whether the trailing exit is active.
    pub armed: bool,
    pub last_updated: Option<DateTime<Utc>>,
}

/// One row of the active tracker table.
///
/// Rows produced by the decision engine have every field populated. Rows
/// loaded from storage may have gaps where the persisted cells were blank
/// or unparseable; they are written back as blanks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveRecord {
    pub ticker: String,
    pub quantity: Option<Decimal>,
    pub cost_basis: Option<Decimal>,
    pub current_price: Option<Decimal>,
    /// Percent gain, rounded to 2 decimals.
    pub percent_gain: Option<Decimal>,
    /// Watermark, rounded to 2 decimals.
    pub all_time_high_pct: Option<Decimal>,
    pub armed: bool,
    pub last_updated: Option<DateTime<Utc>>,
}

impl ActiveRecord {
    /// The engine-facing view of this row.
    #[must_use]
    pub fn tracked_state(&self) -> TrackedState {
        TrackedState {
            all_time_high_pct: self.all_time_high_pct,
            armed: self.armed,
            last_updated: self.last_updated,
        }
    }
}

/// Append-only record of a position the monitor closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosedTradeRecord {
    pub ticker: String,
    /// Percent gain at the moment of close (unrounded).
    pub realized_pct: Decimal,
    pub armed_at_close: bool,
    pub closed_at: DateTime<Utc>,
}

/// Result of replacing the active region.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplaceOutcome {
    /// Rows written into the active region.
    pub written: usize,
    /// Tickers that did not fit within the row capacity.
    pub dropped: Vec<String>,
}
