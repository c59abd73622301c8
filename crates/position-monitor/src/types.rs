//! Types for position exit management.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use trailstop_core::{ActiveRecord, ThresholdSet};

/// Thresholds that apply to one position, and whether it was classified
/// as an option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResolvedThresholds {
    pub stop_loss_pct: Decimal,
    pub armed_gain_pct: Decimal,
    pub trail_drop_pct: Decimal,
    pub is_option: bool,
}

impl ResolvedThresholds {
    #[must_use]
    pub const fn from_set(set: &ThresholdSet, is_option: bool) -> Self {
        Self {
            stop_loss_pct: set.stop_loss_pct,
            armed_gain_pct: set.armed_gain_pct,
            trail_drop_pct: set.trail_drop_pct,
            is_option,
        }
    }

    /// `OPTION` or `STOCK`, for log lines.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        if self.is_option {
            "OPTION"
        } else {
            "STOCK"
        }
    }
}

/// Which exit rule fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    StopLoss,
    TrailingStop,
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StopLoss => write!(f, "stop_loss"),
            Self::TrailingStop => write!(f, "trailing_stop"),
        }
    }
}

/// Result of evaluating one position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Keep the position open and persist the updated row.
    Keep(ActiveRecord),
    /// Close the position. Nothing further is persisted for the ticker.
    Close {
        /// Unrounded percent gain at the moment of the decision.
        realized_pct: Decimal,
        armed_at_close: bool,
        reason: CloseReason,
    },
    /// Pricing is unusable; leave the ticker alone this cycle.
    Skip { reason: String },
}

/// What happened to one ticker during a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TickerOutcome {
    Kept {
        percent_gain: Decimal,
        watermark: Decimal,
        armed: bool,
    },
    Closed {
        realized_pct: Decimal,
        reason: CloseReason,
        /// False if the closed-trades append failed.
        recorded: bool,
    },
    CloseFailed {
        error: String,
    },
    Skipped {
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TickerReport {
    pub ticker: String,
    #[serde(flatten)]
    pub outcome: TickerOutcome,
}

/// Summary of one cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub tickers: Vec<TickerReport>,
    /// Rows written to the active region.
    pub written: usize,
    /// Tickers that did not fit in the active region.
    pub dropped: Vec<String>,
}

impl CycleReport {
    #[must_use]
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            tickers: Vec::new(),
            written: 0,
            dropped: Vec::new(),
        }
    }

    pub fn record(&mut self, ticker: impl Into<String>, outcome: TickerOutcome) {
        self.tickers.push(TickerReport {
            ticker: ticker.into(),
            outcome,
        });
    }

    #[must_use]
    pub fn outcome(&self, ticker: &str) -> Option<&TickerOutcome> {
        self.tickers
            .iter()
            .find(|t| t.ticker == ticker)
            .map(|t| &t.outcome)
    }

    #[must_use]
    pub fn kept(&self) -> usize {
        self.count(|o| matches!(o, TickerOutcome::Kept { .. }))
    }

    #[must_use]
    pub fn closed(&self) -> usize {
        self.count(|o| matches!(o, TickerOutcome::Closed { .. }))
    }

    #[must_use]
    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, TickerOutcome::Skipped { .. }))
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, TickerOutcome::CloseFailed { .. }))
    }

    fn count(&self, pred: impl Fn(&TickerOutcome) -> bool) -> usize {
        self.tickers.iter().filter(|t| pred(&t.outcome)).count()
    }
}
