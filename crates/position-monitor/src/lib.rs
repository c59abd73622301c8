//! Trailing-stop / stop-loss position monitor.
//!
//! Runs as a long-lived service that, once per cycle:
//! - Loads the tracked watermark and arming state of every ticker
//! - Fetches open positions from the broker
//! - Resolves equity or option thresholds per position
//! - Closes positions that hit the stop-loss or retrace from an armed high
//! - Writes the surviving rows back and appends closed trades
//!
//! All rules are deterministic; decisions are plain values.

pub mod decision;
pub mod monitor;
pub mod service;
pub mod thresholds;
pub mod types;

pub use decision::{DecisionEngine, Evaluation};
pub use monitor::ActiveSet;
pub use service::Monitor;
pub use thresholds::{looks_like_option_symbol, ThresholdResolver};
pub use types::{CloseReason, CycleReport, Decision, ResolvedThresholds, TickerOutcome, TickerReport};
