//! Stop-loss and trailing-stop rules.
//!
//! Per position and cycle:
//!
//! 1. Unpriceable positions are skipped.
//! 2. The watermark starts from the persisted value, or from the live gain
//!    on first sighting.
//! 3. A negative gain resets the watermark to the gain and disarms.
//!    Otherwise the watermark ratchets up and arming is sticky once the
//!    watermark reaches `armed_gain_pct`.
//! 4. Stop-loss fires at `gain <= stop_loss_pct`; the trailing stop fires
//!    when armed and `gain <= watermark - trail_drop_pct`.
//!
//! All comparisons use unrounded values. Rounding to two decimals happens
//! only when building the persisted row.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use trailstop_core::{ActiveRecord, PositionSnapshot, TrackedState};

use crate::types::{CloseReason, Decision, ResolvedThresholds};

/// State after applying one reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub percent_gain: Decimal,
    pub watermark: Decimal,
    pub armed: bool,
    /// The rule that fired, stop-loss taking precedence.
    pub exit: Option<CloseReason>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DecisionEngine;

impl DecisionEngine {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Applies one percent-gain reading to the prior state.
    #[must_use]
    pub fn evaluate(
        &self,
        percent_gain: Decimal,
        thresholds: &ResolvedThresholds,
        prior: Option<&TrackedState>,
    ) -> Evaluation {
        let mut watermark = prior
            .and_then(|p| p.all_time_high_pct)
            .unwrap_or(percent_gain);
        let mut armed = prior.is_some_and(|p| p.armed);

        if percent_gain < Decimal::ZERO {
            watermark = percent_gain;
            armed = false;
        } else {
            watermark = watermark.max(percent_gain);
            if watermark >= thresholds.armed_gain_pct {
                armed = true;
            }
        }

        let exit = if percent_gain <= thresholds.stop_loss_pct {
            Some(CloseReason::StopLoss)
        } else if armed && hits_trail(percent_gain, watermark, thresholds.trail_drop_pct) {
            Some(CloseReason::TrailingStop)
        } else {
            None
        };

        Evaluation {
            percent_gain,
            watermark,
            armed,
            exit,
        }
    }

    /// Decides what to do with one position.
    #[must_use]
    pub fn decide(
        &self,
        snapshot: &PositionSnapshot,
        thresholds: &ResolvedThresholds,
        prior: Option<&TrackedState>,
        now: DateTime<Utc>,
    ) -> Decision {
        let position = match snapshot {
            PositionSnapshot::Priced(position) => position,
            PositionSnapshot::Unpriceable { reason, .. } => {
                return Decision::Skip {
                    reason: reason.clone(),
                }
            }
        };

        let Some(percent_gain) = position.percent_gain() else {
            return Decision::Skip {
                reason: format!(
                    "percent gain out of range (cost {}, current {})",
                    position.cost_basis, position.current_price
                ),
            };
        };
        let eval = self.evaluate(percent_gain, thresholds, prior);

        if let Some(reason) = eval.exit {
            return Decision::Close {
                realized_pct: eval.percent_gain,
                armed_at_close: eval.armed,
                reason,
            };
        }

        Decision::Keep(ActiveRecord {
            ticker: position.ticker.clone(),
            quantity: Some(position.quantity),
            cost_basis: Some(position.cost_basis),
            current_price: Some(position.current_price),
            percent_gain: Some(eval.percent_gain.round_dp(2)),
            all_time_high_pct: Some(eval.watermark.round_dp(2)),
            armed: eval.armed,
            last_updated: Some(now),
        })
    }
}

/// `gain <= watermark - trail_drop`, without overflowing near the edge of
/// the `Decimal` range.
fn hits_trail(gain: Decimal, watermark: Decimal, trail_drop: Decimal) -> bool {
    match watermark.checked_sub(trail_drop) {
        Some(line) => gain <= line,
        // Overflowed below the range when trail_drop > 0, above it otherwise.
        None => trail_drop.is_sign_negative(),
    }
}
