//! Equity vs. option classification and threshold lookup.

use std::sync::OnceLock;

use regex::Regex;
use trailstop_core::{AssetClass, PositionSnapshot, ThresholdConfig};

use crate::types::ResolvedThresholds;

/// OCC-style option symbol: underlying (1-6 letters), expiry `YYMMDD`,
/// `C`/`P`, strike x 1000 in 8 digits. E.g. `AAPL250117C00150000`.
const OCC_OPTION_PATTERN: &str = r"^[A-Z]{1,6}\d{6}[CP]\d{8}$";

fn occ_option_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(OCC_OPTION_PATTERN).ok()).as_ref()
}

/// True if `symbol` is an OCC-style option symbol.
#[must_use]
pub fn looks_like_option_symbol(symbol: &str) -> bool {
    occ_option_regex().is_some_and(|re| re.is_match(symbol))
}

/// Picks the equity or option threshold set for a position.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThresholdResolver {
    config: ThresholdConfig,
}

impl ThresholdResolver {
    #[must_use]
    pub const fn new(config: ThresholdConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn resolve(&self, snapshot: &PositionSnapshot) -> ResolvedThresholds {
        self.resolve_for(snapshot.ticker(), snapshot.asset_class())
    }

    /// A position is an option if the broker says so or its symbol has
    /// the OCC shape, whatever the reported asset class.
    #[must_use]
    pub fn resolve_for(&self, ticker: &str, asset_class: &AssetClass) -> ResolvedThresholds {
        let is_option = asset_class.is_option_class() || looks_like_option_symbol(ticker);
        let set = if is_option {
            &self.config.option
        } else {
            &self.config.equity
        };
        ResolvedThresholds::from_set(set, is_option)
    }
}
