use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Direction of an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// Parses a broker-reported side. Anything other than `short` is long.
    #[must_use]
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("short") => Self::Short,
            _ => Self::Long,
        }
    }
}

/// Broker-reported asset class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssetClass {
    UsEquity,
    UsOption,
    Crypto,
    Other(String),
    Unknown,
}

impl AssetClass {
    #[must_use]
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
            return Self::Unknown;
        };
        match raw.to_ascii_lowercase().as_str() {
            "us_equity" => Self::UsEquity,
            "us_option" => Self::UsOption,
            "crypto" => Self::Crypto,
            other => Self::Other(other.to_string()),
        }
    }

    /// True for asset classes the broker uses for listed options.
    #[must_use]
    pub const fn is_option_class(&self) -> bool {
        matches!(self, Self::UsOption)
    }
}

/// A position with everything needed to compute its gain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedPosition {
    pub ticker: String,
    pub side: Side,
    pub quantity: Decimal,
    pub cost_basis: Decimal,
    pub current_price: Decimal,
    pub asset_class: AssetClass,
}

impl PricedPosition {
    /// Percent gain relative to cost basis, signed by position side.
    ///
    /// Returns `None` if the cost basis is zero or the result does not fit
    /// in a `Decimal` (e.g. a near-zero cost basis).
    #[must_use]
    pub fn percent_gain(&self) -> Option<Decimal> {
        let delta = match self.side {
            Side::Long => self.current_price.checked_sub(self.cost_basis)?,
            Side::Short => self.cost_basis.checked_sub(self.current_price)?,
        };
        delta
            .checked_div(self.cost_basis)?
            .checked_mul(Decimal::ONE_HUNDRED)
    }
}

/// One open position as fetched at the start of a cycle.
///
/// Pricing is validated once at the adapter boundary: a position either
/// carries a usable cost basis and current price, or it is `Unpriceable`
/// and the monitor skips it for the cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PositionSnapshot {
    Priced(PricedPosition),
    Unpriceable {
        ticker: String,
        asset_class: AssetClass,
        reason: String,
    },
}

impl PositionSnapshot {
    /// Builds a snapshot from loosely-typed broker fields.
    ///
    /// Missing quantity reads as zero and a missing side as long. A missing,
    /// blank or non-numeric cost basis or current price, or a zero cost
    /// basis, yields `Unpriceable`.
    #[must_use]
    pub fn from_fields(
        ticker: &str,
        side: Option<&str>,
        quantity: Option<&str>,
        cost_basis: Option<&str>,
        current_price: Option<&str>,
        asset_class: Option<&str>,
    ) -> Self {
        let ticker = ticker.trim().to_string();
        let asset_class = AssetClass::parse(asset_class);
        let cost = parse_decimal(cost_basis);
        let current = parse_decimal(current_price);

        let reason = match (cost, current) {
            (None, _) => Some(format!("avg entry price unusable ({})", describe(cost_basis))),
            (_, None) => Some(format!("current price unusable ({})", describe(current_price))),
            (Some(c), _) if c.is_zero() => Some("avg entry price is zero".to_string()),
            _ => None,
        };

        match (reason, cost, current) {
            (None, Some(cost_basis), Some(current_price)) => Self::Priced(PricedPosition {
                ticker,
                side: Side::parse(side),
                quantity: parse_decimal(quantity).unwrap_or(Decimal::ZERO),
                cost_basis,
                current_price,
                asset_class,
            }),
            (reason, _, _) => Self::Unpriceable {
                ticker,
                asset_class,
                reason: reason.unwrap_or_else(|| "pricing unavailable".to_string()),
            },
        }
    }

    #[must_use]
    pub fn ticker(&self) -> &str {
        match self {
            Self::Priced(p) => &p.ticker,
            Self::Unpriceable { ticker, .. } => ticker,
        }
    }

    #[must_use]
    pub const fn asset_class(&self) -> &AssetClass {
        match self {
            Self::Priced(p) => &p.asset_class,
            Self::Unpriceable { asset_class, .. } => asset_class,
        }
    }
}

fn describe(raw: Option<&str>) -> String {
    match raw {
        None => "missing".to_string(),
        Some(s) if s.trim().is_empty() => "blank".to_string(),
        Some(s) => format!("{s:?}"),
    }
}

/// Lenient decimal parsing used for broker payloads and persisted cells.
///
/// Blank or unparseable input yields `None`. Scientific notation is accepted.
#[must_use]
pub fn parse_decimal(raw: Option<&str>) -> Option<Decimal> {
    let s = raw?.trim();
    if s.is_empty() {
        return None;
    }
    Decimal::from_str(s)
        .or_else(|_| Decimal::from_scientific(s))
        .ok()
}
