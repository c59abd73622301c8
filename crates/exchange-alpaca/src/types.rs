//! Wire types for the Alpaca trading API.

use serde::{Deserialize, Deserializer};
use trailstop_core::PositionSnapshot;

/// Open position as returned by `GET /v2/positions`.
///
/// Alpaca encodes numerics as strings and may send `null` for prices it
/// cannot mark, so every numeric field is kept as an optional raw string
/// and validated when converting to a [`PositionSnapshot`].
#[derive(Debug, Clone, Deserialize)]
pub struct RawPosition {
    pub symbol: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub qty: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub avg_entry_price: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub current_price: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub side: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub asset_class: Option<String>,
}

impl RawPosition {
    /// Resolves pricing once, at the adapter boundary.
    #[must_use]
    pub fn into_snapshot(self) -> PositionSnapshot {
        PositionSnapshot::from_fields(
            &self.symbol,
            self.side.as_deref(),
            self.qty.as_deref(),
            self.avg_entry_price.as_deref(),
            self.current_price.as_deref(),
            self.asset_class.as_deref(),
        )
    }
}

/// Order created by a position close.
#[derive(Debug, Clone, Deserialize)]
pub struct CloseOrder {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        Some(serde_json::Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use trailstop_core::{AssetClass, Side};

    #[test]
    fn raw_position_accepts_strings_numbers_and_nulls() {
        let raw: RawPosition = serde_json::from_value(serde_json::json!({
            "symbol": "AAPL",
            "qty": "10",
            "avg_entry_price": 100.5,
            "current_price": null,
            "side": "long",
            "asset_class": "us_equity"
        }))
        .unwrap();

        assert_eq!(raw.avg_entry_price.as_deref(), Some("100.5"));
        assert!(raw.current_price.is_none());
        assert!(matches!(
            raw.into_snapshot(),
            PositionSnapshot::Unpriceable { .. }
        ));
    }

    #[test]
    fn raw_option_position_converts_to_priced_snapshot() {
        let raw: RawPosition = serde_json::from_value(serde_json::json!({
            "symbol": "AAPL250117C00150000",
            "qty": "-2",
            "avg_entry_price": "3.10",
            "current_price": "2.50",
            "side": "short",
            "asset_class": "us_option"
        }))
        .unwrap();

        match raw.into_snapshot() {
            PositionSnapshot::Priced(p) => {
                assert_eq!(p.side, Side::Short);
                assert_eq!(p.asset_class, AssetClass::UsOption);
                assert_eq!(p.ticker, "AAPL250117C00150000");
            }
            other => panic!("expected priced snapshot, got {other:?}"),
        }
    }
}
