use crate::error::{MonitorError, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Immutable configuration built once at startup.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub thresholds: ThresholdConfig,
    pub alpaca: AlpacaConfig,
    pub sheet: SheetConfig,
    pub monitor: MonitorConfig,
}

/// Exit thresholds for one asset class, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdSet {
    /// Close when percent gain is at or below this value (negative).
    pub stop_loss_pct: Decimal,
    /// Arm the trailing exit once the watermark reaches this value.
    pub armed_gain_pct: Decimal,
    /// Close an armed position once it retraces this far from its watermark.
    pub trail_drop_pct: Decimal,
}

impl ThresholdSet {
    /// Equity defaults: stop-loss -3%, arm at +5%, trail 3%.
    #[must_use]
    pub fn equity_defaults() -> Self {
        Self {
            stop_loss_pct: Decimal::new(-3, 0),
            armed_gain_pct: Decimal::new(5, 0),
            trail_drop_pct: Decimal::new(3, 0),
        }
    }
}

impl Default for ThresholdSet {
    fn default() -> Self {
        Self::equity_defaults()
    }
}

/// Equity thresholds plus option-specific overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ThresholdConfig {
    pub equity: ThresholdSet,
    /// Each unset option value falls back to the equity value.
    pub option: ThresholdSet,
}

/// Broker connection settings.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlpacaConfig {
    pub base_url: String,
    pub key_id: Option<String>,
    pub secret_key: Option<String>,
    pub timeout_secs: u64,
    pub requests_per_minute: u32,
}

impl Default for AlpacaConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.alpaca.markets".to_string(),
            key_id: None,
            secret_key: None,
            timeout_secs: 15,
            requests_per_minute: 180,
        }
    }
}

impl std::fmt::Debug for AlpacaConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlpacaConfig")
            .field("base_url", &self.base_url)
            .field("key_id", &self.key_id.as_ref().map(|_| "[REDACTED]"))
            .field("secret_key", &self.secret_key.as_ref().map(|_| "[REDACTED]"))
            .field("timeout_secs", &self.timeout_secs)
            .field("requests_per_minute", &self.requests_per_minute)
            .finish()
    }
}

/// Which worksheet implementation backs the state store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SheetBackend {
    #[default]
    Google,
    Csv,
}

/// Persistence settings.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetConfig {
    pub backend: SheetBackend,
    /// Takes precedence over `spreadsheet_title` when set.
    pub spreadsheet_id: Option<String>,
    /// Spreadsheet looked up by name when no id is given.
    pub spreadsheet_title: String,
    pub worksheet: String,
    /// Service-account key JSON for the Google backend.
    pub credentials_json: Option<String>,
    pub csv_path: PathBuf,
    /// Total rows of the active region, header included.
    pub capacity_rows: usize,
    pub timeout_secs: u64,
}

impl Default for SheetConfig {
    fn default() -> Self {
        Self {
            backend: SheetBackend::Google,
            spreadsheet_id: None,
            spreadsheet_title: "Active-Investing".to_string(),
            worksheet: "Alpaca-Trader".to_string(),
            credentials_json: None,
            csv_path: PathBuf::from("data/alpaca-trader.csv"),
            capacity_rows: 500,
            timeout_secs: 15,
        }
    }
}

impl std::fmt::Debug for SheetConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SheetConfig")
            .field("backend", &self.backend)
            .field("spreadsheet_id", &self.spreadsheet_id)
            .field("spreadsheet_title", &self.spreadsheet_title)
            .field("worksheet", &self.worksheet)
            .field(
                "credentials_json",
                &self.credentials_json.as_ref().map(|_| "[REDACTED]"),
            )
            .field("csv_path", &self.csv_path)
            .field("capacity_rows", &self.capacity_rows)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Cycle cadence and deadlines.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Idle interval between cycles.
    pub interval_secs: u64,
    /// Upper bound on a whole cycle.
    pub cycle_timeout_secs: u64,
    /// Upper bound on any single collaborator call.
    pub call_timeout_secs: u64,
    /// Simulate closes instead of sending them to the broker.
    pub dry_run: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            cycle_timeout_secs: 120,
            call_timeout_secs: 30,
            dry_run: false,
        }
    }
}

impl AppConfig {
    /// Checks that required credentials are present.
    ///
    /// # Errors
    ///
    /// Returns `MonitorError::Config` naming the first missing setting.
    pub fn validate(&self) -> Result<()> {
        if is_blank(self.alpaca.key_id.as_deref()) || is_blank(self.alpaca.secret_key.as_deref()) {
            return Err(MonitorError::Config(
                "ALPACA_API_KEY / ALPACA_API_SECRET missing".to_string(),
            ));
        }

        match self.sheet.backend {
            SheetBackend::Google => {
                if is_blank(self.sheet.credentials_json.as_deref()) {
                    return Err(MonitorError::Config(
                        "GOOGLE_CREDS_JSON env variable missing".to_string(),
                    ));
                }
                if is_blank(self.sheet.spreadsheet_id.as_deref())
                    && is_blank(Some(&self.sheet.spreadsheet_title))
                {
                    return Err(MonitorError::Config(
                        "sheet.spreadsheet_id or sheet.spreadsheet_title is required for the google backend"
                            .to_string(),
                    ));
                }
            }
            SheetBackend::Csv => {}
        }

        if self.sheet.capacity_rows < 2 {
            return Err(MonitorError::Config(
                "sheet.capacity_rows must leave room for the header and at least one row"
                    .to_string(),
            ));
        }

        Ok(())
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |v| v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete() -> AppConfig {
        let mut config = AppConfig::default();
        config.alpaca.key_id = Some("key".to_string());
        config.alpaca.secret_key = Some("secret".to_string());
        config.sheet.credentials_json = Some("{}".to_string());
        config.sheet.spreadsheet_id = Some("sheet-id".to_string());
        config
    }

    #[test]
    fn complete_config_validates() {
        assert!(complete().validate().is_ok());
    }

    #[test]
    fn missing_broker_credentials_is_fatal() {
        let mut config = complete();
        config.alpaca.secret_key = Some("  ".to_string());
        assert!(matches!(config.validate(), Err(MonitorError::Config(_))));
    }

    #[test]
    fn google_backend_requires_credentials() {
        let mut config = complete();
        config.sheet.credentials_json = None;
        assert!(matches!(config.validate(), Err(MonitorError::Config(_))));

        config.sheet.backend = SheetBackend::Csv;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn google_backend_accepts_a_title_instead_of_an_id() {
        let mut config = complete();
        config.sheet.spreadsheet_id = None;
        assert!(config.validate().is_ok());

        config.sheet.spreadsheet_title = " ".to_string();
        assert!(matches!(config.validate(), Err(MonitorError::Config(_))));
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let config = complete();
        let rendered = format!("{:?}", config.alpaca);
        assert!(!rendered.contains("\"secret\""));
        assert!(rendered.contains("[REDACTED]"));
    }
}
