use crate::config::{
    AlpacaConfig, AppConfig, MonitorConfig, SheetBackend, SheetConfig, ThresholdConfig, ThresholdSet,
};
use crate::error::{MonitorError, Result};
use crate::position::parse_decimal;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// Default location of the TOML configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/Config.toml";

/// Prefix for structured environment overrides (`TRAILSTOP_MONITOR__INTERVAL_SECS`).
pub const ENV_PREFIX: &str = "TRAILSTOP_";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads configuration from the TOML file at `path` and the process environment.
    ///
    /// # Errors
    ///
    /// Returns `MonitorError::Config` if a non-threshold setting has the wrong type.
    pub fn load(path: impl AsRef<Path>) -> Result<AppConfig> {
        Self::load_with_env(path, std::env::vars())
    }

    /// Loads configuration with an explicit set of legacy environment variables.
    ///
    /// Merge order, later wins: TOML file, legacy variables
    /// (`STOP_LOSS_PCT`, `ALPACA_API_KEY`, ...), then `TRAILSTOP_`-prefixed
    /// variables with `__` separating section and key.
    ///
    /// # Errors
    ///
    /// Returns `MonitorError::Config` if a non-threshold setting has the wrong type.
    pub fn load_with_env<I>(path: impl AsRef<Path>, vars: I) -> Result<AppConfig>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let raw: RawAppConfig = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Serialized::defaults(LegacyEnv::collect(vars)))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| MonitorError::Config(e.to_string()))?;

        Ok(AppConfig {
            thresholds: resolve_thresholds(&raw.thresholds),
            alpaca: raw.alpaca.resolve(),
            sheet: raw.sheet.resolve(),
            monitor: raw.monitor.resolve(),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawAppConfig {
    thresholds: RawThresholds,
    alpaca: RawAlpaca,
    sheet: RawSheet,
    monitor: RawMonitor,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawThresholds {
    stop_loss_pct: Option<RawNumber>,
    armed_gain_pct: Option<RawNumber>,
    trail_drop_pct: Option<RawNumber>,
    option_stop_loss_pct: Option<RawNumber>,
    option_armed_gain_pct: Option<RawNumber>,
    option_trail_drop_pct: Option<RawNumber>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawAlpaca {
    base_url: Option<String>,
    key_id: Option<String>,
    secret_key: Option<String>,
    timeout_secs: Option<RawNumber>,
    requests_per_minute: Option<RawNumber>,
}

impl RawAlpaca {
    fn resolve(self) -> AlpacaConfig {
        let defaults = AlpacaConfig::default();
        AlpacaConfig {
            base_url: self.base_url.unwrap_or(defaults.base_url),
            key_id: self.key_id,
            secret_key: self.secret_key,
            timeout_secs: lenient_int("alpaca.timeout_secs", self.timeout_secs.as_ref(), defaults.timeout_secs),
            requests_per_minute: lenient_int(
                "alpaca.requests_per_minute",
                self.requests_per_minute.as_ref(),
                defaults.requests_per_minute,
            ),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSheet {
    backend: Option<SheetBackend>,
    spreadsheet_id: Option<String>,
    spreadsheet_title: Option<String>,
    worksheet: Option<String>,
    credentials_json: Option<String>,
    csv_path: Option<PathBuf>,
    capacity_rows: Option<RawNumber>,
    timeout_secs: Option<RawNumber>,
}

impl RawSheet {
    fn resolve(self) -> SheetConfig {
        let defaults = SheetConfig::default();
        SheetConfig {
            backend: self.backend.unwrap_or(defaults.backend),
            spreadsheet_id: self.spreadsheet_id,
            spreadsheet_title: self.spreadsheet_title.unwrap_or(defaults.spreadsheet_title),
            worksheet: self.worksheet.unwrap_or(defaults.worksheet),
            credentials_json: self.credentials_json,
            csv_path: self.csv_path.unwrap_or(defaults.csv_path),
            capacity_rows: lenient_int("sheet.capacity_rows", self.capacity_rows.as_ref(), defaults.capacity_rows),
            timeout_secs: lenient_int("sheet.timeout_secs", self.timeout_secs.as_ref(), defaults.timeout_secs),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawMonitor {
    interval_secs: Option<RawNumber>,
    cycle_timeout_secs: Option<RawNumber>,
    call_timeout_secs: Option<RawNumber>,
    dry_run: Option<bool>,
}

impl RawMonitor {
    fn resolve(self) -> MonitorConfig {
        let defaults = MonitorConfig::default();
        MonitorConfig {
            interval_secs: lenient_int("monitor.interval_secs", self.interval_secs.as_ref(), defaults.interval_secs),
            cycle_timeout_secs: lenient_int(
                "monitor.cycle_timeout_secs",
                self.cycle_timeout_secs.as_ref(),
                defaults.cycle_timeout_secs,
            ),
            call_timeout_secs: lenient_int(
                "monitor.call_timeout_secs",
                self.call_timeout_secs.as_ref(),
                defaults.call_timeout_secs,
            ),
            dry_run: self.dry_run.unwrap_or(defaults.dry_run),
        }
    }
}

/// A number as written by the operator, before validation.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawNumber {
    Number(f64),
    Text(String),
    Other(serde::de::IgnoredAny),
}

/// Environment variables from the original deployment, mapped onto config keys.
#[derive(Debug, Default, Serialize)]
struct LegacyEnv {
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    thresholds: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    alpaca: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    sheet: BTreeMap<String, String>,
    #[serde(skip)]
    exact: BTreeSet<&'static str>,
}

impl LegacyEnv {
    fn collect<I>(vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut env = Self::default();
        for (name, value) in vars {
            let Some(legacy) = legacy_key(&name) else {
                continue;
            };
            // The exact spelling wins over any other casing, whatever the order.
            let exact = name == legacy.name;
            if !exact && env.exact.contains(legacy.key) {
                continue;
            }
            if exact {
                env.exact.insert(legacy.key);
            }
            let target = match legacy.section {
                "thresholds" => &mut env.thresholds,
                "alpaca" => &mut env.alpaca,
                _ => &mut env.sheet,
            };
            target.insert(legacy.key.to_string(), value);
        }
        env
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LegacyKey {
    /// Spelling used by the original deployment.
    name: &'static str,
    section: &'static str,
    key: &'static str,
}

const LEGACY_KEYS: [LegacyKey; 10] = [
    LegacyKey { name: "STOP_LOSS_PCT", section: "thresholds", key: "stop_loss_pct" },
    LegacyKey { name: "ARMED_GAIN_PCT", section: "thresholds", key: "armed_gain_pct" },
    LegacyKey { name: "TRAIL_DROP_PCT", section: "thresholds", key: "trail_drop_pct" },
    LegacyKey { name: "Option_STOP_LOSS_PCT", section: "thresholds", key: "option_stop_loss_pct" },
    LegacyKey { name: "Option_ARMED_GAIN_PCT", section: "thresholds", key: "option_armed_gain_pct" },
    LegacyKey { name: "Option_TRAIL_DROP_PCT", section: "thresholds", key: "option_trail_drop_pct" },
    LegacyKey { name: "ALPACA_API_KEY", section: "alpaca", key: "key_id" },
    LegacyKey { name: "ALPACA_API_SECRET", section: "alpaca", key: "secret_key" },
    LegacyKey { name: "APCA_API_BASE_URL", section: "alpaca", key: "base_url" },
    LegacyKey { name: "GOOGLE_CREDS_JSON", section: "sheet", key: "credentials_json" },
];

/// Maps a legacy variable name, matched case-insensitively, to its config key.
fn legacy_key(name: &str) -> Option<LegacyKey> {
    LEGACY_KEYS
        .iter()
        .find(|k| k.name.eq_ignore_ascii_case(name))
        .copied()
}

/// Reads a whole non-negative number, falling back to `default` with a warning.
fn lenient_int<T>(name: &str, raw: Option<&RawNumber>, default: T) -> T
where
    T: TryFrom<u64> + Copy + std::fmt::Display,
{
    let Some(raw) = raw else {
        return default;
    };
    let parsed = match raw {
        RawNumber::Number(v) if v.is_finite() && *v >= 0.0 && v.fract() == 0.0 && *v <= u64::MAX as f64 => {
            Some(*v as u64)
        }
        RawNumber::Text(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    parsed
        .and_then(|v| T::try_from(v).ok())
        .unwrap_or_else(|| {
            tracing::warn!(key = name, raw = ?raw, fallback = %default, "Invalid numeric setting, falling back to default");
            default
        })
}

fn resolve_thresholds(raw: &RawThresholds) -> ThresholdConfig {
    let defaults = ThresholdSet::equity_defaults();
    let equity = ThresholdSet {
        stop_loss_pct: lenient_decimal("STOP_LOSS_PCT", raw.stop_loss_pct.as_ref(), defaults.stop_loss_pct),
        armed_gain_pct: lenient_decimal("ARMED_GAIN_PCT", raw.armed_gain_pct.as_ref(), defaults.armed_gain_pct),
        trail_drop_pct: lenient_decimal("TRAIL_DROP_PCT", raw.trail_drop_pct.as_ref(), defaults.trail_drop_pct),
    };
    let option = ThresholdSet {
        stop_loss_pct: lenient_decimal(
            "Option_STOP_LOSS_PCT",
            raw.option_stop_loss_pct.as_ref(),
            equity.stop_loss_pct,
        ),
        armed_gain_pct: lenient_decimal(
            "Option_ARMED_GAIN_PCT",
            raw.option_armed_gain_pct.as_ref(),
            equity.armed_gain_pct,
        ),
        trail_drop_pct: lenient_decimal(
            "Option_TRAIL_DROP_PCT",
            raw.option_trail_drop_pct.as_ref(),
            equity.trail_drop_pct,
        ),
    };
    ThresholdConfig { equity, option }
}

fn lenient_decimal(name: &str, raw: Option<&RawNumber>, default: Decimal) -> Decimal {
    let Some(raw) = raw else {
        return default;
    };
    let parsed = match raw {
        RawNumber::Number(v) => Decimal::try_from(*v).ok(),
        RawNumber::Text(s) => parse_decimal(Some(s)),
        RawNumber::Other(_) => None,
    };
    parsed.unwrap_or_else(|| {
        tracing::warn!(key = name, raw = ?raw, fallback = %default, "Invalid threshold value, falling back to default");
        default
    })
}
