//! `thresholds`: show the resolved exit thresholds without touching the network.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use serde_json::{json, Value};
use trailstop_core::{AssetClass, ConfigLoader, ThresholdConfig, DEFAULT_CONFIG_PATH};
use trailstop_monitor::ThresholdResolver;

/// Arguments for the thresholds command.
#[derive(Args, Debug)]
pub struct ThresholdsArgs {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Ticker to classify.
    #[arg(long)]
    pub ticker: Option<String>,

    /// Broker asset class for the ticker (us_equity, us_option, ...).
    #[arg(long, requires = "ticker")]
    pub asset_class: Option<String>,
}

/// Prints both threshold sets and, if a ticker is given, which one applies.
pub fn run_thresholds(args: ThresholdsArgs) -> Result<()> {
    let config = ConfigLoader::load(&args.config)
        .with_context(|| format!("failed to load configuration from {}", args.config.display()))?;

    let report = thresholds_report(
        &config.thresholds,
        args.ticker.as_deref(),
        args.asset_class.as_deref(),
    );
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn thresholds_report(
    thresholds: &ThresholdConfig,
    ticker: Option<&str>,
    asset_class: Option<&str>,
) -> Value {
    let mut report = json!({
        "equity": thresholds.equity,
        "option": thresholds.option,
    });

    if let Some(ticker) = ticker {
        let resolved = ThresholdResolver::new(*thresholds)
            .resolve_for(ticker, &AssetClass::parse(asset_class));
        report["ticker"] = json!({
            "symbol": ticker,
            "kind": resolved.kind(),
            "thresholds": resolved,
        });
    }

    report
}
