//! `run` and `once`: wire the broker and worksheet into a monitor.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tracing::{info, warn};
use trailstop_alpaca::{AlpacaClient, PaperBroker};
use trailstop_core::{AppConfig, BrokerActions, ConfigLoader, SheetBackend, DEFAULT_CONFIG_PATH};
use trailstop_monitor::Monitor;
use trailstop_sheets::layout::{active_data_range, header_row, ACTIVE_HEADER};
use trailstop_sheets::{
    CsvWorksheet, GoogleSheetsWorksheet, MemoryWorksheet, SheetStateStore, Worksheet,
};

/// Arguments shared by `run` and `once`.
#[derive(Args, Debug)]
pub struct MonitorArgs {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Simulate closes and keep state in memory; the tracker is read once, never written.
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy)]
enum Action {
    Loop { max_cycles: Option<u64> },
    Once,
}

/// Runs the monitor loop until Ctrl-C or the cycle limit.
pub async fn run_monitor(args: MonitorArgs, max_cycles: Option<u64>) -> Result<()> {
    start(args, Action::Loop { max_cycles }).await
}

/// Runs a single cycle and prints its report as JSON.
pub async fn run_once(args: MonitorArgs) -> Result<()> {
    start(args, Action::Once).await
}

/// Loads and validates configuration; `--dry-run` overrides the config file.
pub fn load_config(path: &Path, dry_run: bool) -> Result<AppConfig> {
    let mut config = ConfigLoader::load(path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))?;
    config.monitor.dry_run |= dry_run;
    config.validate()?;
    Ok(config)
}

async fn start(args: MonitorArgs, action: Action) -> Result<()> {
    let config = load_config(&args.config, args.dry_run)?;
    info!(
        backend = ?config.sheet.backend,
        dry_run = config.monitor.dry_run,
        interval_secs = config.monitor.interval_secs,
        equity = ?config.thresholds.equity,
        option = ?config.thresholds.option,
        "Starting trailing-stop monitor"
    );

    let client = Arc::new(AlpacaClient::new(&config.alpaca)?);

    match config.sheet.backend {
        SheetBackend::Google => {
            let worksheet = GoogleSheetsWorksheet::new(&config.sheet)?;
            with_worksheet(&config, client, worksheet, action).await
        }
        SheetBackend::Csv => {
            let worksheet = CsvWorksheet::new(config.sheet.csv_path.clone());
            with_worksheet(&config, client, worksheet, action).await
        }
    }
}

async fn with_worksheet<W>(
    config: &AppConfig,
    client: Arc<AlpacaClient>,
    worksheet: W,
    action: Action,
) -> Result<()>
where
    W: Worksheet,
{
    if config.monitor.dry_run {
        let seeded = seed_from(&worksheet, config.sheet.capacity_rows).await?;
        warn!("Dry run: closes are simulated and the tracker is not written");
        drive(config, client, PaperBroker::new(), seeded, action).await
    } else {
        let broker = Arc::clone(&client);
        drive(config, client, broker, worksheet, action).await
    }
}

/// Copies the live active region into memory so a dry run starts from real state.
async fn seed_from<W: Worksheet>(worksheet: &W, capacity_rows: usize) -> Result<MemoryWorksheet> {
    let data = worksheet
        .read_range(&active_data_range(capacity_rows))
        .await
        .context("failed to read the tracker for a dry run")?;
    info!(rows = data.len(), "Seeded dry-run state from tracker");

    let mut rows = header_row(&ACTIVE_HEADER);
    rows.extend(data);
    Ok(MemoryWorksheet::with_rows(rows))
}

async fn drive<B, W>(
    config: &AppConfig,
    client: Arc<AlpacaClient>,
    broker: B,
    worksheet: W,
    action: Action,
) -> Result<()>
where
    B: BrokerActions,
    W: Worksheet,
{
    let store = SheetStateStore::new(worksheet, config.sheet.capacity_rows);
    let monitor = Monitor::new(
        client,
        broker,
        store,
        config.thresholds,
        config.monitor.clone(),
    );

    match action {
        Action::Loop { max_cycles } => {
            monitor.run(max_cycles).await?;
            info!("Monitor stopped");
        }
        Action::Once => {
            let report = monitor.run_cycle().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn config_file(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{body}").unwrap();
        file
    }

    const CSV_CONFIG: &str = r#"
[alpaca]
key_id = "PKTEST"
secret_key = "secret"

[sheet]
backend = "csv"
csv_path = "data/test.csv"
"#;

    #[test]
    fn dry_run_flag_overrides_config() {
        let file = config_file(CSV_CONFIG);
        let config = load_config(file.path(), true).unwrap();
        assert!(config.monitor.dry_run);
        assert_eq!(config.sheet.backend, SheetBackend::Csv);
    }

    #[test]
    fn dry_run_from_config_survives_absent_flag() {
        let file = config_file(&format!("{CSV_CONFIG}\n[monitor]\ndry_run = true\n"));
        let config = load_config(file.path(), false).unwrap();
        assert!(config.monitor.dry_run);
    }

    #[tokio::test]
    async fn dry_run_seed_keeps_header_and_rows() {
        let live = MemoryWorksheet::with_rows(vec![
            ACTIVE_HEADER.iter().map(ToString::to_string).collect(),
            vec!["AAPL".to_string(), "4.5".to_string()],
        ]);
        let seeded = seed_from(&live, 10).await.unwrap();
        let grid = seeded.snapshot();

        assert_eq!(grid.rows().len(), 2);
        assert_eq!(grid.rows()[0][0], ACTIVE_HEADER[0]);
        assert_eq!(grid.rows()[1][0], "AAPL");
    }
}
