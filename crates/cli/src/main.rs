use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{MonitorArgs, ThresholdsArgs};

#[derive(Parser)]
#[command(name = "trailstop")]
#[command(about = "Trailing-stop / stop-loss monitor for Alpaca positions", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Monitor positions on a fixed interval until Ctrl-C
    Run {
        #[command(flatten)]
        monitor: MonitorArgs,
        /// Stop after this many cycles
        #[arg(long)]
        max_cycles: Option<u64>,
        /// Optional log file path (logs to file instead of stderr)
        #[arg(long)]
        log_file: Option<PathBuf>,
    },
    /// Run a single cycle and print its report as JSON
    Once {
        #[command(flatten)]
        monitor: MonitorArgs,
    },
    /// Show resolved thresholds, optionally classifying one ticker
    Thresholds(ThresholdsArgs),
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Run {
            log_file: Some(path),
            ..
        } => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(env_filter())
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
        _ => {
            // Logs go to stderr so `once` can print JSON on stdout.
            tracing_subscriber::fmt()
                .with_env_filter(env_filter())
                .with_writer(std::io::stderr)
                .init();
        }
    }

    match cli.command {
        Commands::Run {
            monitor,
            max_cycles,
            log_file: _,
        } => {
            commands::run_monitor(monitor, max_cycles).await?;
        }
        Commands::Once { monitor } => {
            commands::run_once(monitor).await?;
        }
        Commands::Thresholds(args) => {
            commands::run_thresholds(args)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_accepts_all_flags() {
        let cli = Cli::try_parse_from([
            "trailstop",
            "run",
            "--config",
            "custom.toml",
            "--dry-run",
            "--max-cycles",
            "3",
            "--log-file",
            "monitor.log",
        ])
        .unwrap();

        match cli.command {
            Commands::Run {
                monitor,
                max_cycles,
                log_file,
            } => {
                assert_eq!(monitor.config, PathBuf::from("custom.toml"));
                assert!(monitor.dry_run);
                assert_eq!(max_cycles, Some(3));
                assert_eq!(log_file, Some(PathBuf::from("monitor.log")));
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn config_path_has_a_default() {
        let cli = Cli::try_parse_from(["trailstop", "once"]).unwrap();
        match cli.command {
            Commands::Once { monitor } => {
                assert_eq!(monitor.config, PathBuf::from(trailstop_core::DEFAULT_CONFIG_PATH));
                assert!(!monitor.dry_run);
            }
            _ => panic!("expected once"),
        }
    }

    #[test]
    fn asset_class_requires_a_ticker() {
        assert!(Cli::try_parse_from(["trailstop", "thresholds"]).is_ok());
        assert!(Cli::try_parse_from(["trailstop", "thresholds", "--ticker", "AAPL250117C00150000"]).is_ok());
        assert!(Cli::try_parse_from(["trailstop", "thresholds", "--asset-class", "us_option"]).is_err());
        assert!(Cli::try_parse_from(["trailstop", "bogus"]).is_err());
    }
}
