//! CLI commands for the trailing-stop monitor.

pub mod monitor;
pub mod thresholds;

pub use monitor::{run_monitor, run_once, MonitorArgs};
pub use thresholds::{run_thresholds, ThresholdsArgs};
