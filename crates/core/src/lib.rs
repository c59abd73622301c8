pub mod config;
pub mod config_loader;
pub mod error;
pub mod position;
pub mod state;
pub mod traits;

pub use config::{
    AlpacaConfig, AppConfig, MonitorConfig, SheetBackend, SheetConfig, ThresholdConfig,
    ThresholdSet,
};
pub use config_loader::{ConfigLoader, DEFAULT_CONFIG_PATH};
pub use error::{MonitorError, Result};
pub use position::{parse_decimal, AssetClass, PositionSnapshot, PricedPosition, Side};
pub use state::{ActiveRecord, ClosedTradeRecord, ReplaceOutcome, TrackedState};
pub use traits::{BrokerActions, PositionSource, StateStore};
