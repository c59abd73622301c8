//! Alpaca brokerage integration for the trailing-stop monitor.
//!
//! Provides the REST client, open position queries (`PositionSource`),
//! market liquidation of a position (`BrokerActions`), and a paper broker
//! for dry runs.

pub mod client;
pub mod error;
pub mod execution;
pub mod paper;
pub mod positions;
pub mod types;

pub use client::{AlpacaClient, ALPACA_LIVE_URL, ALPACA_PAPER_URL};
pub use error::{AlpacaError, Result};
pub use paper::{PaperBroker, SimulatedClose};
pub use types::{CloseOrder, RawPosition};
