//! Paper execution shim.
//!
//! Records closes without touching the broker. Useful for watching the
//! decision engine against live positions before letting it trade.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::info;
use trailstop_core::BrokerActions;

/// A close that was simulated instead of sent.
#[derive(Debug, Clone)]
pub struct SimulatedClose {
    pub order_id: String,
    pub ticker: String,
    pub closed_at: DateTime<Utc>,
}

/// Broker that acknowledges every close and remembers it.
#[derive(Debug, Default)]
pub struct PaperBroker {
    closes: Mutex<Vec<SimulatedClose>>,
}

impl PaperBroker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Closes simulated so far, oldest first.
    #[must_use]
    pub fn closes(&self) -> Vec<SimulatedClose> {
        self.closes.lock().clone()
    }
}

#[async_trait]
impl BrokerActions for PaperBroker {
    async fn close_position(&self, ticker: &str) -> trailstop_core::Result<()> {
        let now = Utc::now();
        let close = SimulatedClose {
            order_id: format!("PAPER-{}", now.timestamp_millis()),
            ticker: ticker.to_string(),
            closed_at: now,
        };

        info!(order_id = close.order_id, ticker, "Paper close simulated");
        self.closes.lock().push(close);
        Ok(())
    }
}
