use crate::error::Result;
use crate::position::PositionSnapshot;
use crate::state::{ActiveRecord, ClosedTradeRecord, ReplaceOutcome};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Supplies the open positions at the start of each cycle.
#[async_trait]
pub trait PositionSource: Send + Sync {
    /// Fails with a transport error on connectivity or auth failure.
    async fn list_open_positions(&self) -> Result<Vec<PositionSnapshot>>;
}

/// Executes exit orders.
#[async_trait]
pub trait BrokerActions: Send + Sync {
    /// Closes the whole position for `ticker` at market.
    async fn close_position(&self, ticker: &str) -> Result<()>;
}

/// Persists tracker rows across cycles.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Ensures the backing table exists with the expected headers.
    async fn prepare(&self) -> Result<()>;

    /// Loads the active rows keyed by ticker.
    async fn load_all(&self) -> Result<HashMap<String, ActiveRecord>>;

    /// Replaces the whole active region with `records`.
    ///
    /// The region has a fixed row capacity; records beyond it are not
    /// written and are reported in [`ReplaceOutcome::dropped`].
    async fn replace_active(&self, records: &[ActiveRecord]) -> Result<ReplaceOutcome>;

    /// Appends one row to the closed-trades table.
    async fn append_closed(&self, record: &ClosedTradeRecord) -> Result<()>;
}

#[async_trait]
impl<T: PositionSource + ?Sized> PositionSource for Arc<T> {
    async fn list_open_positions(&self) -> Result<Vec<PositionSnapshot>> {
        (**self).list_open_positions().await
    }
}

#[async_trait]
impl<T: BrokerActions + ?Sized> BrokerActions for Arc<T> {
    async fn close_position(&self, ticker: &str) -> Result<()> {
        (**self).close_position(ticker).await
    }
}

#[async_trait]
impl<T: StateStore + ?Sized> StateStore for Arc<T> {
    async fn prepare(&self) -> Result<()> {
        (**self).prepare().await
    }

    async fn load_all(&self) -> Result<HashMap<String, ActiveRecord>> {
        (**self).load_all().await
    }

    async fn replace_active(&self, records: &[ActiveRecord]) -> Result<ReplaceOutcome> {
        (**self).replace_active(records).await
    }

    async fn append_closed(&self, record: &ClosedTradeRecord) -> Result<()> {
        (**self).append_closed(record).await
    }
}
