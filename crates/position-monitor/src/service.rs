//! Cycle driver and supervised service loop.

use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};
use trailstop_core::{
    BrokerActions, ClosedTradeRecord, MonitorConfig, MonitorError, PositionSnapshot,
    PositionSource, Result, StateStore, ThresholdConfig,
};

use crate::decision::DecisionEngine;
use crate::monitor::ActiveSet;
use crate::thresholds::ThresholdResolver;
use crate::types::{CloseReason, CycleReport, Decision, ResolvedThresholds, TickerOutcome};

/// Runs the exit rules over every open position, one bounded cycle at a time.
pub struct Monitor<S, B, T> {
    source: S,
    broker: B,
    store: T,
    resolver: ThresholdResolver,
    engine: DecisionEngine,
    config: MonitorConfig,
}

impl<S, B, T> Monitor<S, B, T>
where
    S: PositionSource,
    B: BrokerActions,
    T: StateStore,
{
    pub fn new(
        source: S,
        broker: B,
        store: T,
        thresholds: ThresholdConfig,
        config: MonitorConfig,
    ) -> Self {
        Self {
            source,
            broker,
            store,
            resolver: ThresholdResolver::new(thresholds),
            engine: DecisionEngine::new(),
            config,
        }
    }

    #[must_use]
    pub const fn resolver(&self) -> &ThresholdResolver {
        &self.resolver
    }

    #[must_use]
    pub const fn source(&self) -> &S {
        &self.source
    }

    #[must_use]
    pub const fn store(&self) -> &T {
        &self.store
    }

    #[must_use]
    pub const fn broker(&self) -> &B {
        &self.broker
    }

    /// Runs one full pass over all open positions.
    ///
    /// # Errors
    ///
    /// Fails with `Transport` or `Timeout` if preparing or loading state,
    /// listing positions, or writing the active region fails. Per-ticker
    /// problems are recorded in the report instead.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let started_at = Utc::now();

        self.bounded("prepare", self.store.prepare()).await?;
        let persisted = self.bounded("load_all", self.store.load_all()).await?;
        let positions = self
            .bounded("list_open_positions", self.source.list_open_positions())
            .await?;

        let mut report = CycleReport::new(started_at);
        let mut active = ActiveSet::new(&persisted);

        for snapshot in &positions {
            let ticker = snapshot.ticker();
            if !active.claim(ticker) {
                continue;
            }
            let outcome = self.process(snapshot, &mut active).await;
            report.record(ticker, outcome);
        }

        let rows = active.into_rows();
        let replaced = self
            .bounded("replace_active", self.store.replace_active(&rows))
            .await?;
        report.written = replaced.written;
        report.dropped = replaced.dropped;

        info!(
            positions = positions.len(),
            kept = report.kept(),
            closed = report.closed(),
            skipped = report.skipped(),
            failed = report.failed(),
            written = report.written,
            dropped = report.dropped.len(),
            "Cycle complete"
        );
        Ok(report)
    }

    async fn process(&self, snapshot: &PositionSnapshot, active: &mut ActiveSet<'_>) -> TickerOutcome {
        let ticker = snapshot.ticker();
        let thresholds = self.resolver.resolve(snapshot);
        let prior = active.prior_state(ticker);

        match self
            .engine
            .decide(snapshot, &thresholds, prior.as_ref(), Utc::now())
        {
            Decision::Keep(record) => {
                let outcome = TickerOutcome::Kept {
                    percent_gain: record.percent_gain.unwrap_or_default(),
                    watermark: record.all_time_high_pct.unwrap_or_default(),
                    armed: record.armed,
                };
                tracing::debug!(ticker, ?outcome, kind = thresholds.kind(), "Keeping position");
                active.keep(record);
                outcome
            }
            Decision::Skip { reason } => {
                let err = MonitorError::data_quality(ticker, reason.as_str());
                warn!(ticker, error = %err, "Skipping position this cycle");
                active.carry_forward(ticker);
                TickerOutcome::Skipped { reason }
            }
            Decision::Close {
                realized_pct,
                armed_at_close,
                reason,
            } => {
                self.close(ticker, &thresholds, realized_pct, armed_at_close, reason, active)
                    .await
            }
        }
    }

    async fn close(
        &self,
        ticker: &str,
        thresholds: &ResolvedThresholds,
        realized_pct: rust_decimal::Decimal,
        armed_at_close: bool,
        reason: CloseReason,
        active: &mut ActiveSet<'_>,
    ) -> TickerOutcome {
        if let Err(err) = self
            .bounded("close_position", self.broker.close_position(ticker))
            .await
        {
            let err = match err {
                action @ MonitorError::Action { .. } => action,
                other => MonitorError::action(ticker, other.to_string()),
            };
            error!(ticker, error = %err, %reason, "Close failed, keeping previous state for next cycle");
            active.carry_forward(ticker);
            return TickerOutcome::CloseFailed {
                error: err.to_string(),
            };
        }

        info!(
            ticker,
            kind = thresholds.kind(),
            pct = %realized_pct.round_dp(2),
            %reason,
            armed = armed_at_close,
            stop_loss = %thresholds.stop_loss_pct,
            armed_gain = %thresholds.armed_gain_pct,
            trail_drop = %thresholds.trail_drop_pct,
            "SOLD"
        );

        let record = ClosedTradeRecord {
            ticker: ticker.to_string(),
            realized_pct,
            armed_at_close,
            closed_at: Utc::now(),
        };
        let recorded = match self
            .bounded("append_closed", self.store.append_closed(&record))
            .await
        {
            Ok(()) => true,
            Err(err) => {
                error!(ticker, error = %err, "Position closed but the closed trade was not recorded");
                false
            }
        };

        TickerOutcome::Closed {
            realized_pct,
            reason,
            recorded,
        }
    }

    /// Bounds a collaborator call by the per-call deadline.
    async fn bounded<F, R>(&self, operation: &str, call: F) -> Result<R>
    where
        F: Future<Output = Result<R>>,
    {
        let secs = self.config.call_timeout_secs;
        tokio::time::timeout(Duration::from_secs(secs), call)
            .await
            .unwrap_or_else(|_| Err(MonitorError::timeout(operation, secs)))
    }

    /// Runs cycles until Ctrl-C or `max_cycles` cycles have completed.
    ///
    /// # Errors
    ///
    /// Returns `Config` errors, which cannot be fixed by retrying. Every
    /// other failure is logged and the loop continues after the interval.
    pub async fn run(&self, max_cycles: Option<u64>) -> Result<()> {
        self.run_until(max_cycles, shutdown_signal()).await
    }

    /// Like [`run`](Self::run), stopping when `shutdown` completes.
    ///
    /// A cycle that is already running finishes before the loop exits.
    ///
    /// # Errors
    ///
    /// Returns `Config` errors.
    pub async fn run_until<F>(&self, max_cycles: Option<u64>, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        info!(
            interval_secs = self.config.interval_secs,
            cycle_timeout_secs = self.config.cycle_timeout_secs,
            call_timeout_secs = self.config.call_timeout_secs,
            dry_run = self.config.dry_run,
            max_cycles = ?max_cycles,
            "Position monitor started"
        );

        let mut interval = tokio::time::interval(Duration::from_secs(self.config.interval_secs.max(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        let cycle_timeout = Duration::from_secs(self.config.cycle_timeout_secs);
        let mut completed: u64 = 0;

        loop {
            tokio::select! {
                biased;
                () = &mut shutdown => {
                    info!(completed, "Shutdown requested, stopping monitor");
                    break;
                }
                _ = interval.tick() => {}
            }

            completed += 1;
            match tokio::time::timeout(cycle_timeout, self.run_cycle()).await {
                Ok(Ok(_)) => {}
                Ok(Err(MonitorError::Config(msg))) => {
                    error!(error = %msg, "Configuration error, stopping monitor");
                    return Err(MonitorError::Config(msg));
                }
                Ok(Err(err)) if err.is_cycle_fatal() => {
                    warn!(cycle = completed, error = %err, "Cycle abandoned, retrying after interval");
                }
                Ok(Err(err)) => {
                    error!(cycle = completed, error = %err, "Cycle failed");
                }
                Err(_) => {
                    warn!(
                        cycle = completed,
                        timeout_secs = self.config.cycle_timeout_secs,
                        "Cycle timed out, retrying after interval"
                    );
                }
            }

            if max_cycles.is_some_and(|max| completed >= max) {
                info!(completed, "Cycle limit reached, stopping monitor");
                break;
            }
            // The idle interval counts from the end of the cycle.
            interval.reset();
        }

        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Cannot listen for Ctrl-C, running until the cycle limit");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use trailstop_core::{ActiveRecord, ReplaceOutcome};

    #[derive(Default)]
    struct FakeSource {
        positions: Mutex<Vec<PositionSnapshot>>,
        fail: bool,
        hang: bool,
    }

    #[async_trait]
    impl PositionSource for FakeSource {
        async fn list_open_positions(&self) -> Result<Vec<PositionSnapshot>> {
            if self.hang {
                std::future::pending::<()>().await;
            }
            if self.fail {
                return Err(MonitorError::transport("list_open_positions", "connection refused"));
            }
            Ok(self.positions.lock().clone())
        }
    }

    #[derive(Default)]
    struct FakeBroker {
        closed: Mutex<Vec<String>>,
        hang: AtomicBool,
    }

    #[async_trait]
    impl BrokerActions for FakeBroker {
        async fn close_position(&self, ticker: &str) -> Result<()> {
            if self.hang.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            self.closed.lock().push(ticker.to_string());
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeStore {
        active: Mutex<HashMap<String, ActiveRecord>>,
        closed: Mutex<Vec<ClosedTradeRecord>>,
        replaces: AtomicUsize,
        config_error: bool,
    }

    #[async_trait]
    impl StateStore for FakeStore {
        async fn prepare(&self) -> Result<()> {
            if self.config_error {
                return Err(MonitorError::Config("bad credentials".to_string()));
            }
            Ok(())
        }

        async fn load_all(&self) -> Result<HashMap<String, ActiveRecord>> {
            Ok(self.active.lock().clone())
        }

        async fn replace_active(&self, records: &[ActiveRecord]) -> Result<ReplaceOutcome> {
            self.replaces.fetch_add(1, Ordering::SeqCst);
            *self.active.lock() = records.iter().map(|r| (r.ticker.clone(), r.clone())).collect();
            Ok(ReplaceOutcome {
                written: records.len(),
                dropped: Vec::new(),
            })
        }

        async fn append_closed(&self, record: &ClosedTradeRecord) -> Result<()> {
            self.closed.lock().push(record.clone());
            Ok(())
        }
    }

    fn position(ticker: &str, cost: &str, current: &str) -> PositionSnapshot {
        PositionSnapshot::from_fields(ticker, Some("long"), Some("1"), Some(cost), Some(current), Some("us_equity"))
    }

    fn config() -> MonitorConfig {
        MonitorConfig {
            interval_secs: 1,
            cycle_timeout_secs: 5,
            call_timeout_secs: 1,
            dry_run: false,
        }
    }

    fn monitor(source: FakeSource, store: FakeStore) -> Monitor<FakeSource, FakeBroker, FakeStore> {
        Monitor::new(source, FakeBroker::default(), store, ThresholdConfig::default(), config())
    }

    #[tokio::test]
    async fn cycle_keeps_closes_and_records() {
        let source = FakeSource::default();
        *source.positions.lock() = vec![position("AAPL", "100", "102"), position("TSLA", "100", "96")];
        let monitor = monitor(source, FakeStore::default());

        let report = monitor.run_cycle().await.unwrap();

        assert_eq!(report.kept(), 1);
        assert_eq!(report.closed(), 1);
        assert_eq!(*monitor.broker().closed.lock(), vec!["TSLA".to_string()]);
        assert!(monitor.store().active.lock().contains_key("AAPL"));
        assert!(!monitor.store().active.lock().contains_key("TSLA"));
        assert_eq!(monitor.store().closed.lock()[0].ticker, "TSLA");
    }

    #[tokio::test]
    async fn transport_failure_abandons_cycle_without_writing() {
        let source = FakeSource {
            fail: true,
            ..FakeSource::default()
        };
        let monitor = monitor(source, FakeStore::default());

        let err = monitor.run_cycle().await.unwrap_err();

        assert!(err.is_cycle_fatal());
        assert_eq!(monitor.store().replaces.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_position_listing_times_out_without_writing() {
        let source = FakeSource {
            hang: true,
            ..FakeSource::default()
        };
        let monitor = monitor(source, FakeStore::default());

        let err = monitor.run_cycle().await.unwrap_err();

        assert!(matches!(
            err,
            MonitorError::Timeout { ref operation, secs: 1 } if operation == "list_open_positions"
        ));
        assert!(err.is_cycle_fatal());
        assert_eq!(monitor.store().replaces.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_close_fails_and_carries_the_previous_row() {
        let source = FakeSource::default();
        *source.positions.lock() = vec![position("AAPL", "100", "108")];
        let monitor = monitor(source, FakeStore::default());
        monitor.run_cycle().await.unwrap();
        let before = monitor.store().active.lock().get("AAPL").cloned().unwrap();

        monitor.broker().hang.store(true, Ordering::SeqCst);
        *monitor.source().positions.lock() = vec![position("AAPL", "100", "104")];
        let report = monitor.run_cycle().await.unwrap();

        match report.outcome("AAPL") {
            Some(TickerOutcome::CloseFailed { error }) => assert!(error.contains("timed out"), "{error}"),
            other => panic!("expected CloseFailed, got {other:?}"),
        }
        assert_eq!(monitor.store().active.lock().get("AAPL"), Some(&before));
        assert!(monitor.store().closed.lock().is_empty());
        assert!(monitor.broker().closed.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn loop_stops_after_cycle_limit() {
        let source = FakeSource::default();
        *source.positions.lock() = vec![position("AAPL", "100", "101")];
        let monitor = monitor(source, FakeStore::default());

        monitor
            .run_until(Some(3), std::future::pending::<()>())
            .await
            .unwrap();

        assert_eq!(monitor.store().replaces.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn loop_survives_transport_failures() {
        let source = FakeSource {
            fail: true,
            ..FakeSource::default()
        };
        let monitor = monitor(source, FakeStore::default());

        assert!(monitor.run_until(Some(2), std::future::pending::<()>()).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn config_errors_stop_the_loop() {
        let store = FakeStore {
            config_error: true,
            ..FakeStore::default()
        };
        let monitor = monitor(FakeSource::default(), store);

        let err = monitor.run_until(None, std::future::pending::<()>()).await.unwrap_err();
        assert!(matches!(err, MonitorError::Config(_)));
    }

    #[tokio::test]
    async fn shutdown_before_first_tick_runs_nothing() {
        let monitor = monitor(FakeSource::default(), FakeStore::default());
        monitor.run_until(None, async {}).await.unwrap();
        assert_eq!(monitor.store().replaces.load(Ordering::SeqCst), 0);
    }
}
