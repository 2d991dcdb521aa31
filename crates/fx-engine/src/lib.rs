//! Sweep orchestration for the FX trend and alert engine.
//!
//! `FxEngine` ties the collaborators together: rate history feeds the
//! statistics, forecast and threshold stages, whose output regenerates the
//! auto alerts of each tracked pair; a second sweep evaluates every active
//! alert against the latest rate of its pair.

pub mod config;

pub use config::{EngineConfig, OPPORTUNITY_LOOKBACK_DAYS, TREND_FORECAST_DAYS};

use std::collections::BTreeSet;
use std::sync::Arc;

use alert_manager::{AlertLifecycleManager, TriggerStats};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use fx_core::{
    Alert, AlertStore, CurrencyPair, FxError, NotificationSink, RateHistoryStore, RateSample,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use trend_analysis::{
    score_opportunity, ForecastEngine, OpportunityReport, StatisticsCalculator, ThresholdDeriver,
    TrendReport, TrendReporter,
};

/// Outcome of one prediction sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictionSweepSummary {
    pub pairs_processed: usize,
    pub pairs_skipped: usize,
    /// Pairs never started because the sweep was cancelled
    pub pairs_cancelled: usize,
    pub alerts_created: usize,
}

/// Outcome of one trigger-check sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerSweepSummary {
    pub pairs_checked: usize,
    pub pairs_skipped: usize,
    pub pairs_cancelled: usize,
    pub alerts: TriggerStats,
}

enum PairOutcome<T> {
    Done(T),
    Skipped,
    Cancelled,
}

pub struct FxEngine {
    config: EngineConfig,
    history: Arc<dyn RateHistoryStore>,
    alerts: Arc<dyn AlertStore>,
    lifecycle: AlertLifecycleManager,
    forecaster: ForecastEngine,
    deriver: ThresholdDeriver,
    pair_locks: DashMap<CurrencyPair, Arc<Mutex<()>>>,
}

impl FxEngine {
    pub fn new(
        config: EngineConfig,
        history: Arc<dyn RateHistoryStore>,
        alerts: Arc<dyn AlertStore>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        let lifecycle = AlertLifecycleManager::new(Arc::clone(&alerts), notifier, config.policy);
        let deriver = ThresholdDeriver::new(config.thresholds);

        Self {
            config,
            history,
            alerts,
            lifecycle,
            forecaster: ForecastEngine::default(),
            deriver,
            pair_locks: DashMap::new(),
        }
    }

    /// Replace the forecasting models (default: linear baseline blended with AR(1)).
    pub fn with_forecaster(mut self, forecaster: ForecastEngine) -> Self {
        self.forecaster = forecaster;
        self
    }

    fn pair_lock(&self, pair: &CurrencyPair) -> Arc<Mutex<()>> {
        Arc::clone(&self.pair_locks.entry(pair.clone()).or_default())
    }

    fn concurrency(&self) -> usize {
        self.config.max_concurrent_pairs.max(1)
    }

    /// Derive thresholds for every tracked pair and regenerate its auto alerts.
    ///
    /// Pairs without history or whose fetch fails are skipped. Once `cancel`
    /// fires, in-flight pairs finish and no further pair starts.
    pub async fn run_prediction_sweep(&self, cancel: &CancellationToken) -> PredictionSweepSummary {
        let started = std::time::Instant::now();

        let outcomes: Vec<PairOutcome<usize>> = stream::iter(self.config.tracked_pairs.iter())
            .map(|pair| async move {
                if cancel.is_cancelled() {
                    return PairOutcome::Cancelled;
                }
                match self.predict_pair(pair).await {
                    Ok(created) => PairOutcome::Done(created),
                    Err(e) if e.is_not_found() => {
                        tracing::warn!("No rate history for {}, skipping", pair);
                        PairOutcome::Skipped
                    }
                    Err(e) => {
                        tracing::warn!("Prediction for {} failed, skipping: {}", pair, e);
                        PairOutcome::Skipped
                    }
                }
            })
            .buffer_unordered(self.concurrency())
            .collect()
            .await;

        let mut summary = PredictionSweepSummary::default();
        for outcome in outcomes {
            match outcome {
                PairOutcome::Done(created) => {
                    summary.pairs_processed += 1;
                    summary.alerts_created += created;
                }
                PairOutcome::Skipped => summary.pairs_skipped += 1,
                PairOutcome::Cancelled => summary.pairs_cancelled += 1,
            }
        }

        tracing::info!(
            "Prediction sweep done in {:.1}s: {} processed, {} skipped, {} cancelled, {} alerts created",
            started.elapsed().as_secs_f64(),
            summary.pairs_processed,
            summary.pairs_skipped,
            summary.pairs_cancelled,
            summary.alerts_created
        );
        summary
    }

    async fn predict_pair(&self, pair: &CurrencyPair) -> Result<usize, FxError> {
        let lock = self.pair_lock(pair);
        let _guard = lock.lock().await;

        let history = self
            .history
            .fetch_history(pair, self.config.window_days)
            .await?;
        let current = latest_rate(pair, &history)?;

        let stats = StatisticsCalculator::calculate(&history)?;
        let forecast = self.forecaster.forecast(&history, self.config.horizon_days);
        let thresholds = self.deriver.derive(&stats, &forecast, current);

        tracing::debug!(
            "{}: mean={:.6} std={:.6} trend={:.4}%/day, {} forecast points",
            pair,
            stats.mean,
            stats.std_dev,
            stats.trend,
            forecast.len()
        );

        let ids = self
            .lifecycle
            .regenerate_auto_alerts(pair, current, &thresholds)
            .await?;
        Ok(ids.len())
    }

    /// Evaluate every active alert against the latest rate of its pair.
    pub async fn run_trigger_check_sweep(&self, cancel: &CancellationToken) -> TriggerSweepSummary {
        self.run_trigger_check_sweep_at(cancel, Utc::now()).await
    }

    /// [`run_trigger_check_sweep`](Self::run_trigger_check_sweep) with an explicit clock.
    pub async fn run_trigger_check_sweep_at(
        &self,
        cancel: &CancellationToken,
        now: DateTime<Utc>,
    ) -> TriggerSweepSummary {
        let mut summary = TriggerSweepSummary::default();

        let active = match self.alerts.list_active_alerts().await {
            Ok(alerts) => alerts,
            Err(e) => {
                tracing::error!("Failed to list active alerts: {}", e);
                return summary;
            }
        };

        // Only the pair set comes from this listing; alerts are re-read under the pair lock
        let pairs: BTreeSet<CurrencyPair> = active.into_iter().map(|alert| alert.pair).collect();

        let outcomes: Vec<PairOutcome<TriggerStats>> = stream::iter(pairs.iter())
            .map(|pair| async move {
                if cancel.is_cancelled() {
                    return PairOutcome::Cancelled;
                }
                match self.check_pair(pair, now).await {
                    Ok(stats) => PairOutcome::Done(stats),
                    Err(e) => {
                        tracing::warn!("Skipping alert check for {}: {}", pair, e);
                        PairOutcome::Skipped
                    }
                }
            })
            .buffer_unordered(self.concurrency())
            .collect()
            .await;

        for outcome in outcomes {
            match outcome {
                PairOutcome::Done(stats) => {
                    summary.pairs_checked += 1;
                    summary.alerts += stats;
                }
                PairOutcome::Skipped => summary.pairs_skipped += 1,
                PairOutcome::Cancelled => summary.pairs_cancelled += 1,
            }
        }

        tracing::info!(
            "Alert check done: {} alerts over {} pairs, {} notified, {} reset, {} failures",
            summary.alerts.checked,
            summary.pairs_checked,
            summary.alerts.notified,
            summary.alerts.reset,
            summary.alerts.failures
        );
        summary
    }

    async fn check_pair(&self, pair: &CurrencyPair, now: DateTime<Utc>) -> Result<TriggerStats, FxError> {
        let lock = self.pair_lock(pair);
        let _guard = lock.lock().await;

        let latest = self
            .history
            .fetch_latest(pair)
            .await?
            .ok_or_else(|| FxError::NotFound(format!("no current rate for {}", pair)))?;

        let alerts: Vec<Alert> = self
            .alerts
            .list_active_alerts()
            .await?
            .into_iter()
            .filter(|alert| alert.pair == *pair)
            .collect();

        Ok(self.lifecycle.check_alerts(&alerts, latest.rate, now).await)
    }

    /// Trend summary for `pair` over the last `days` days.
    pub async fn get_trend(&self, pair: &CurrencyPair, days: i64) -> Result<TrendReport, FxError> {
        let history = self.history.fetch_history(pair, days).await?;
        let current = latest_rate(pair, &history)?;

        let stats = StatisticsCalculator::calculate(&history)?;
        let forecast = self.forecaster.forecast(&history, TREND_FORECAST_DAYS);

        Ok(TrendReporter::build(pair, &stats, &forecast, current, history.len()))
    }

    /// Score every tracked pair and bucket it by its best action.
    pub async fn get_opportunities(&self) -> OpportunityReport {
        let lookback = self.config.opportunity_lookback_days;

        let reports: Vec<Option<TrendReport>> = stream::iter(self.config.tracked_pairs.iter())
            .map(|pair| async move {
                match self.get_trend(pair, lookback).await {
                    Ok(report) => Some(report),
                    Err(e) => {
                        tracing::debug!("Skipping {} in opportunity scan: {}", pair, e);
                        None
                    }
                }
            })
            .buffer_unordered(self.concurrency())
            .collect()
            .await;

        let mut out = OpportunityReport::default();
        for report in reports.into_iter().flatten() {
            out.push(score_opportunity(&report));
        }
        out.sort();
        out
    }
}

fn latest_rate(pair: &CurrencyPair, history: &[RateSample]) -> Result<f64, FxError> {
    history
        .iter()
        .max_by_key(|s| s.timestamp)
        .map(|s| s.rate)
        .ok_or_else(|| FxError::NotFound(format!("no rate history for {}", pair)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alert_manager::FxDb;
    use async_trait::async_trait;
    use chrono::Duration;
    use fx_core::{AlertDirection, NewAlert, NotificationEvent};

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<NotificationEvent>>,
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        async fn notify(&self, event: &NotificationEvent) -> bool {
            self.events.lock().await.push(event.clone());
            true
        }
    }

    /// Fails every history read for one pair.
    struct FlakyHistory {
        inner: FxDb,
        broken: CurrencyPair,
    }

    #[async_trait]
    impl RateHistoryStore for FlakyHistory {
        async fn fetch_history(&self, pair: &CurrencyPair, days: i64) -> Result<Vec<RateSample>, FxError> {
            if *pair == self.broken {
                return Err(FxError::RateFetch("provider timeout".to_string()));
            }
            self.inner.fetch_history(pair, days).await
        }

        async fn fetch_latest(&self, pair: &CurrencyPair) -> Result<Option<RateSample>, FxError> {
            if *pair == self.broken {
                return Err(FxError::RateFetch("provider timeout".to_string()));
            }
            self.inner.fetch_latest(pair).await
        }
    }

    /// Cancels the sweep as soon as the first history read starts.
    struct CancellingHistory {
        inner: FxDb,
        token: CancellationToken,
    }

    #[async_trait]
    impl RateHistoryStore for CancellingHistory {
        async fn fetch_history(&self, pair: &CurrencyPair, days: i64) -> Result<Vec<RateSample>, FxError> {
            self.token.cancel();
            self.inner.fetch_history(pair, days).await
        }

        async fn fetch_latest(&self, pair: &CurrencyPair) -> Result<Option<RateSample>, FxError> {
            self.inner.fetch_latest(pair).await
        }
    }

    /// Deletes one alert when the latest rate is read, standing in for a
    /// regeneration that lands between the sweep's listing and the pair check.
    struct DeletingHistory {
        inner: FxDb,
        doomed: i64,
    }

    #[async_trait]
    impl RateHistoryStore for DeletingHistory {
        async fn fetch_history(&self, pair: &CurrencyPair, days: i64) -> Result<Vec<RateSample>, FxError> {
            self.inner.fetch_history(pair, days).await
        }

        async fn fetch_latest(&self, pair: &CurrencyPair) -> Result<Option<RateSample>, FxError> {
            self.inner.delete_alert(self.doomed).await?;
            self.inner.fetch_latest(pair).await
        }
    }

    fn usd() -> CurrencyPair {
        CurrencyPair::new("NGN", "USD")
    }

    fn gbp() -> CurrencyPair {
        CurrencyPair::new("NGN", "GBP")
    }

    fn eur() -> CurrencyPair {
        CurrencyPair::new("NGN", "EUR")
    }

    /// Eleven daily samples rising from `start` to `start + 10`, ending now.
    async fn seed_rising(db: &FxDb, pair: &CurrencyPair, start: f64) {
        let now = Utc::now();
        for i in 0..=10 {
            let sample = RateSample::new(now - Duration::days(10 - i), start + i as f64).with_source("test");
            db.record_rate(pair, &sample).await.unwrap();
        }
    }

    async fn setup(config: EngineConfig) -> (FxDb, Arc<RecordingSink>, FxEngine) {
        let db = FxDb::new("sqlite::memory:").await.unwrap();
        let sink = Arc::new(RecordingSink::default());
        let engine = FxEngine::new(config, Arc::new(db.clone()), Arc::new(db.clone()), sink.clone());
        (db, sink, engine)
    }

    #[tokio::test]
    async fn test_prediction_sweep_is_idempotent() {
        let (db, _sink, engine) = setup(EngineConfig::default()).await;
        seed_rising(&db, &usd(), 100.0).await;
        let token = CancellationToken::new();

        let first = engine.run_prediction_sweep(&token).await;
        assert_eq!(first.pairs_processed, 1);
        assert_eq!(first.pairs_skipped, 2);
        assert!(first.alerts_created >= 1);

        engine.run_prediction_sweep(&token).await;

        let auto = db.list_auto_alerts(&usd()).await.unwrap();
        assert!(!auto.is_empty() && auto.len() <= 2);
        assert!(auto.iter().filter(|a| a.direction == AlertDirection::Below).count() <= 1);
        assert!(auto.iter().filter(|a| a.direction == AlertDirection::Above).count() <= 1);

        let buy = auto.iter().find(|a| a.direction == AlertDirection::Below).unwrap();
        assert!(buy.threshold < 100.0);
    }

    #[tokio::test]
    async fn test_prediction_sweep_leaves_manual_alerts() {
        let (db, _sink, engine) = setup(EngineConfig::default()).await;
        seed_rising(&db, &usd(), 100.0).await;
        let manual_id = db
            .create_alert(&NewAlert::manual(1, usd(), 120.0, AlertDirection::Above))
            .await
            .unwrap();

        engine.run_prediction_sweep(&CancellationToken::new()).await;
        assert!(db.get_alert(manual_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_failing_pair_does_not_stop_sweep() {
        let db = FxDb::new("sqlite::memory:").await.unwrap();
        seed_rising(&db, &usd(), 100.0).await;
        seed_rising(&db, &gbp(), 200.0).await;

        let history = Arc::new(FlakyHistory {
            inner: db.clone(),
            broken: gbp(),
        });
        let config = EngineConfig {
            tracked_pairs: vec![gbp(), usd()],
            ..Default::default()
        };
        let engine = FxEngine::new(config, history, Arc::new(db.clone()), Arc::new(RecordingSink::default()));

        let summary = engine.run_prediction_sweep(&CancellationToken::new()).await;
        assert_eq!(summary.pairs_processed, 1);
        assert_eq!(summary.pairs_skipped, 1);
        assert!(!db.list_auto_alerts(&usd()).await.unwrap().is_empty());
        assert!(db.list_auto_alerts(&gbp()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_sweep_starts_no_pairs() {
        let (db, _sink, engine) = setup(EngineConfig::default()).await;
        seed_rising(&db, &usd(), 100.0).await;

        let token = CancellationToken::new();
        token.cancel();
        let summary = engine.run_prediction_sweep(&token).await;

        assert_eq!(summary.pairs_cancelled, 3);
        assert_eq!(summary.pairs_processed, 0);
        assert!(db.list_auto_alerts(&usd()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_finishes_current_pair_only() {
        let db = FxDb::new("sqlite::memory:").await.unwrap();
        for pair in [usd(), gbp(), eur()] {
            seed_rising(&db, &pair, 100.0).await;
        }

        let token = CancellationToken::new();
        let history = Arc::new(CancellingHistory {
            inner: db.clone(),
            token: token.clone(),
        });
        let config = EngineConfig {
            tracked_pairs: vec![usd(), gbp(), eur()],
            max_concurrent_pairs: 1,
            ..Default::default()
        };
        let engine = FxEngine::new(config, history, Arc::new(db.clone()), Arc::new(RecordingSink::default()));

        let summary = engine.run_prediction_sweep(&token).await;
        assert_eq!(summary.pairs_processed, 1);
        assert_eq!(summary.pairs_cancelled, 2);
        assert!(!db.list_auto_alerts(&usd()).await.unwrap().is_empty());
        assert!(db.list_auto_alerts(&eur()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_trigger_sweep_fires_and_deactivates_auto_alert() {
        let (db, sink, engine) = setup(EngineConfig::default()).await;
        seed_rising(&db, &usd(), 100.0).await;
        let token = CancellationToken::new();
        engine.run_prediction_sweep(&token).await;

        // Rate collapses below the buy threshold
        let now = Utc::now();
        db.record_rate(&usd(), &RateSample::new(now + Duration::minutes(1), 50.0))
            .await
            .unwrap();

        let summary = engine
            .run_trigger_check_sweep_at(&token, now + Duration::minutes(2))
            .await;
        assert_eq!(summary.pairs_checked, 1);
        assert_eq!(summary.alerts.notified, 1);
        assert_eq!(summary.alerts.deactivated, 1);

        let events = sink.events.lock().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].direction, AlertDirection::Below);
        assert_eq!(events[0].current_rate, 50.0);

        let auto = db.list_auto_alerts(&usd()).await.unwrap();
        let buy = auto.iter().find(|a| a.direction == AlertDirection::Below).unwrap();
        assert!(!buy.is_active);
        assert!(buy.is_triggered);
    }

    #[tokio::test]
    async fn test_trigger_sweep_skips_pair_without_rate() {
        let (db, sink, engine) = setup(EngineConfig::default()).await;
        seed_rising(&db, &usd(), 100.0).await;
        db.create_alert(&NewAlert::manual(1, usd(), 105.0, AlertDirection::Above))
            .await
            .unwrap();
        db.create_alert(&NewAlert::manual(1, gbp(), 1.0, AlertDirection::Above))
            .await
            .unwrap();

        let summary = engine.run_trigger_check_sweep(&CancellationToken::new()).await;
        assert_eq!(summary.pairs_checked, 1);
        assert_eq!(summary.pairs_skipped, 1);
        assert_eq!(summary.alerts.notified, 1);
        assert_eq!(sink.events.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_trigger_sweep_ignores_alerts_removed_after_listing() {
        let db = FxDb::new("sqlite::memory:").await.unwrap();
        seed_rising(&db, &usd(), 100.0).await;
        let doomed = db
            .create_alert(&NewAlert::auto(usd(), 105.0, AlertDirection::Above))
            .await
            .unwrap();
        db.create_alert(&NewAlert::manual(1, usd(), 106.0, AlertDirection::Above))
            .await
            .unwrap();

        let sink = Arc::new(RecordingSink::default());
        let history = Arc::new(DeletingHistory {
            inner: db.clone(),
            doomed,
        });
        let engine = FxEngine::new(EngineConfig::default(), history, Arc::new(db.clone()), sink.clone());

        let summary = engine.run_trigger_check_sweep(&CancellationToken::new()).await;
        assert_eq!(summary.alerts.checked, 1);
        assert_eq!(summary.alerts.notified, 1);
        assert_eq!(summary.alerts.failures, 0);

        let events = sink.events.lock().await;
        assert_eq!(events.len(), 1);
        assert_ne!(events[0].alert_id, doomed);
    }

    #[tokio::test]
    async fn test_baseline_only_forecaster_extends_the_line() {
        let (db, _sink, engine) = setup(EngineConfig::default()).await;
        let engine = engine.with_forecaster(ForecastEngine::new());
        seed_rising(&db, &usd(), 100.0).await;

        let report = engine.get_trend(&usd(), 30).await.unwrap();
        assert!((report.prediction(7).unwrap() - 117.0).abs() < 1e-6);
        assert!((report.prediction(30).unwrap() - 140.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_get_trend_report() {
        let (db, _sink, engine) = setup(EngineConfig::default()).await;
        seed_rising(&db, &usd(), 100.0).await;

        let report = engine.get_trend(&usd(), 30).await.unwrap();
        assert_eq!(report.current_rate, 110.0);
        assert_eq!(report.data_points, 11);
        assert_eq!(report.trend_direction, trend_analysis::TrendDirection::Rising);
        assert_eq!(report.predictions.len(), 3);
    }

    #[tokio::test]
    async fn test_get_trend_without_data_is_not_found() {
        let (_db, _sink, engine) = setup(EngineConfig::default()).await;
        let err = engine.get_trend(&eur(), 30).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_get_trend_with_absurd_lookback_is_an_error() {
        let (db, _sink, engine) = setup(EngineConfig::default()).await;
        seed_rising(&db, &usd(), 100.0).await;

        let err = engine.get_trend(&usd(), 100_000_000).await.unwrap_err();
        assert!(matches!(err, FxError::InvalidData(_)));
    }

    #[tokio::test]
    async fn test_opportunities_skip_pairs_without_data() {
        let (db, _sink, engine) = setup(EngineConfig::default()).await;
        seed_rising(&db, &usd(), 100.0).await;

        let report = engine.get_opportunities().await;
        assert_eq!(report.len(), 1);
        let all: Vec<_> = report.buy.iter().chain(&report.sell).chain(&report.hold).collect();
        assert_eq!(all[0].pair, usd());
        assert!((0.0..=1.0).contains(&all[0].confidence));
    }
}
