use alert_manager::AlertPolicy;
use fx_core::CurrencyPair;
use trend_analysis::ThresholdConfig;

/// Days of history scanned when ranking opportunities
pub const OPPORTUNITY_LOOKBACK_DAYS: i64 = 30;

/// Forecast length used for trend queries so every report horizon is present
pub const TREND_FORECAST_DAYS: usize = 30;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub tracked_pairs: Vec<CurrencyPair>,
    /// History lookback for the prediction sweep
    pub window_days: i64,
    /// Forecast horizon feeding threshold derivation
    pub horizon_days: usize,
    /// Pairs processed at once within a sweep
    pub max_concurrent_pairs: usize,
    pub opportunity_lookback_days: i64,
    pub thresholds: ThresholdConfig,
    pub policy: AlertPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tracked_pairs: vec![
                CurrencyPair::new("NGN", "USD"),
                CurrencyPair::new("NGN", "GBP"),
                CurrencyPair::new("NGN", "EUR"),
            ],
            window_days: 30,
            horizon_days: 7,
            max_concurrent_pairs: 4,
            opportunity_lookback_days: OPPORTUNITY_LOOKBACK_DAYS,
            thresholds: ThresholdConfig::default(),
            policy: AlertPolicy::default(),
        }
    }
}
