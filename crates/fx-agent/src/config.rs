use alert_manager::AlertPolicy;
use anyhow::{Context, Result};
use fx_core::CurrencyPair;
use fx_engine::{EngineConfig, OPPORTUNITY_LOOKBACK_DAYS};
use serde::{Deserialize, Serialize};
use std::env;
use trend_analysis::ThresholdConfig;

/// Longest accepted prediction lookback (ten years)
pub const MAX_WINDOW_DAYS: i64 = 3650;

/// Longest accepted repeat-notification cooldown (one year)
pub const MAX_COOLDOWN_HOURS: i64 = 8760;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    // Storage
    pub database_url: String,

    // Pairs swept on every cycle
    pub tracked_pairs: Vec<CurrencyPair>,

    // Prediction parameters
    pub prediction_window_days: i64,    // 30
    pub prediction_horizon_days: usize, // 7
    pub forecast_significance: f64,     // 0.02

    // Schedules
    pub prediction_interval_seconds: u64, // 86400 (daily)
    pub alert_check_interval_seconds: u64, // 300 (5 minutes)
    pub max_concurrent_pairs: usize,

    // Alert lifecycle
    pub alert_significance: f64,         // 0.02
    pub alert_reset_hysteresis: f64,     // 0.02
    pub alert_repeat_cooldown_hours: i64, // 24
}

impl AgentConfig {
    pub fn from_env() -> Result<Self> {
        let tracked_pairs = env::var("TRACKED_PAIRS")
            .unwrap_or_else(|_| "NGN/USD,NGN/GBP,NGN/EUR".to_string());

        let config = Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:fx.db".to_string()),

            tracked_pairs: parse_pairs(&tracked_pairs)?,

            prediction_window_days: env::var("PREDICTION_WINDOW_DAYS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .context("PREDICTION_WINDOW_DAYS must be an integer")?,
            prediction_horizon_days: env::var("PREDICTION_HORIZON_DAYS")
                .unwrap_or_else(|_| "7".to_string())
                .parse()
                .context("PREDICTION_HORIZON_DAYS must be a positive integer")?,
            forecast_significance: env::var("FORECAST_SIGNIFICANCE")
                .unwrap_or_else(|_| "0.02".to_string())
                .parse()
                .context("FORECAST_SIGNIFICANCE must be a number")?,

            prediction_interval_seconds: env::var("PREDICTION_INTERVAL")
                .unwrap_or_else(|_| "86400".to_string())
                .parse()
                .context("PREDICTION_INTERVAL must be seconds")?,
            alert_check_interval_seconds: env::var("ALERT_CHECK_INTERVAL")
                .unwrap_or_else(|_| "300".to_string())
                .parse()
                .context("ALERT_CHECK_INTERVAL must be seconds")?,
            max_concurrent_pairs: env::var("MAX_CONCURRENT_PAIRS")
                .unwrap_or_else(|_| "4".to_string())
                .parse()
                .context("MAX_CONCURRENT_PAIRS must be a positive integer")?,

            alert_significance: env::var("ALERT_SIGNIFICANCE")
                .unwrap_or_else(|_| "0.02".to_string())
                .parse()
                .context("ALERT_SIGNIFICANCE must be a number")?,
            alert_reset_hysteresis: env::var("ALERT_RESET_HYSTERESIS")
                .unwrap_or_else(|_| "0.02".to_string())
                .parse()
                .context("ALERT_RESET_HYSTERESIS must be a number")?,
            alert_repeat_cooldown_hours: env::var("ALERT_REPEAT_COOLDOWN_HOURS")
                .unwrap_or_else(|_| "24".to_string())
                .parse()
                .context("ALERT_REPEAT_COOLDOWN_HOURS must be an integer")?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tracked_pairs.is_empty() {
            anyhow::bail!("TRACKED_PAIRS must list at least one pair");
        }
        if !(1..=MAX_WINDOW_DAYS).contains(&self.prediction_window_days) {
            anyhow::bail!(
                "PREDICTION_WINDOW_DAYS must be between 1 and {}, got {}",
                MAX_WINDOW_DAYS,
                self.prediction_window_days
            );
        }
        if self.prediction_horizon_days == 0 {
            anyhow::bail!("PREDICTION_HORIZON_DAYS must be at least 1");
        }
        if self.prediction_interval_seconds == 0 || self.alert_check_interval_seconds == 0 {
            anyhow::bail!("PREDICTION_INTERVAL and ALERT_CHECK_INTERVAL must be non-zero");
        }
        if self.max_concurrent_pairs == 0 {
            anyhow::bail!("MAX_CONCURRENT_PAIRS must be at least 1");
        }
        for (name, value) in [
            ("ALERT_SIGNIFICANCE", self.alert_significance),
            ("ALERT_RESET_HYSTERESIS", self.alert_reset_hysteresis),
            ("FORECAST_SIGNIFICANCE", self.forecast_significance),
        ] {
            if !(0.0..1.0).contains(&value) {
                anyhow::bail!("{} must be in [0, 1), got {}", name, value);
            }
        }
        if !(0..=MAX_COOLDOWN_HOURS).contains(&self.alert_repeat_cooldown_hours) {
            anyhow::bail!(
                "ALERT_REPEAT_COOLDOWN_HOURS must be between 0 and {}",
                MAX_COOLDOWN_HOURS
            );
        }
        Ok(())
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            tracked_pairs: self.tracked_pairs.clone(),
            window_days: self.prediction_window_days,
            horizon_days: self.prediction_horizon_days,
            max_concurrent_pairs: self.max_concurrent_pairs,
            opportunity_lookback_days: OPPORTUNITY_LOOKBACK_DAYS,
            thresholds: ThresholdConfig {
                forecast_significance: self.forecast_significance,
                ..Default::default()
            },
            policy: AlertPolicy {
                significance: self.alert_significance,
                reset_hysteresis: self.alert_reset_hysteresis,
                repeat_cooldown: chrono::Duration::hours(self.alert_repeat_cooldown_hours),
            },
        }
    }
}

/// Parse a comma-separated list such as `NGN/USD, NGN/GBP`. Duplicates are dropped.
pub fn parse_pairs(raw: &str) -> Result<Vec<CurrencyPair>> {
    let mut pairs: Vec<CurrencyPair> = Vec::new();
    for item in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let pair: CurrencyPair = item
            .parse()
            .with_context(|| format!("invalid currency pair in TRACKED_PAIRS: {}", item))?;
        if !pairs.contains(&pair) {
            pairs.push(pair);
        }
    }
    Ok(pairs)
}
