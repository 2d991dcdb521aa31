use serde::{Deserialize, Serialize};

use crate::forecast::ForecastPoint;
use crate::statistics::RateStatistics;

/// Buy/sell levels. Always satisfies `sell_threshold >= buy_threshold >= 0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdPair {
    pub buy_threshold: f64,
    pub sell_threshold: f64,
}

/// Tuning knobs for threshold derivation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    /// Multiplier applied to the %/day trend before widening the band
    pub trend_scale: f64,
    /// Relative forecast move (vs. current rate) that overrides one side
    pub forecast_significance: f64,
    /// Buy level set this far above a predicted decline
    pub buy_premium: f64,
    /// Sell level set this far below a predicted rise
    pub sell_discount: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            trend_scale: 5.0,
            forecast_significance: 0.02,
            buy_premium: 0.01,
            sell_discount: 0.01,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ThresholdDeriver {
    config: ThresholdConfig,
}

impl ThresholdDeriver {
    pub fn new(config: ThresholdConfig) -> Self {
        Self { config }
    }

    pub fn derive(
        &self,
        stats: &RateStatistics,
        forecast: &[ForecastPoint],
        current_rate: f64,
    ) -> ThresholdPair {
        let mut buy = stats.mean - stats.std_dev;
        let mut sell = stats.mean + stats.std_dev;

        // Falling trend pushes buy lower, rising trend pushes sell higher
        let adj = stats.trend * self.config.trend_scale / 100.0;
        buy *= 1.0 - adj;
        sell *= 1.0 + adj;

        if !forecast.is_empty() && current_rate > 0.0 && current_rate.is_finite() {
            let mean_predicted =
                forecast.iter().map(|p| p.predicted_rate).sum::<f64>() / forecast.len() as f64;
            let change = (mean_predicted - current_rate) / current_rate;

            if change.abs() > self.config.forecast_significance {
                if change < 0.0 {
                    buy = mean_predicted * (1.0 + self.config.buy_premium);
                } else {
                    sell = mean_predicted * (1.0 - self.config.sell_discount);
                }
            }
        }

        // f64::max discards NaN, so degenerate inputs still land on the invariant
        let buy_threshold = buy.max(0.0);
        let sell_threshold = sell.max(buy_threshold);

        ThresholdPair {
            buy_threshold,
            sell_threshold,
        }
    }
}
