//! Human-facing trend summaries

use std::collections::BTreeMap;

use fx_core::{currency_name, CurrencyPair};
use serde::{Deserialize, Serialize};

use crate::forecast::ForecastPoint;
use crate::statistics::RateStatistics;

/// Horizons (days ahead) surfaced in a report when the forecast reaches them
pub const REPORT_HORIZONS: [usize; 3] = [7, 14, 30];

/// Normalized trend (%/day) beyond which a pair counts as moving
const STABLE_BAND_PCT_PER_DAY: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Rising,
    Falling,
    Stable,
}

impl TrendDirection {
    pub fn from_trend(trend_pct_per_day: f64) -> Self {
        if trend_pct_per_day > STABLE_BAND_PCT_PER_DAY {
            TrendDirection::Rising
        } else if trend_pct_per_day < -STABLE_BAND_PCT_PER_DAY {
            TrendDirection::Falling
        } else {
            TrendDirection::Stable
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TrendDirection::Rising => "rising",
            TrendDirection::Falling => "falling",
            TrendDirection::Stable => "stable",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendReport {
    pub pair: CurrencyPair,
    pub currency_code: String,
    pub currency_name: String,
    pub current_rate: f64,
    pub min_rate: f64,
    pub max_rate: f64,
    pub avg_rate: f64,
    pub trend_direction: TrendDirection,
    pub volatility: f64,
    /// Predicted rate keyed by horizon label, e.g. "7_day"
    pub predictions: BTreeMap<String, f64>,
    pub data_points: usize,
}

impl TrendReport {
    /// Current rate relative to the window average, in percent
    pub fn change_percent(&self) -> f64 {
        if self.avg_rate == 0.0 {
            return 0.0;
        }
        (self.current_rate - self.avg_rate) / self.avg_rate * 100.0
    }

    pub fn prediction(&self, days: usize) -> Option<f64> {
        self.predictions.get(&horizon_label(days)).copied()
    }
}

pub fn horizon_label(days: usize) -> String {
    format!("{}_day", days)
}

pub struct TrendReporter;

impl TrendReporter {
    /// Assemble a report for `pair`. The quote currency is the one described.
    pub fn build(
        pair: &CurrencyPair,
        stats: &RateStatistics,
        forecast: &[ForecastPoint],
        current_rate: f64,
        sample_count: usize,
    ) -> TrendReport {
        let predictions = REPORT_HORIZONS
            .iter()
            .filter(|&&days| days <= forecast.len())
            .map(|&days| (horizon_label(days), forecast[days - 1].predicted_rate.max(0.0)))
            .collect();

        TrendReport {
            pair: pair.clone(),
            currency_code: pair.quote.clone(),
            currency_name: currency_name(&pair.quote).to_string(),
            current_rate,
            min_rate: stats.min,
            max_rate: stats.max,
            avg_rate: stats.mean,
            trend_direction: TrendDirection::from_trend(stats.trend),
            volatility: stats.volatility,
            predictions,
            data_points: sample_count,
        }
    }
}
