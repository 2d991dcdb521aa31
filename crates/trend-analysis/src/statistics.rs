//! Descriptive statistics over a window of rate samples.

use fx_core::{FxError, RateSample};
use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, Median, Statistics};

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Summary of a rate series. Recomputed on every analysis run, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateStatistics {
    pub mean: f64,
    pub median: f64,
    /// Population standard deviation
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    /// Coefficient of variation (std_dev / mean)
    pub volatility: f64,
    /// OLS slope of rate vs. elapsed days, as percent of mean per day
    pub trend: f64,
    pub sample_count: usize,
}

pub struct StatisticsCalculator;

impl StatisticsCalculator {
    /// Compute statistics for `samples`, in any order as long as each sample
    /// carries its timestamp. Elapsed time is measured from the last sample.
    pub fn calculate(samples: &[RateSample]) -> Result<RateStatistics, FxError> {
        let last = samples
            .last()
            .ok_or_else(|| FxError::InsufficientData("no rate samples".to_string()))?;

        let values: Vec<f64> = samples.iter().map(|s| s.rate).collect();
        let rates = values.as_slice();

        let mean = rates.mean();
        let std_dev = rates.population_std_dev();
        let median = Data::new(values.clone()).median();
        let min = rates.iter().copied().fold(f64::INFINITY, f64::min);
        let max = rates.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        let volatility = if mean > 0.0 { std_dev / mean } else { 0.0 };

        let days: Vec<f64> = samples
            .iter()
            .map(|s| (s.timestamp - last.timestamp).num_milliseconds() as f64 / MILLIS_PER_DAY)
            .collect();
        let trend = match ols_slope(&days, rates, mean) {
            Some(slope) if mean != 0.0 => slope / mean * 100.0,
            _ => 0.0,
        };

        Ok(RateStatistics {
            mean,
            median,
            std_dev,
            min,
            max,
            volatility,
            trend,
            sample_count: samples.len(),
        })
    }
}

/// Least-squares slope of `ys` against `xs`. `None` unless there are at least
/// two distinct x values.
pub(crate) fn ols_slope(xs: &[f64], ys: &[f64], y_mean: f64) -> Option<f64> {
    if xs.len() < 2 || xs.len() != ys.len() {
        return None;
    }
    let x_mean = xs.iter().sum::<f64>() / xs.len() as f64;

    let mut sxx = 0.0;
    let mut sxy = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - x_mean;
        sxx += dx * dx;
        sxy += dx * (y - y_mean);
    }

    if sxx <= f64::EPSILON {
        return None;
    }
    Some(sxy / sxx)
}
