//! Short-horizon rate forecasting.
//!
//! A linear trend fit over the sample index is always available and acts as
//! the fallback for every other model. Additional models are blended with it
//! by arithmetic mean; a model that fails to fit is replaced by the baseline
//! for that run.

use chrono::{DateTime, Duration, Utc};
use fx_core::{FxError, RateSample};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::statistics::ols_slope;

/// Samples needed before any forecast is produced
pub const MIN_FORECAST_SAMPLES: usize = 5;

/// Two-sided z-score for the 95% band
const Z_95: f64 = 1.96;

/// One projected day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub date: DateTime<Utc>,
    pub predicted_rate: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub confidence: f64,
}

/// A strategy that extrapolates an evenly indexed series `horizon` steps ahead.
pub trait ForecastModel: Send + Sync {
    fn name(&self) -> &str;

    /// `rates` is in chronological order. Must return exactly `horizon` values.
    fn predict(&self, rates: &[f64], horizon: usize) -> Result<Vec<f64>, FxError>;
}

/// Ordinary least squares on (index, rate), extrapolated forward.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearTrendModel;

impl ForecastModel for LinearTrendModel {
    fn name(&self) -> &str {
        "linear"
    }

    fn predict(&self, rates: &[f64], horizon: usize) -> Result<Vec<f64>, FxError> {
        let last = *rates
            .last()
            .ok_or_else(|| FxError::InsufficientData("empty series".to_string()))?;

        let xs: Vec<f64> = (0..rates.len()).map(|i| i as f64).collect();
        let y_mean = rates.mean();

        let Some(slope) = ols_slope(&xs, rates, y_mean) else {
            // No variation in the index: carry the last value forward
            return Ok(vec![last; horizon]);
        };
        let x_mean = xs.iter().sum::<f64>() / xs.len() as f64;
        let intercept = y_mean - slope * x_mean;

        Ok((0..horizon)
            .map(|step| intercept + slope * (rates.len() + step) as f64)
            .collect())
    }
}

/// ARIMA(1,1,0)-style model: AR(1) without constant on first differences,
/// integrated back onto the last observed rate.
#[derive(Debug, Clone, Copy)]
pub struct ArDifferenceModel {
    pub min_samples: usize,
}

impl Default for ArDifferenceModel {
    fn default() -> Self {
        Self { min_samples: 10 }
    }
}

impl ArDifferenceModel {
    fn fit(&self, rates: &[f64]) -> Result<f64, FxError> {
        if rates.len() < self.min_samples {
            return Err(FxError::ModelFit(format!(
                "need {} samples, have {}",
                self.min_samples,
                rates.len()
            )));
        }

        let diffs: Vec<f64> = rates.windows(2).map(|w| w[1] - w[0]).collect();
        let (num, den) = diffs
            .windows(2)
            .fold((0.0, 0.0), |(num, den), w| (num + w[1] * w[0], den + w[0] * w[0]));

        if den <= f64::EPSILON {
            return Err(FxError::ModelFit("differenced series has no variance".to_string()));
        }
        let phi = num / den;
        if !phi.is_finite() || phi.abs() >= 1.0 {
            return Err(FxError::ModelFit(format!("non-stationary AR coefficient {:.4}", phi)));
        }
        Ok(phi)
    }
}

impl ForecastModel for ArDifferenceModel {
    fn name(&self) -> &str {
        "ar1-diff"
    }

    fn predict(&self, rates: &[f64], horizon: usize) -> Result<Vec<f64>, FxError> {
        let phi = self.fit(rates)?;

        let n = rates.len();
        let mut level = rates[n - 1];
        let mut diff = rates[n - 1] - rates[n - 2];

        let mut out = Vec::with_capacity(horizon);
        for _ in 0..horizon {
            diff *= phi;
            level += diff;
            out.push(level);
        }
        Ok(out)
    }
}

/// Blends a baseline model with optional enhancements.
pub struct ForecastEngine {
    baseline: Box<dyn ForecastModel>,
    enhancements: Vec<Box<dyn ForecastModel>>,
}

impl Default for ForecastEngine {
    fn default() -> Self {
        Self::new().with_model(ArDifferenceModel::default())
    }
}

impl ForecastEngine {
    /// Baseline-only engine.
    pub fn new() -> Self {
        Self {
            baseline: Box::new(LinearTrendModel),
            enhancements: Vec::new(),
        }
    }

    /// Add a model to blend with the baseline.
    pub fn with_model(mut self, model: impl ForecastModel + 'static) -> Self {
        self.enhancements.push(Box::new(model));
        self
    }

    /// Forecast `horizon` days after the most recent sample.
    ///
    /// Returns an empty list when fewer than five samples are available.
    pub fn forecast(&self, samples: &[RateSample], horizon: usize) -> Vec<ForecastPoint> {
        if samples.len() < MIN_FORECAST_SAMPLES || horizon == 0 {
            return Vec::new();
        }

        let mut ordered: Vec<&RateSample> = samples.iter().collect();
        ordered.sort_by_key(|s| s.timestamp);
        let rates: Vec<f64> = ordered.iter().map(|s| s.rate).collect();
        let last_date = ordered[ordered.len() - 1].timestamp;

        let baseline = match self.baseline.predict(&rates, horizon) {
            Ok(values) if values.len() == horizon => values,
            Ok(values) => {
                tracing::warn!(
                    "Baseline model {} returned {} points for horizon {}",
                    self.baseline.name(),
                    values.len(),
                    horizon
                );
                return Vec::new();
            }
            Err(e) => {
                tracing::warn!("Baseline model {} failed: {}", self.baseline.name(), e);
                return Vec::new();
            }
        };

        let mut runs = vec![baseline.clone()];
        for model in &self.enhancements {
            match model.predict(&rates, horizon) {
                Ok(values) if values.len() == horizon && values.iter().all(|v| v.is_finite()) => {
                    runs.push(values)
                }
                Ok(_) => {
                    tracing::debug!("Model {} produced unusable output, using baseline", model.name());
                    runs.push(baseline.clone());
                }
                Err(e) => {
                    tracing::debug!("Model {} did not fit ({}), using baseline", model.name(), e);
                    runs.push(baseline.clone());
                }
            }
        }

        // Constant-width band from the sample standard deviation of history
        let margin = rates.as_slice().std_dev() * Z_95;

        (0..horizon)
            .map(|step| {
                let predicted = runs.iter().map(|run| run[step]).sum::<f64>() / runs.len() as f64;
                ForecastPoint {
                    date: last_date + Duration::days(step as i64 + 1),
                    predicted_rate: predicted,
                    lower_bound: (predicted - margin).max(0.0),
                    upper_bound: predicted + margin,
                    confidence: 0.95,
                }
            })
            .collect()
    }
}
