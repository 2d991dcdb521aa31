//! Exchange-rate trend analysis: statistics, short-horizon forecasts, buy/sell
//! threshold derivation and human-facing trend reports.

pub mod forecast;
pub mod opportunity;
pub mod report;
pub mod statistics;
pub mod thresholds;

pub use forecast::{ArDifferenceModel, ForecastEngine, ForecastModel, ForecastPoint, LinearTrendModel};
pub use opportunity::{score_opportunity, ActionScores, Opportunity, OpportunityReport, TradeAction};
pub use report::{TrendDirection, TrendReport, TrendReporter, REPORT_HORIZONS};
pub use statistics::{RateStatistics, StatisticsCalculator};
pub use thresholds::{ThresholdConfig, ThresholdDeriver, ThresholdPair};
