//! Buy / sell / hold scoring on top of a trend report.

use serde::{Deserialize, Serialize};

use crate::report::{TrendDirection, TrendReport};
use fx_core::CurrencyPair;

const LOW_VOLATILITY: f64 = 0.02;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeAction {
    Buy,
    Sell,
    Hold,
}

/// Per-action scores, each in 0..=100
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActionScores {
    pub buy: f64,
    pub sell: f64,
    pub hold: f64,
}

impl ActionScores {
    /// Highest-scoring action; ties resolve buy, then sell, then hold.
    pub fn best(&self) -> (TradeAction, f64) {
        let mut best = (TradeAction::Buy, self.buy);
        for candidate in [(TradeAction::Sell, self.sell), (TradeAction::Hold, self.hold)] {
            if candidate.1 > best.1 {
                best = candidate;
            }
        }
        best
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    pub pair: CurrencyPair,
    pub currency_code: String,
    pub current_rate: f64,
    pub avg_rate: f64,
    pub trend_direction: TrendDirection,
    pub scores: ActionScores,
    pub best_action: TradeAction,
    /// Winning score scaled to 0..=1
    pub confidence: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpportunityReport {
    pub buy: Vec<Opportunity>,
    pub sell: Vec<Opportunity>,
    pub hold: Vec<Opportunity>,
}

impl OpportunityReport {
    pub fn push(&mut self, opportunity: Opportunity) {
        match opportunity.best_action {
            TradeAction::Buy => self.buy.push(opportunity),
            TradeAction::Sell => self.sell.push(opportunity),
            TradeAction::Hold => self.hold.push(opportunity),
        }
    }

    /// Order every bucket by confidence, highest first.
    pub fn sort(&mut self) {
        for bucket in [&mut self.buy, &mut self.sell, &mut self.hold] {
            bucket.sort_by(|a, b| {
                b.confidence
                    .partial_cmp(&a.confidence)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }
    }

    pub fn len(&self) -> usize {
        self.buy.len() + self.sell.len() + self.hold.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub fn score_opportunity(report: &TrendReport) -> Opportunity {
    let current = report.current_rate;
    let avg = report.avg_rate;
    let low_volatility = report.volatility < LOW_VOLATILITY;

    // Buying favours an undervalued, falling, calm market
    let mut buy = 0.0;
    if current < avg && avg > 0.0 {
        let undervalued_pct = (avg - current) / avg * 100.0;
        buy += (undervalued_pct * 5.0).min(50.0);
    }
    buy += match report.trend_direction {
        TrendDirection::Falling => 30.0,
        TrendDirection::Stable => 15.0,
        TrendDirection::Rising => 0.0,
    };
    if low_volatility {
        buy += 20.0;
    }

    // Selling mirrors buying
    let mut sell = 0.0;
    if current > avg && avg > 0.0 {
        let overvalued_pct = (current - avg) / avg * 100.0;
        sell += (overvalued_pct * 5.0).min(50.0);
    }
    sell += match report.trend_direction {
        TrendDirection::Rising => 30.0,
        TrendDirection::Stable => 15.0,
        TrendDirection::Falling => 0.0,
    };
    if low_volatility {
        sell += 20.0;
    }

    let mut hold = 50.0;
    hold += match report.trend_direction {
        TrendDirection::Stable => 30.0,
        TrendDirection::Rising => 20.0,
        TrendDirection::Falling => 0.0,
    };
    if let Some(predicted) = report.prediction(30) {
        if predicted > current && current > 0.0 {
            hold += ((predicted - current) / current * 100.0).min(30.0);
        }
    }

    let scores = ActionScores {
        buy: buy.clamp(0.0, 100.0),
        sell: sell.clamp(0.0, 100.0),
        hold: hold.clamp(0.0, 100.0),
    };
    let (best_action, best_score) = scores.best();

    Opportunity {
        pair: report.pair.clone(),
        currency_code: report.currency_code.clone(),
        current_rate: current,
        avg_rate: avg,
        trend_direction: report.trend_direction,
        scores,
        best_action,
        confidence: best_score / 100.0,
    }
}
