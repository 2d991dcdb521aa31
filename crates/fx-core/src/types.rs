use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::FxError;

/// Ordered (base, quote) currency combination, e.g. NGN/USD
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CurrencyPair {
    pub base: String,
    pub quote: String,
}

impl CurrencyPair {
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            base: base.into().to_uppercase(),
            quote: quote.into().to_uppercase(),
        }
    }
}

impl fmt::Display for CurrencyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

impl FromStr for CurrencyPair {
    type Err = FxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (base, quote) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| FxError::InvalidData(format!("expected BASE/QUOTE, got '{}'", s)))?;
        let (base, quote) = (base.trim(), quote.trim());

        let valid = |code: &str| code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic());
        if !valid(base) || !valid(quote) {
            return Err(FxError::InvalidData(format!(
                "currency codes must be 3 letters, got '{}'",
                s
            )));
        }
        if base.eq_ignore_ascii_case(quote) {
            return Err(FxError::InvalidData(format!("pair '{}' has identical legs", s)));
        }

        Ok(CurrencyPair::new(base, quote))
    }
}

/// Human-readable name for the currencies the app tracks out of the box.
pub fn currency_name(code: &str) -> &str {
    match code {
        "USD" => "US Dollar",
        "GBP" => "British Pound",
        "EUR" => "Euro",
        "NGN" => "Nigerian Naira",
        other => other,
    }
}

/// A single recorded exchange rate observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateSample {
    pub timestamp: DateTime<Utc>,
    pub rate: f64,
    #[serde(default)]
    pub source: Option<String>,
}

impl RateSample {
    pub fn new(timestamp: DateTime<Utc>, rate: f64) -> Self {
        Self {
            timestamp,
            rate,
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Side of the threshold an alert watches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertDirection {
    /// Fires when rate >= threshold (sell alert)
    Above,
    /// Fires when rate <= threshold (buy alert)
    Below,
}

impl AlertDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertDirection::Above => "above",
            AlertDirection::Below => "below",
        }
    }

    /// Whether `rate` satisfies the trigger condition against `threshold`.
    pub fn is_crossed(&self, rate: f64, threshold: f64) -> bool {
        match self {
            AlertDirection::Above => rate >= threshold,
            AlertDirection::Below => rate <= threshold,
        }
    }

    /// Whether `rate` has moved back past `threshold` by more than `band`
    /// (a fraction, e.g. 0.02) on the non-triggering side.
    pub fn has_reverted(&self, rate: f64, threshold: f64, band: f64) -> bool {
        match self {
            AlertDirection::Above => rate < threshold * (1.0 - band),
            AlertDirection::Below => rate > threshold * (1.0 + band),
        }
    }
}

impl fmt::Display for AlertDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertDirection {
    type Err = FxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "above" => Ok(AlertDirection::Above),
            "below" => Ok(AlertDirection::Below),
            other => Err(FxError::InvalidData(format!("unknown alert direction '{}'", other))),
        }
    }
}

/// Persisted alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: i64,
    pub user_id: Option<i64>,
    pub pair: CurrencyPair,
    pub threshold: f64,
    pub direction: AlertDirection,
    pub is_active: bool,
    pub is_triggered: bool,
    pub is_auto_generated: bool,
    pub description: Option<String>,
    pub last_triggered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Alert before it has been assigned an id by the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAlert {
    pub user_id: Option<i64>,
    pub pair: CurrencyPair,
    pub threshold: f64,
    pub direction: AlertDirection,
    pub is_auto_generated: bool,
    pub description: Option<String>,
}

impl NewAlert {
    /// A user-defined alert.
    pub fn manual(user_id: i64, pair: CurrencyPair, threshold: f64, direction: AlertDirection) -> Self {
        Self {
            user_id: Some(user_id),
            pair,
            threshold,
            direction,
            is_auto_generated: false,
            description: None,
        }
    }

    /// An engine-generated alert. Buy alerts watch `Below`, sell alerts `Above`.
    pub fn auto(pair: CurrencyPair, threshold: f64, direction: AlertDirection) -> Self {
        let side = match direction {
            AlertDirection::Below => "buying",
            AlertDirection::Above => "selling",
        };
        let description = format!("Auto-generated favorable {} opportunity for {}", side, pair);
        Self {
            user_id: None,
            pair,
            threshold,
            direction,
            is_auto_generated: true,
            description: Some(description),
        }
    }
}

/// Partial update applied by trigger evaluation. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlertUpdate {
    pub is_active: Option<bool>,
    pub is_triggered: Option<bool>,
    pub last_triggered_at: Option<DateTime<Utc>>,
}

impl AlertUpdate {
    pub fn is_empty(&self) -> bool {
        self.is_active.is_none() && self.is_triggered.is_none() && self.last_triggered_at.is_none()
    }
}

/// Payload handed to the notification sink when an alert fires
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub alert_id: i64,
    pub user_id: Option<i64>,
    pub currency_pair: String,
    pub threshold: f64,
    pub current_rate: f64,
    pub direction: AlertDirection,
    pub timestamp: DateTime<Utc>,
}

impl NotificationEvent {
    pub fn for_alert(alert: &Alert, current_rate: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            alert_id: alert.id,
            user_id: alert.user_id,
            currency_pair: alert.pair.to_string(),
            threshold: alert.threshold,
            current_rate,
            direction: alert.direction,
            timestamp,
        }
    }

    /// Distance between the live rate and the threshold, in percent of the threshold.
    pub fn percent_from_threshold(&self) -> f64 {
        if self.threshold == 0.0 {
            return 0.0;
        }
        (self.current_rate - self.threshold).abs() / self.threshold * 100.0
    }
}
