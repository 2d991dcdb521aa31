//! Alert lifecycle: auto-generation from derived thresholds, trigger
//! evaluation against live rates, and hysteresis-based re-arming.
//!
//! Per alert the states are active-untriggered, active-triggered and
//! inactive. Auto-generated alerts go inactive after their first notification;
//! manual alerts stay active and re-arm once the rate moves back past the
//! threshold by the reset band.

use std::ops::AddAssign;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use fx_core::{
    Alert, AlertDirection, AlertStore, AlertUpdate, CurrencyPair, FxError, NewAlert,
    NotificationEvent, NotificationSink,
};
use serde::{Deserialize, Serialize};
use trend_analysis::ThresholdPair;

/// Tunable lifecycle constants
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlertPolicy {
    /// Minimum relative distance between a derived threshold and the current
    /// rate for an auto alert to be created
    pub significance: f64,
    /// Relative move back past the threshold required to re-arm
    pub reset_hysteresis: f64,
    /// Minimum gap between repeat notifications of a still-triggered alert
    pub repeat_cooldown: Duration,
}

impl Default for AlertPolicy {
    fn default() -> Self {
        Self {
            significance: 0.02,
            reset_hysteresis: 0.02,
            repeat_cooldown: Duration::hours(24),
        }
    }
}

impl AlertPolicy {
    /// Decide what should happen to `alert` given the live `rate` at `now`.
    pub fn evaluate(&self, alert: &Alert, rate: f64, now: DateTime<Utc>) -> TriggerAction {
        if !alert.is_active {
            return TriggerAction::Idle;
        }

        if alert.direction.is_crossed(rate, alert.threshold) {
            if !alert.is_triggered {
                return TriggerAction::Notify;
            }
            return match alert.last_triggered_at {
                Some(last) if now - last < self.repeat_cooldown => TriggerAction::Idle,
                _ => TriggerAction::Notify,
            };
        }

        if alert.is_triggered
            && alert
                .direction
                .has_reverted(rate, alert.threshold, self.reset_hysteresis)
        {
            return TriggerAction::Reset;
        }

        TriggerAction::Idle
    }

    /// Auto alerts for `pair` from `thresholds`, skipping any threshold that
    /// sits within `significance` of the current rate.
    pub fn plan_auto_alerts(
        &self,
        pair: &CurrencyPair,
        current_rate: f64,
        thresholds: &ThresholdPair,
    ) -> Vec<NewAlert> {
        if !(current_rate.is_finite() && current_rate > 0.0) {
            return Vec::new();
        }

        let mut planned = Vec::with_capacity(2);

        let buy_delta = (current_rate - thresholds.buy_threshold).abs() / current_rate;
        if buy_delta >= self.significance {
            planned.push(NewAlert::auto(pair.clone(), thresholds.buy_threshold, AlertDirection::Below));
        }

        let sell_delta = (thresholds.sell_threshold - current_rate).abs() / current_rate;
        if sell_delta >= self.significance {
            planned.push(NewAlert::auto(pair.clone(), thresholds.sell_threshold, AlertDirection::Above));
        }

        planned
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerAction {
    Idle,
    Notify,
    Reset,
}

/// Counters for one trigger-evaluation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerStats {
    pub checked: usize,
    pub notified: usize,
    pub deactivated: usize,
    pub reset: usize,
    pub failures: usize,
}

impl AddAssign for TriggerStats {
    fn add_assign(&mut self, other: Self) {
        self.checked += other.checked;
        self.notified += other.notified;
        self.deactivated += other.deactivated;
        self.reset += other.reset;
        self.failures += other.failures;
    }
}

pub struct AlertLifecycleManager {
    store: Arc<dyn AlertStore>,
    notifier: Arc<dyn NotificationSink>,
    policy: AlertPolicy,
}

impl AlertLifecycleManager {
    pub fn new(store: Arc<dyn AlertStore>, notifier: Arc<dyn NotificationSink>, policy: AlertPolicy) -> Self {
        Self {
            store,
            notifier,
            policy,
        }
    }

    /// Replace the pair's auto-generated alerts with ones derived from `thresholds`.
    /// Returns the ids of the alerts created.
    pub async fn regenerate_auto_alerts(
        &self,
        pair: &CurrencyPair,
        current_rate: f64,
        thresholds: &ThresholdPair,
    ) -> Result<Vec<i64>, FxError> {
        let planned = self.policy.plan_auto_alerts(pair, current_rate, thresholds);
        let ids = self.store.replace_auto_alerts(pair, &planned).await?;

        tracing::info!(
            "Generated {} auto alerts for {}: buy={:.6}, sell={:.6}",
            ids.len(),
            pair,
            thresholds.buy_threshold,
            thresholds.sell_threshold
        );
        Ok(ids)
    }

    /// Evaluate one alert against `rate`, notifying and persisting as needed.
    pub async fn process_alert(
        &self,
        alert: &Alert,
        rate: f64,
        now: DateTime<Utc>,
    ) -> Result<TriggerAction, FxError> {
        let action = self.policy.evaluate(alert, rate, now);

        match action {
            TriggerAction::Idle => {}
            TriggerAction::Notify => {
                let event = NotificationEvent::for_alert(alert, rate, now);
                if !self.notifier.notify(&event).await {
                    tracing::warn!("Alert {} notification was not delivered to any channel", alert.id);
                }

                let update = AlertUpdate {
                    is_triggered: Some(true),
                    last_triggered_at: Some(now),
                    is_active: alert.is_auto_generated.then_some(false),
                };
                self.store.update_alert(alert.id, &update).await?;

                tracing::info!(
                    "Alert {} triggered for {} ({} {:.6}, rate {:.6})",
                    alert.id,
                    alert.pair,
                    alert.direction,
                    alert.threshold,
                    rate
                );
            }
            TriggerAction::Reset => {
                let update = AlertUpdate {
                    is_triggered: Some(false),
                    ..Default::default()
                };
                self.store.update_alert(alert.id, &update).await?;
                tracing::debug!("Alert {} re-armed at rate {:.6}", alert.id, rate);
            }
        }

        Ok(action)
    }

    /// Evaluate every alert of one pair against that pair's live rate.
    /// A failure on one alert is logged and does not stop the others.
    pub async fn check_alerts(&self, alerts: &[Alert], rate: f64, now: DateTime<Utc>) -> TriggerStats {
        let mut stats = TriggerStats::default();

        for alert in alerts {
            stats.checked += 1;
            match self.process_alert(alert, rate, now).await {
                Ok(TriggerAction::Notify) => {
                    stats.notified += 1;
                    if alert.is_auto_generated {
                        stats.deactivated += 1;
                    }
                }
                Ok(TriggerAction::Reset) => stats.reset += 1,
                Ok(TriggerAction::Idle) => {}
                Err(e) => {
                    stats.failures += 1;
                    tracing::error!("Failed to update alert {}: {}", alert.id, e);
                }
            }
        }

        stats
    }
}
