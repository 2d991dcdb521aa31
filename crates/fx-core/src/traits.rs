use async_trait::async_trait;

use crate::{Alert, AlertUpdate, CurrencyPair, FxError, NewAlert, NotificationEvent, RateSample};

/// Read access to recorded exchange rates
#[async_trait]
pub trait RateHistoryStore: Send + Sync {
    /// Samples for `pair` recorded within the last `days` days, most recent first.
    /// Fails with `FxError::NotFound` when the window holds no data.
    async fn fetch_history(&self, pair: &CurrencyPair, days: i64) -> Result<Vec<RateSample>, FxError>;

    /// Most recent sample for `pair`, if any.
    async fn fetch_latest(&self, pair: &CurrencyPair) -> Result<Option<RateSample>, FxError>;
}

/// Alert persistence. Each call is transactional at single-alert granularity.
#[async_trait]
pub trait AlertStore: Send + Sync {
    async fn list_active_alerts(&self) -> Result<Vec<Alert>, FxError>;

    async fn list_auto_alerts(&self, pair: &CurrencyPair) -> Result<Vec<Alert>, FxError>;

    async fn create_alert(&self, alert: &NewAlert) -> Result<i64, FxError>;

    async fn delete_alert(&self, id: i64) -> Result<(), FxError>;

    async fn update_alert(&self, id: i64, update: &AlertUpdate) -> Result<(), FxError>;

    /// Replace every auto-generated alert of `pair` with `alerts`.
    ///
    /// The default runs delete-then-insert as separate calls; stores that can
    /// should override it with a single transaction.
    async fn replace_auto_alerts(
        &self,
        pair: &CurrencyPair,
        alerts: &[NewAlert],
    ) -> Result<Vec<i64>, FxError> {
        for existing in self.list_auto_alerts(pair).await? {
            self.delete_alert(existing.id).await?;
        }
        let mut ids = Vec::with_capacity(alerts.len());
        for alert in alerts {
            ids.push(self.create_alert(alert).await?);
        }
        Ok(ids)
    }
}

/// Best-effort delivery of triggered-alert events
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Returns whether the event reached at least one destination.
    /// Callers treat the result as informational only.
    async fn notify(&self, event: &NotificationEvent) -> bool;
}
