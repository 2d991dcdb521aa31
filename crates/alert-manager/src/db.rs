use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use fx_core::{
    Alert, AlertStore, AlertUpdate, CurrencyPair, FxError, NewAlert, NotificationEvent,
    RateHistoryStore, RateSample,
};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::path::Path;
use std::str::FromStr;

const ALERT_COLUMNS: &str = "id, user_id, base_currency, quote_currency, threshold, direction, \
     is_active, is_triggered, is_auto_generated, description, last_triggered_at, created_at, updated_at";

/// SQLite-backed rate history, alert store and notification inbox
#[derive(Clone)]
pub struct FxDb {
    pool: SqlitePool,
}

impl FxDb {
    /// Create a new database connection
    pub async fn new(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

        // Every connection to sqlite::memory: is a separate database, so keep exactly one
        let pool = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(options)
                .await?
        };

        let db = Self { pool };
        db.init_schema().await?;

        Ok(db)
    }

    /// Initialize database schema
    async fn init_schema(&self) -> Result<()> {
        let schema = include_str!("../schema.sql");

        // Execute schema (split by statement since sqlx doesn't support multiple statements)
        for statement in schema.split(';') {
            let stmt = statement.trim();
            if !stmt.is_empty() {
                sqlx::query(stmt).execute(&self.pool).await?;
            }
        }

        Ok(())
    }

    /// Get the database pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Check if database file exists
    pub fn exists(path: &str) -> bool {
        let file_path = path.strip_prefix("sqlite:").unwrap_or(path);
        Path::new(file_path).exists()
    }

    /// Record a rate observation for `pair`
    pub async fn record_rate(&self, pair: &CurrencyPair, sample: &RateSample) -> Result<i64, FxError> {
        if !(sample.rate.is_finite() && sample.rate > 0.0) {
            return Err(FxError::InvalidData(format!(
                "rate for {} must be positive, got {}",
                pair, sample.rate
            )));
        }

        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO exchange_rates (base_currency, quote_currency, rate, source, timestamp)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(&pair.base)
        .bind(&pair.quote)
        .bind(sample.rate)
        .bind(&sample.source)
        .bind(to_db_time(sample.timestamp))
        .fetch_one(&self.pool)
        .await
        .map_err(persistence)?;

        Ok(id)
    }

    pub async fn get_alert(&self, id: i64) -> Result<Option<Alert>, FxError> {
        let row = sqlx::query_as::<_, AlertRow>(&format!(
            "SELECT {} FROM alerts WHERE id = ?",
            ALERT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(persistence)?;

        row.map(AlertRow::into_alert).transpose()
    }

    /// All alerts for a pair, newest first
    pub async fn list_alerts_for_pair(&self, pair: &CurrencyPair) -> Result<Vec<Alert>, FxError> {
        let rows = sqlx::query_as::<_, AlertRow>(&format!(
            "SELECT {} FROM alerts WHERE base_currency = ? AND quote_currency = ? ORDER BY created_at DESC, id DESC",
            ALERT_COLUMNS
        ))
        .bind(&pair.base)
        .bind(&pair.quote)
        .fetch_all(&self.pool)
        .await
        .map_err(persistence)?;

        rows.into_iter().map(AlertRow::into_alert).collect()
    }

    /// Store a triggered-alert event in the inbox
    pub async fn record_notification(&self, event: &NotificationEvent) -> Result<i64, FxError> {
        let payload = serde_json::to_string(event)
            .map_err(|e| FxError::InvalidData(format!("notification payload: {}", e)))?;

        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO notifications (alert_id, user_id, notification_type, payload, created_at)
            VALUES (?, ?, 'alert', ?, ?)
            RETURNING id
            "#,
        )
        .bind(event.alert_id)
        .bind(event.user_id)
        .bind(payload)
        .bind(to_db_time(Utc::now()))
        .fetch_one(&self.pool)
        .await
        .map_err(persistence)?;

        Ok(id)
    }

    /// Inbox entries, newest first. `None` lists entries for every user.
    pub async fn list_notifications(&self, user_id: Option<i64>) -> Result<Vec<StoredNotification>, FxError> {
        let rows = match user_id {
            Some(uid) => {
                sqlx::query_as::<_, NotificationRow>(
                    "SELECT id, alert_id, user_id, payload, is_read, created_at FROM notifications WHERE user_id = ? ORDER BY id DESC",
                )
                .bind(uid)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as::<_, NotificationRow>(
                    "SELECT id, alert_id, user_id, payload, is_read, created_at FROM notifications ORDER BY id DESC",
                )
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(persistence)?;

        rows.into_iter().map(NotificationRow::into_stored).collect()
    }
}

#[async_trait]
impl RateHistoryStore for FxDb {
    async fn fetch_history(&self, pair: &CurrencyPair, days: i64) -> Result<Vec<RateSample>, FxError> {
        let since = Duration::try_days(days)
            .and_then(|window| Utc::now().checked_sub_signed(window))
            .ok_or_else(|| FxError::InvalidData(format!("lookback of {} days is out of range", days)))?;

        let rows = sqlx::query_as::<_, RateRow>(
            r#"
            SELECT rate, source, timestamp FROM exchange_rates
            WHERE base_currency = ? AND quote_currency = ? AND timestamp >= ?
            ORDER BY timestamp DESC
            "#,
        )
        .bind(&pair.base)
        .bind(&pair.quote)
        .bind(to_db_time(since))
        .fetch_all(&self.pool)
        .await
        .map_err(rate_fetch)?;

        if rows.is_empty() {
            return Err(FxError::NotFound(format!(
                "no rate data for {} in the last {} days",
                pair, days
            )));
        }

        rows.into_iter().map(RateRow::into_sample).collect()
    }

    async fn fetch_latest(&self, pair: &CurrencyPair) -> Result<Option<RateSample>, FxError> {
        let row = sqlx::query_as::<_, RateRow>(
            r#"
            SELECT rate, source, timestamp FROM exchange_rates
            WHERE base_currency = ? AND quote_currency = ?
            ORDER BY timestamp DESC
            LIMIT 1
            "#,
        )
        .bind(&pair.base)
        .bind(&pair.quote)
        .fetch_optional(&self.pool)
        .await
        .map_err(rate_fetch)?;

        row.map(RateRow::into_sample).transpose()
    }
}

#[async_trait]
impl AlertStore for FxDb {
    async fn list_active_alerts(&self) -> Result<Vec<Alert>, FxError> {
        let rows = sqlx::query_as::<_, AlertRow>(&format!(
            "SELECT {} FROM alerts WHERE is_active = 1 ORDER BY created_at DESC, id DESC",
            ALERT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(persistence)?;

        rows.into_iter().map(AlertRow::into_alert).collect()
    }

    async fn list_auto_alerts(&self, pair: &CurrencyPair) -> Result<Vec<Alert>, FxError> {
        let rows = sqlx::query_as::<_, AlertRow>(&format!(
            "SELECT {} FROM alerts WHERE base_currency = ? AND quote_currency = ? AND is_auto_generated = 1 ORDER BY id",
            ALERT_COLUMNS
        ))
        .bind(&pair.base)
        .bind(&pair.quote)
        .fetch_all(&self.pool)
        .await
        .map_err(persistence)?;

        rows.into_iter().map(AlertRow::into_alert).collect()
    }

    async fn create_alert(&self, alert: &NewAlert) -> Result<i64, FxError> {
        validate_new_alert(alert)?;
        let now = to_db_time(Utc::now());

        let (id,): (i64,) = sqlx::query_as(INSERT_ALERT)
            .bind(alert.user_id)
            .bind(&alert.pair.base)
            .bind(&alert.pair.quote)
            .bind(alert.threshold)
            .bind(alert.direction.as_str())
            .bind(alert.is_auto_generated)
            .bind(&alert.description)
            .bind(&now)
            .bind(&now)
            .fetch_one(&self.pool)
            .await
            .map_err(persistence)?;

        Ok(id)
    }

    async fn delete_alert(&self, id: i64) -> Result<(), FxError> {
        let result = sqlx::query("DELETE FROM alerts WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(persistence)?;

        if result.rows_affected() == 0 {
            return Err(FxError::NotFound(format!("alert {}", id)));
        }
        Ok(())
    }

    async fn update_alert(&self, id: i64, update: &AlertUpdate) -> Result<(), FxError> {
        if update.is_empty() {
            return Ok(());
        }

        let result = sqlx::query(
            r#"
            UPDATE alerts SET
                is_active = COALESCE(?, is_active),
                is_triggered = COALESCE(?, is_triggered),
                last_triggered_at = COALESCE(?, last_triggered_at),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(update.is_active)
        .bind(update.is_triggered)
        .bind(update.last_triggered_at.map(to_db_time))
        .bind(to_db_time(Utc::now()))
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(persistence)?;

        if result.rows_affected() == 0 {
            return Err(FxError::NotFound(format!("alert {}", id)));
        }
        Ok(())
    }

    async fn replace_auto_alerts(
        &self,
        pair: &CurrencyPair,
        alerts: &[NewAlert],
    ) -> Result<Vec<i64>, FxError> {
        for alert in alerts {
            validate_new_alert(alert)?;
            if !alert.is_auto_generated || alert.pair != *pair {
                return Err(FxError::InvalidData(format!(
                    "replacement alerts must be auto-generated for {}",
                    pair
                )));
            }
        }

        let now = to_db_time(Utc::now());
        let mut tx = self.pool.begin().await.map_err(persistence)?;

        sqlx::query(
            "DELETE FROM alerts WHERE base_currency = ? AND quote_currency = ? AND is_auto_generated = 1",
        )
        .bind(&pair.base)
        .bind(&pair.quote)
        .execute(&mut *tx)
        .await
        .map_err(persistence)?;

        let mut ids = Vec::with_capacity(alerts.len());
        for alert in alerts {
            let (id,): (i64,) = sqlx::query_as(INSERT_ALERT)
                .bind(alert.user_id)
                .bind(&alert.pair.base)
                .bind(&alert.pair.quote)
                .bind(alert.threshold)
                .bind(alert.direction.as_str())
                .bind(alert.is_auto_generated)
                .bind(&alert.description)
                .bind(&now)
                .bind(&now)
                .fetch_one(&mut *tx)
                .await
                .map_err(persistence)?;
            ids.push(id);
        }

        tx.commit().await.map_err(persistence)?;
        Ok(ids)
    }
}

const INSERT_ALERT: &str = r#"
    INSERT INTO alerts
    (user_id, base_currency, quote_currency, threshold, direction, is_active, is_triggered,
     is_auto_generated, description, created_at, updated_at)
    VALUES (?, ?, ?, ?, ?, 1, 0, ?, ?, ?, ?)
    RETURNING id
"#;

fn validate_new_alert(alert: &NewAlert) -> Result<(), FxError> {
    if !(alert.threshold.is_finite() && alert.threshold >= 0.0) {
        return Err(FxError::InvalidData(format!(
            "alert threshold must be non-negative, got {}",
            alert.threshold
        )));
    }
    Ok(())
}

fn persistence(e: sqlx::Error) -> FxError {
    FxError::Persistence(e.to_string())
}

fn rate_fetch(e: sqlx::Error) -> FxError {
    FxError::RateFetch(e.to_string())
}

/// Fixed-width UTC text so that lexical order matches time order
fn to_db_time(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn from_db_time(raw: &str) -> Result<DateTime<Utc>, FxError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| FxError::InvalidData(format!("bad timestamp '{}': {}", raw, e)))
}

/// Internal DB row types with String dates
#[derive(Debug, FromRow)]
struct RateRow {
    rate: f64,
    source: Option<String>,
    timestamp: String,
}

impl RateRow {
    fn into_sample(self) -> Result<RateSample, FxError> {
        Ok(RateSample {
            timestamp: from_db_time(&self.timestamp)?,
            rate: self.rate,
            source: self.source,
        })
    }
}

#[derive(Debug, FromRow)]
struct AlertRow {
    id: i64,
    user_id: Option<i64>,
    base_currency: String,
    quote_currency: String,
    threshold: f64,
    direction: String,
    is_active: bool,
    is_triggered: bool,
    is_auto_generated: bool,
    description: Option<String>,
    last_triggered_at: Option<String>,
    created_at: String,
    updated_at: String,
}

impl AlertRow {
    fn into_alert(self) -> Result<Alert, FxError> {
        Ok(Alert {
            id: self.id,
            user_id: self.user_id,
            pair: CurrencyPair::new(self.base_currency, self.quote_currency),
            threshold: self.threshold,
            direction: self.direction.parse()?,
            is_active: self.is_active,
            is_triggered: self.is_triggered,
            is_auto_generated: self.is_auto_generated,
            description: self.description,
            last_triggered_at: self.last_triggered_at.as_deref().map(from_db_time).transpose()?,
            created_at: from_db_time(&self.created_at)?,
            updated_at: from_db_time(&self.updated_at)?,
        })
    }
}

/// Inbox entry as stored
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredNotification {
    pub id: i64,
    pub alert_id: i64,
    pub user_id: Option<i64>,
    pub event: NotificationEvent,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct NotificationRow {
    id: i64,
    alert_id: i64,
    user_id: Option<i64>,
    payload: String,
    is_read: bool,
    created_at: String,
}

impl NotificationRow {
    fn into_stored(self) -> Result<StoredNotification, FxError> {
        let event = serde_json::from_str(&self.payload)
            .map_err(|e| FxError::InvalidData(format!("notification {} payload: {}", self.id, e)))?;
        Ok(StoredNotification {
            id: self.id,
            alert_id: self.alert_id,
            user_id: self.user_id,
            event,
            is_read: self.is_read,
            created_at: from_db_time(&self.created_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fx_core::AlertDirection;

    async fn setup_test_db() -> FxDb {
        FxDb::new("sqlite::memory:").await.unwrap()
    }

    fn usd() -> CurrencyPair {
        CurrencyPair::new("NGN", "USD")
    }

    #[tokio::test]
    async fn test_db_creation() {
        let db = setup_test_db().await;
        assert!(db.pool().acquire().await.is_ok());
    }

    #[tokio::test]
    async fn test_history_window_and_order() {
        let db = setup_test_db().await;
        let now = Utc::now();
        for (days_ago, rate) in [(40, 0.00060), (10, 0.00062), (5, 0.00064), (1, 0.00066)] {
            let sample = RateSample::new(now - Duration::days(days_ago), rate).with_source("test");
            db.record_rate(&usd(), &sample).await.unwrap();
        }

        let history = db.fetch_history(&usd(), 30).await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].rate, 0.00066);
        assert!(history.windows(2).all(|w| w[0].timestamp > w[1].timestamp));
        assert_eq!(history[0].source.as_deref(), Some("test"));

        let latest = db.fetch_latest(&usd()).await.unwrap().unwrap();
        assert_eq!(latest.rate, 0.00066);
    }

    #[tokio::test]
    async fn test_missing_history_is_not_found() {
        let db = setup_test_db().await;
        let err = db.fetch_history(&usd(), 30).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(db.fetch_latest(&usd()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_out_of_range_lookback_is_invalid() {
        let db = setup_test_db().await;
        db.record_rate(&usd(), &RateSample::new(Utc::now(), 0.00065)).await.unwrap();

        let err = db.fetch_history(&usd(), 100_000_000).await.unwrap_err();
        assert!(matches!(err, FxError::InvalidData(_)));
        assert!(matches!(db.fetch_history(&usd(), i64::MAX).await, Err(FxError::InvalidData(_))));
    }

    #[tokio::test]
    async fn test_rejects_non_positive_rate() {
        let db = setup_test_db().await;
        let sample = RateSample::new(Utc::now(), 0.0);
        assert!(matches!(db.record_rate(&usd(), &sample).await, Err(FxError::InvalidData(_))));
    }

    #[tokio::test]
    async fn test_create_update_and_delete_alert() {
        let db = setup_test_db().await;
        let id = db
            .create_alert(&NewAlert::manual(1, usd(), 0.0007, AlertDirection::Above))
            .await
            .unwrap();

        let alert = db.get_alert(id).await.unwrap().unwrap();
        assert!(alert.is_active);
        assert!(!alert.is_triggered);
        assert_eq!(alert.direction, AlertDirection::Above);
        assert_eq!(alert.user_id, Some(1));

        let fired_at = Utc::now();
        db.update_alert(
            id,
            &AlertUpdate {
                is_triggered: Some(true),
                last_triggered_at: Some(fired_at),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let alert = db.get_alert(id).await.unwrap().unwrap();
        assert!(alert.is_triggered);
        assert!(alert.is_active);
        let stored = alert.last_triggered_at.unwrap();
        assert!((stored - fired_at).num_milliseconds().abs() < 1);

        db.delete_alert(id).await.unwrap();
        assert!(db.get_alert(id).await.unwrap().is_none());
        assert!(db.delete_alert(id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_active_listing_excludes_deactivated() {
        let db = setup_test_db().await;
        let keep = db
            .create_alert(&NewAlert::manual(1, usd(), 0.0007, AlertDirection::Above))
            .await
            .unwrap();
        let drop = db
            .create_alert(&NewAlert::manual(1, usd(), 0.0005, AlertDirection::Below))
            .await
            .unwrap();
        db.update_alert(drop, &AlertUpdate { is_active: Some(false), ..Default::default() })
            .await
            .unwrap();

        let active = db.list_active_alerts().await.unwrap();
        assert_eq!(active.iter().map(|a| a.id).collect::<Vec<_>>(), vec![keep]);
    }

    #[tokio::test]
    async fn test_replace_auto_alerts_keeps_manual_ones() {
        let db = setup_test_db().await;
        let manual = db
            .create_alert(&NewAlert::manual(1, usd(), 0.0007, AlertDirection::Above))
            .await
            .unwrap();

        let first = vec![
            NewAlert::auto(usd(), 0.00058, AlertDirection::Below),
            NewAlert::auto(usd(), 0.00070, AlertDirection::Above),
        ];
        db.replace_auto_alerts(&usd(), &first).await.unwrap();
        let second = vec![NewAlert::auto(usd(), 0.00059, AlertDirection::Below)];
        db.replace_auto_alerts(&usd(), &second).await.unwrap();

        let auto = db.list_auto_alerts(&usd()).await.unwrap();
        assert_eq!(auto.len(), 1);
        assert_eq!(auto[0].threshold, 0.00059);
        assert!(db.get_alert(manual).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_rejected_replacement_leaves_existing_alerts() {
        let db = setup_test_db().await;
        db.replace_auto_alerts(&usd(), &[NewAlert::auto(usd(), 0.0006, AlertDirection::Below)])
            .await
            .unwrap();

        let good = NewAlert::auto(usd(), 0.0007, AlertDirection::Above);
        let wrong_pair = NewAlert::auto(CurrencyPair::new("NGN", "EUR"), 0.0008, AlertDirection::Above);
        let err = db
            .replace_auto_alerts(&usd(), &[good, wrong_pair])
            .await
            .unwrap_err();
        assert!(matches!(err, FxError::InvalidData(_)));

        let auto = db.list_auto_alerts(&usd()).await.unwrap();
        assert_eq!(auto.len(), 1);
        assert_eq!(auto[0].threshold, 0.0006);
    }

    #[tokio::test]
    async fn test_failed_insert_rolls_back_delete() {
        let db = setup_test_db().await;
        db.replace_auto_alerts(&usd(), &[NewAlert::auto(usd(), 0.0006, AlertDirection::Below)])
            .await
            .unwrap();

        // Make the second insert of the batch fail inside the transaction
        sqlx::query(
            "CREATE TRIGGER block_above BEFORE INSERT ON alerts WHEN NEW.direction = 'above' \
             BEGIN SELECT RAISE(ABORT, 'blocked'); END",
        )
        .execute(db.pool())
        .await
        .unwrap();

        let batch = [
            NewAlert::auto(usd(), 0.00055, AlertDirection::Below),
            NewAlert::auto(usd(), 0.0007, AlertDirection::Above),
        ];
        let err = db.replace_auto_alerts(&usd(), &batch).await.unwrap_err();
        assert!(matches!(err, FxError::Persistence(_)));

        let auto = db.list_auto_alerts(&usd()).await.unwrap();
        assert_eq!(auto.len(), 1);
        assert_eq!(auto[0].threshold, 0.0006);
    }

    #[tokio::test]
    async fn test_notification_inbox_roundtrip() {
        let db = setup_test_db().await;
        let event = NotificationEvent {
            alert_id: 3,
            user_id: Some(9),
            currency_pair: "NGN/USD".to_string(),
            threshold: 0.0006,
            current_rate: 0.00059,
            direction: AlertDirection::Below,
            timestamp: Utc::now(),
        };
        db.record_notification(&event).await.unwrap();

        let mine = db.list_notifications(Some(9)).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].event, event);
        assert!(!mine[0].is_read);
        assert!(db.list_notifications(Some(10)).await.unwrap().is_empty());
    }
}
