use async_trait::async_trait;
use fx_core::NotificationEvent;
use notification_service::{NotificationChannel, NotificationError};

use crate::db::FxDb;

/// Persists triggered-alert events as in-app notifications.
pub struct InboxChannel {
    db: FxDb,
}

impl InboxChannel {
    pub fn new(db: FxDb) -> Self {
        Self { db }
    }
}

#[async_trait]
impl NotificationChannel for InboxChannel {
    async fn send(&self, event: &NotificationEvent) -> Result<(), NotificationError> {
        self.db
            .record_notification(event)
            .await
            .map(|_| ())
            .map_err(|e| NotificationError::Inbox(e.to_string()))
    }

    fn name(&self) -> &str {
        "inbox"
    }
}
