use async_trait::async_trait;
use fx_core::{AlertDirection, NotificationEvent};

use crate::{render_event, NotificationChannel, NotificationError};

/// Discord webhook notifier.
pub struct DiscordWebhookNotifier {
    webhook_url: String,
    client: reqwest::Client,
}

impl DiscordWebhookNotifier {
    pub fn new(webhook_url: String) -> Self {
        Self {
            webhook_url,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl NotificationChannel for DiscordWebhookNotifier {
    async fn send(&self, event: &NotificationEvent) -> Result<(), NotificationError> {
        // Green for buy (below) alerts, orange for sell (above) alerts
        let color = match event.direction {
            AlertDirection::Below => 0x00ff00,
            AlertDirection::Above => 0xff6600,
        };
        let (title, message) = render_event(event);

        let payload = serde_json::json!({
            "username": "GainSight FX",
            "embeds": [{
                "title": title,
                "description": message,
                "color": color,
                "timestamp": event.timestamp.to_rfc3339(),
            }]
        });

        self.client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .map_err(|e| NotificationError::Discord(e.to_string()))?;

        Ok(())
    }

    fn name(&self) -> &str {
        "discord-webhook"
    }
}
