mod discord;

pub use discord::DiscordWebhookNotifier;

use async_trait::async_trait;
use fx_core::{AlertDirection, NotificationEvent, NotificationSink};

/// Trait for notification channels.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn send(&self, event: &NotificationEvent) -> Result<(), NotificationError>;
    fn name(&self) -> &str;
}

/// Errors from the notification system.
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("Discord webhook error: {0}")]
    Discord(String),
    #[error("Inbox error: {0}")]
    Inbox(String),
}

/// Configuration for the notification service.
#[derive(Debug, Clone, Default)]
pub struct NotificationConfig {
    pub discord_webhook_url: Option<String>,
}

impl NotificationConfig {
    /// Load from environment variables.
    pub fn from_env() -> Self {
        Self {
            discord_webhook_url: std::env::var("DISCORD_WEBHOOK_URL")
                .ok()
                .filter(|s| !s.is_empty()),
        }
    }
}

/// Title and body shared by the text-based channels.
pub fn render_event(event: &NotificationEvent) -> (String, String) {
    let title = format!("{} Rate Alert Triggered", event.currency_pair);
    let verb = match event.direction {
        AlertDirection::Above => "risen above",
        AlertDirection::Below => "fallen below",
    };
    let message = format!(
        "The {} rate has {} your threshold of {:.4}. Current rate: {:.4} ({:.2}% from threshold).",
        event.currency_pair,
        verb,
        event.threshold,
        event.current_rate,
        event.percent_from_threshold()
    );
    (title, message)
}

/// Dispatches triggered-alert events to every configured channel.
pub struct NotificationService {
    channels: Vec<Box<dyn NotificationChannel>>,
}

impl NotificationService {
    pub fn new(config: &NotificationConfig) -> Self {
        let mut service = Self::empty();

        if let Some(ref webhook_url) = config.discord_webhook_url {
            service = service.with_channel(DiscordWebhookNotifier::new(webhook_url.clone()));
            tracing::info!("Discord webhook notifications enabled");
        }

        service
    }

    /// A service with no channels; add them with [`with_channel`](Self::with_channel).
    pub fn empty() -> Self {
        Self {
            channels: Vec::new(),
        }
    }

    pub fn with_channel(mut self, channel: impl NotificationChannel + 'static) -> Self {
        self.channels.push(Box::new(channel));
        self
    }

    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name()).collect()
    }

    /// Send to all channels, awaiting completion. True if any channel accepted it.
    pub async fn send_event(&self, event: &NotificationEvent) -> bool {
        if self.channels.is_empty() {
            tracing::warn!(
                "No notification channels configured, alert {} not delivered",
                event.alert_id
            );
            return false;
        }

        let mut delivered = false;
        for channel in &self.channels {
            match channel.send(event).await {
                Ok(()) => {
                    tracing::debug!("Sent alert {} via {}", event.alert_id, channel.name());
                    delivered = true;
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to send alert {} via {}: {}",
                        event.alert_id,
                        channel.name(),
                        e
                    )
                }
            }
        }
        delivered
    }
}

#[async_trait]
impl NotificationSink for NotificationService {
    async fn notify(&self, event: &NotificationEvent) -> bool {
        self.send_event(event).await
    }
}
