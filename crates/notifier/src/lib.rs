use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A notification to be delivered to a single recipient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl Notification {
    pub fn new(
        recipient: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            recipient: recipient.into(),
            subject: subject.into(),
            body: body.into(),
            timestamp: chrono::Utc::now(),
        }
    }
}

/// Trait for notification delivery channels.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), NotifierError>;
    fn name(&self) -> &str;
}

/// Errors from notification channels. Never surfaced past the dispatcher;
/// the dispatcher logs them and moves on.
#[derive(Debug, thiserror::Error)]
pub enum NotifierError {
    #[error("webhook error: {0}")]
    Webhook(String),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Configuration for the notifier, read from environment variables.
#[derive(Debug, Clone, Default)]
pub struct NotifierConfig {
    pub webhook_url: Option<String>,
}

impl NotifierConfig {
    pub fn from_env() -> Self {
        Self {
            webhook_url: std::env::var("NOTIFICATION_WEBHOOK_URL")
                .ok()
                .filter(|s| !s.is_empty()),
        }
    }
}

/// Dispatches notifications to all configured channels.
///
/// `dispatch` is fire-and-forget: delivery runs on a detached task and
/// neither completion nor failure is visible to the caller. There is no
/// delivery guarantee.
#[derive(Clone)]
pub struct NotifierService {
    channels: Arc<Vec<Box<dyn NotificationChannel>>>,
}

impl NotifierService {
    pub fn new(config: &NotifierConfig) -> Self {
        let mut channels: Vec<Box<dyn NotificationChannel>> = Vec::new();

        if let Some(ref url) = config.webhook_url {
            channels.push(Box::new(WebhookChannel {
                url: url.clone(),
                client: reqwest::Client::new(),
            }));
            tracing::info!("webhook notifications enabled");
        }

        if channels.is_empty() {
            tracing::info!("no notification channels configured (set NOTIFICATION_WEBHOOK_URL)");
        }

        Self {
            channels: Arc::new(channels),
        }
    }

    /// A dispatcher with no channels; every dispatch is a silent no-op.
    pub fn disabled() -> Self {
        Self {
            channels: Arc::new(Vec::new()),
        }
    }

    /// Build from explicit channels.
    pub fn from_channels(channels: Vec<Box<dyn NotificationChannel>>) -> Self {
        Self {
            channels: Arc::new(channels),
        }
    }

    /// Send to all channels on a detached task and return immediately.
    pub fn dispatch(&self, notification: Notification) {
        let channels = self.channels.clone();
        tokio::spawn(async move {
            deliver(&channels, &notification).await;
        });
    }

    /// Send to all channels, awaiting completion. Failures are still only
    /// logged.
    pub async fn dispatch_sync(&self, notification: &Notification) {
        deliver(&self.channels, notification).await;
    }
}

async fn deliver(channels: &[Box<dyn NotificationChannel>], notification: &Notification) {
    for channel in channels {
        match channel.send(notification).await {
            Ok(()) => tracing::debug!(
                channel = channel.name(),
                recipient = %notification.recipient,
                "notification sent"
            ),
            Err(e) => tracing::warn!(
                channel = channel.name(),
                "failed to send notification: {}",
                e
            ),
        }
    }
}

/// Posts notifications as JSON to a configured webhook URL.
struct WebhookChannel {
    url: String,
    client: reqwest::Client,
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    async fn send(&self, notification: &Notification) -> Result<(), NotifierError> {
        let payload = serde_json::json!({
            "recipient": notification.recipient,
            "subject": notification.subject,
            "body": notification.body,
            "timestamp": notification.timestamp.to_rfc3339(),
        });

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotifierError::Webhook(e.to_string()))?;

        if !response.status().is_success() {
            return Err(NotifierError::Webhook(format!(
                "webhook returned {}",
                response.status()
            )));
        }

        Ok(())
    }

    fn name(&self) -> &str {
        "webhook"
    }
}
