//! Notification sinks available to the daemon.

use async_trait::async_trait;
use nudge_scheduler::{Notification, NotificationSink, NotifyError};
use tracing::info;

/// Writes each notification to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl NotificationSink for LogNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        info!(
            tag = %notification.tag,
            title = %notification.title,
            "{}",
            notification.body
        );
        Ok(())
    }
}

/// POSTs each notification as JSON `{title, body, tag}` to a URL.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    url: String,
    http: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl NotificationSink for WebhookNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        let response = self
            .http
            .post(&self.url)
            .json(notification)
            .send()
            .await
            .map_err(|e| NotifyError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(NotifyError::Delivery(format!(
                "webhook returned {}: {}",
                status, text
            )));
        }

        Ok(())
    }
}
