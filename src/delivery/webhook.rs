//! Webhook delivery - HTTP POST to an external endpoint.
//!
//! [`WebhookDelivery`] posts notifications as JSON to a configured URL,
//! for hosts that relay highlights through an external service. Server
//! errors are retried a bounded number of times; client errors are
//! final.

use super::{Delivery, DeliveryError, DeliveryReceipt};
use crate::context::Notification;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default timeout for webhook requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default number of retries on 5xx responses.
const DEFAULT_RETRIES: u32 = 2;

/// A delivery channel that POSTs notifications to a webhook URL.
#[derive(Debug, Clone)]
pub struct WebhookDelivery {
    url: String,
    /// Reused for connection pooling
    client: Client,
    timeout: Duration,
    retries: u32,
}

impl WebhookDelivery {
    /// Create a webhook channel targeting the given URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: Client::new(),
            timeout: DEFAULT_TIMEOUT,
            retries: DEFAULT_RETRIES,
        }
    }

    /// Set a custom request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the number of retries on 5xx responses.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    fn build_payload(&self, notification: &Notification) -> serde_json::Value {
        json!({
            "id": notification.id,
            "recipient": notification.recipient,
            "title": notification.title,
            "body": notification.body,
            "leadLine": notification.lead_line,
            "timestamp": notification.timestamp,
        })
    }

    /// POST with bounded retry on server errors.
    async fn send_request(&self, notification: &Notification) -> Result<u16, DeliveryError> {
        let payload = self.build_payload(notification);

        let mut last_error = None;
        let mut attempts = 0;

        while attempts <= self.retries {
            if attempts > 0 {
                debug!(
                    attempt = attempts,
                    max_retries = self.retries,
                    "Retrying webhook delivery"
                );
            }

            let result = self
                .client
                .post(&self.url)
                .timeout(self.timeout)
                .json(&payload)
                .send()
                .await;

            match result {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return Ok(status.as_u16());
                    }

                    // Client errors are final: retrying cannot help
                    if status.is_client_error() {
                        warn!(
                            status = %status,
                            url = %self.url,
                            "Webhook rejected notification"
                        );
                        return Err(DeliveryError::Rejected(status.as_u16()));
                    }

                    warn!(
                        status = %status,
                        url = %self.url,
                        attempt = attempts,
                        "Webhook returned server error, will retry"
                    );
                    last_error = Some(DeliveryError::Rejected(status.as_u16()));
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        url = %self.url,
                        attempt = attempts,
                        "Webhook request failed"
                    );
                    last_error = Some(DeliveryError::Http(e));
                }
            }

            attempts += 1;
        }

        Err(last_error
            .unwrap_or_else(|| DeliveryError::Failed("webhook gave no response".into())))
    }
}

#[async_trait]
impl Delivery for WebhookDelivery {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn send(&self, notification: &Notification) -> Result<DeliveryReceipt, DeliveryError> {
        debug!(
            url = %self.url,
            notification_id = %notification.id,
            recipient = %notification.recipient,
            "Sending notification webhook"
        );

        let status = self.send_request(notification).await?;

        info!(
            url = %self.url,
            status = status,
            notification_id = %notification.id,
            "Notification delivered"
        );

        Ok(DeliveryReceipt::success(
            self.name(),
            format!("Delivered to {} ({status})", self.url),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_webhook_builder() {
        let channel = WebhookDelivery::new("https://example.com/hook")
            .with_timeout(Duration::from_secs(3))
            .with_retries(5);

        assert_eq!(channel.url, "https://example.com/hook");
        assert_eq!(channel.timeout, Duration::from_secs(3));
        assert_eq!(channel.retries, 5);
    }

    #[test]
    fn test_payload_shape() {
        use chrono::Utc;
        use uuid::Uuid;

        let channel = WebhookDelivery::new("https://example.com/hook");
        let notification = Notification {
            id: Uuid::new_v4(),
            recipient: 42,
            title: "In rustaceans/#general".to_string(),
            body: "transcript".to_string(),
            lead_line: "ada: rust!".to_string(),
            timestamp: Utc::now(),
        };

        let payload = channel.build_payload(&notification);
        assert_eq!(payload["recipient"], 42);
        assert_eq!(payload["leadLine"], "ada: rust!");
        assert!(payload["timestamp"].is_string());
    }
}
