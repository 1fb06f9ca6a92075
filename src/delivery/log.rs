//! Log delivery - structured logging of notifications.
//!
//! [`LogDelivery`] writes notifications to the `tracing` log instead of
//! a real transport. Useful for development, auditing what the engine
//! would send, and as a placeholder channel in tests.

use super::{Delivery, DeliveryError, DeliveryReceipt};
use crate::context::Notification;
use async_trait::async_trait;
use tracing::info;

/// A delivery channel that logs notifications instead of sending them.
#[derive(Debug, Clone)]
pub struct LogDelivery {
    /// Prefix for log lines, to distinguish multiple log channels
    prefix: String,
}

impl LogDelivery {
    /// Create a log channel with the default prefix.
    pub fn new() -> Self {
        Self {
            prefix: "highlight".to_string(),
        }
    }

    /// Create a log channel with a custom prefix.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Default for LogDelivery {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Delivery for LogDelivery {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, notification: &Notification) -> Result<DeliveryReceipt, DeliveryError> {
        info!(
            prefix = %self.prefix,
            notification_id = %notification.id,
            recipient = %notification.recipient,
            title = %notification.title,
            "[{}] {}",
            self.prefix,
            notification.lead_line
        );

        Ok(DeliveryReceipt::success(
            self.name(),
            format!(
                "Logged notification {} for {}",
                notification.id, notification.recipient
            ),
        ))
    }
}
