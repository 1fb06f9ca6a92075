//! Delivery channels for rendered notifications.
//!
//! The [`Delivery`] trait is the transport seam: the dispatcher hands
//! it a finished [`Notification`] and does not care how it reaches the
//! recipient. Failures are non-fatal to the dispatcher; they are logged
//! and the tick moves on to the next entry.
//!
//! ## Built-in channels
//!
//! - [`LogDelivery`]: structured-log sink, useful in development
//! - [`WebhookDelivery`]: HTTP POST with timeout and bounded retry
//!
//! ## Implementing a custom channel
//!
//! ```rust,ignore
//! use earshot::delivery::{Delivery, DeliveryReceipt, DeliveryError};
//! use earshot::context::Notification;
//! use async_trait::async_trait;
//!
//! struct DirectMessageDelivery { /* platform client */ }
//!
//! #[async_trait]
//! impl Delivery for DirectMessageDelivery {
//!     fn name(&self) -> &str {
//!         "dm"
//!     }
//!
//!     async fn send(&self, n: &Notification) -> Result<DeliveryReceipt, DeliveryError> {
//!         // open a DM with n.recipient, send n.lead_line + n.body
//!         Ok(DeliveryReceipt::success("dm", "sent"))
//!     }
//! }
//! ```

pub mod log;
pub mod webhook;

use crate::context::Notification;
use async_trait::async_trait;
use thiserror::Error;

pub use log::LogDelivery;
pub use webhook::WebhookDelivery;

/// Errors that can occur while delivering a notification.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The transport did not answer in time
    #[error("delivery timed out after {0}ms")]
    Timeout(u64),

    /// HTTP request failed (webhook delivery)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The transport answered but refused the notification
    #[error("delivery rejected with status {0}")]
    Rejected(u16),

    /// Generic delivery failure
    #[error("delivery failed: {0}")]
    Failed(String),
}

/// Result of a successful delivery.
#[derive(Debug, Clone)]
pub struct DeliveryReceipt {
    /// Name of the channel that delivered
    pub channel: String,
    /// Human-readable description of what happened
    pub detail: String,
}

impl DeliveryReceipt {
    /// Create a receipt for a completed delivery.
    pub fn success(channel: &str, detail: impl Into<String>) -> Self {
        Self {
            channel: channel.to_string(),
            detail: detail.into(),
        }
    }
}

/// A transport capable of handing a notification to its recipient.
///
/// Implementations must be `Send + Sync`; the dispatcher shares one
/// behind an `Arc`.
#[async_trait]
pub trait Delivery: Send + Sync {
    /// Unique channel name (e.g. "log", "webhook", "dm").
    fn name(&self) -> &str;

    /// Deliver one notification to its recipient.
    async fn send(&self, notification: &Notification) -> Result<DeliveryReceipt, DeliveryError>;
}
