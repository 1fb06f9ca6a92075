//! The drain-format-deliver pass.
//!
//! Every tick, the engine swaps the notification queue for an empty one
//! and hands the snapshot to the [`Dispatcher`], which renders each
//! pending entry through the [`ContextFormatter`] and pushes it out the
//! [`Delivery`] channel.
//!
//! Failures are isolated per entry: a recipient that cannot be rendered
//! or reached is logged and skipped, and the rest of the batch still
//! goes out. Delivery is at-most-once; entries queued at shutdown are
//! discarded.

use crate::context::ContextFormatter;
use crate::delivery::Delivery;
use crate::gateway::ChatGateway;
use crate::queue::PendingNotification;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of one dispatch pass, for logging and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Notifications handed to the delivery channel
    pub delivered: usize,
    /// Entries skipped after a render or delivery failure
    pub failed: usize,
}

/// Renders and delivers drained queue snapshots.
pub struct Dispatcher {
    formatter: ContextFormatter,
    delivery: Arc<dyn Delivery>,
}

impl Dispatcher {
    /// Create a dispatcher over the given gateway and delivery channel.
    pub fn new(gateway: Arc<dyn ChatGateway>, delivery: Arc<dyn Delivery>) -> Self {
        Self {
            formatter: ContextFormatter::new(gateway),
            delivery,
        }
    }

    /// Create a dispatcher with explicit transcript limits.
    pub fn with_limits(
        gateway: Arc<dyn ChatGateway>,
        delivery: Arc<dyn Delivery>,
        window: usize,
        budget: usize,
    ) -> Self {
        Self {
            formatter: ContextFormatter::with_limits(gateway, window, budget),
            delivery,
        }
    }

    /// Deliver one drained snapshot, entry by entry.
    pub async fn dispatch(&self, batch: Vec<PendingNotification>) -> DispatchStats {
        let mut stats = DispatchStats::default();
        if batch.is_empty() {
            return stats;
        }

        debug!(entries = batch.len(), "Dispatching queued highlights");

        for pending in batch {
            let owner = pending.trigger.owner_id;

            let notification = match self.formatter.render(&pending).await {
                Ok(n) => n,
                Err(e) => {
                    warn!(
                        owner = %owner,
                        channel = %pending.primary.channel_id,
                        error = %e,
                        "Failed to render notification context, skipping entry"
                    );
                    stats.failed += 1;
                    continue;
                }
            };

            match self.delivery.send(&notification).await {
                Ok(receipt) => {
                    debug!(
                        owner = %owner,
                        channel = %receipt.channel,
                        notification_id = %notification.id,
                        "Notification delivered"
                    );
                    stats.delivered += 1;
                }
                Err(e) => {
                    warn!(
                        owner = %owner,
                        notification_id = %notification.id,
                        error = %e,
                        "Notification delivery failed, skipping entry"
                    );
                    stats.failed += 1;
                }
            }
        }

        info!(
            delivered = stats.delivered,
            failed = stats.failed,
            "Dispatch pass complete"
        );
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::mock::RecordingDelivery;
    use crate::gateway::mock::MockGateway;
    use crate::message::ChatMessage;
    use crate::queue::NotificationQueue;
    use crate::trigger::Trigger;

    fn pending(owner: u64, channel: u64, msg_id: u64) -> PendingNotification {
        PendingNotification {
            trigger: Arc::new(Trigger::new(owner, "rust").unwrap()),
            primary: ChatMessage::new(msg_id, 99, "poster", channel, "rust!")
                .with_guild(3, "g")
                .with_channel_name("general"),
            later: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_dispatch_delivers_each_entry() {
        let delivery = Arc::new(RecordingDelivery::new());
        let dispatcher = Dispatcher::new(Arc::new(MockGateway::new()), delivery.clone());

        let stats = dispatcher
            .dispatch(vec![pending(1, 7, 10), pending(2, 7, 10), pending(1, 8, 20)])
            .await;

        assert_eq!(stats, DispatchStats { delivered: 3, failed: 0 });
        assert_eq!(delivery.sent_count(), 3);
    }

    #[tokio::test]
    async fn test_one_failed_delivery_does_not_abort_the_tick() {
        let delivery = Arc::new(RecordingDelivery::new());
        delivery.fail_for(1);
        let dispatcher = Dispatcher::new(Arc::new(MockGateway::new()), delivery.clone());

        let stats = dispatcher
            .dispatch(vec![pending(1, 7, 10), pending(2, 7, 10), pending(3, 7, 10)])
            .await;

        assert_eq!(stats, DispatchStats { delivered: 2, failed: 1 });
        let sent = delivery.sent.lock().unwrap();
        assert!(sent.iter().all(|n| n.recipient != 1));
    }

    #[tokio::test]
    async fn test_empty_batch_is_a_noop() {
        let delivery = Arc::new(RecordingDelivery::new());
        let dispatcher = Dispatcher::new(Arc::new(MockGateway::new()), delivery.clone());

        let queue = &mut NotificationQueue::new();
        let stats = dispatcher.dispatch(queue.drain()).await;

        assert_eq!(stats, DispatchStats::default());
        assert_eq!(delivery.sent_count(), 0);
    }
}
