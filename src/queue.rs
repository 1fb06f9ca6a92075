//! Notification aggregation between dispatch ticks.
//!
//! Matches that survive the eligibility pipeline are merged here, keyed
//! by (channel, owner). The first match in a flush window becomes the
//! primary message; later matches for the same pair fold into the same
//! pending notification rather than producing separate ones.
//!
//! [`NotificationQueue::drain`] swaps the whole buffer in one
//! non-suspending step, so matches arriving during a dispatch pass land
//! in the next tick's queue instead of being lost.

use crate::message::{ChannelId, ChatMessage, UserId};
use crate::trigger::Trigger;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// One owner's pending notification for one channel.
#[derive(Debug, Clone)]
pub struct PendingNotification {
    /// The trigger that fired first
    pub trigger: Arc<Trigger>,
    /// The first matching message of the flush window
    pub primary: ChatMessage,
    /// Further matching messages folded in before the flush,
    /// deduplicated by message id
    pub later: Vec<ChatMessage>,
}

impl PendingNotification {
    /// Ids of every message that triggered this notification.
    pub fn trigger_message_ids(&self) -> Vec<u64> {
        let mut ids = Vec::with_capacity(1 + self.later.len());
        ids.push(self.primary.id);
        ids.extend(self.later.iter().map(|m| m.id));
        ids
    }
}

/// Per-channel, per-owner aggregation buffer.
#[derive(Debug, Default)]
pub struct NotificationQueue {
    by_channel: HashMap<ChannelId, HashMap<UserId, PendingNotification>>,
}

impl NotificationQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a surviving match into the queue.
    ///
    /// The first match for an (owner, channel) pair becomes the
    /// primary; subsequent matches fold into `later`. The merge is
    /// commutative with respect to later messages, so interleaved
    /// eligibility verdicts cannot corrupt an entry.
    pub fn upsert(&mut self, trigger: Arc<Trigger>, message: ChatMessage) {
        let owner = trigger.owner_id;
        let channel_queue = self.by_channel.entry(message.channel_id).or_default();

        match channel_queue.get_mut(&owner) {
            None => {
                debug!(owner = %owner, channel = %message.channel_id, "Queued primary highlight");
                channel_queue.insert(
                    owner,
                    PendingNotification {
                        trigger,
                        primary: message,
                        later: Vec::new(),
                    },
                );
            }
            Some(pending) => {
                if pending.primary.id != message.id
                    && !pending.later.iter().any(|m| m.id == message.id)
                {
                    debug!(owner = %owner, channel = %message.channel_id, "Folded later highlight");
                    pending.later.push(message);
                }
            }
        }
    }

    /// Number of pending notifications across all channels.
    pub fn len(&self) -> usize {
        self.by_channel.values().map(HashMap::len).sum()
    }

    /// True when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.by_channel.values().all(HashMap::is_empty)
    }

    /// Take the whole buffer, leaving an empty queue behind.
    ///
    /// A single non-suspending swap: anything upserted after this call
    /// belongs to the next flush window.
    pub fn drain(&mut self) -> Vec<PendingNotification> {
        let snapshot = std::mem::take(&mut self.by_channel);
        snapshot
            .into_values()
            .flat_map(HashMap::into_values)
            .collect()
    }
}
