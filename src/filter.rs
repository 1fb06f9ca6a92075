//! The eligibility pipeline.
//!
//! A trigger match is necessary but not sufficient: the
//! [`EligibilityFilter`] decides whether a matched message should
//! actually notify the trigger's owner. Checks run in order and
//! short-circuit on the first failure; the membership lookups at the
//! end are the only suspension points.
//!
//! Expected negative outcomes, including a failed membership lookup,
//! are normal `false` results and never raise.

use crate::gateway::{ChatGateway, GatewayError};
use crate::message::{ChannelKind, ChatMessage, UserId};
use crate::settings::UserSettings;
use std::sync::Arc;
use tracing::{debug, warn};

/// Decides whether a matched `(owner, message)` pair may notify.
pub struct EligibilityFilter {
    gateway: Arc<dyn ChatGateway>,
}

impl EligibilityFilter {
    /// Create a filter over the given gateway.
    pub fn new(gateway: Arc<dyn ChatGateway>) -> Self {
        Self { gateway }
    }

    /// Run the full pipeline. `settings` is the owner's settings
    /// snapshot taken when the match was found.
    pub async fn check(
        &self,
        owner: UserId,
        message: &ChatMessage,
        settings: &UserSettings,
    ) -> bool {
        // Direct messages never highlight
        let Some(guild_id) = message.guild_id else {
            return false;
        };

        // Never notify a user about their own messages, or about bots
        if message.author_id == owner || message.bot {
            return false;
        }

        if !settings.receive_highlights {
            return false;
        }

        if settings.blocks(message) {
            return false;
        }

        // A mention already pings the owner; don't double-notify
        if message.mentions_user(owner) {
            return false;
        }

        // The owner must still resolve as a guild member
        match self.gateway.fetch_member(guild_id, owner).await {
            Ok(()) => {}
            Err(GatewayError::NotFound) => {
                debug!(owner = %owner, guild = %guild_id, "Owner no longer a guild member");
                return false;
            }
            Err(e) => {
                warn!(owner = %owner, guild = %guild_id, error = %e, "Member lookup failed, failing closed");
                return false;
            }
        }

        // Private threads never highlight; otherwise the owner must be
        // able to read the (parent, for threads) channel
        if let ChannelKind::Thread { private: true, .. } = message.channel_kind {
            return false;
        }

        match self
            .gateway
            .channel_members(message.membership_channel())
            .await
        {
            Ok(members) => members.contains(&owner),
            Err(e) => {
                warn!(owner = %owner, channel = %message.channel_id, error = %e, "Channel member lookup failed, failing closed");
                false
            }
        }
    }
}
