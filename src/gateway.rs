//! The chat-platform seam.
//!
//! [`ChatGateway`] is everything the engine ever asks of the platform:
//! membership lookups for eligibility checks and history fetches for
//! notification context. Hosts implement it over their platform client;
//! the engine only sees this trait.
//!
//! "Not found" is an expected answer, not a fault: the eligibility
//! pipeline treats [`GatewayError::NotFound`] as a normal negative
//! result and never surfaces it.

use crate::message::{ChannelId, ChatMessage, GuildId, MessageId, UserId};
use async_trait::async_trait;
use thiserror::Error;

/// Errors from platform lookups.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The requested entity does not exist or is not visible
    #[error("not found")]
    NotFound,

    /// The platform could not be reached or answered abnormally
    #[error("transport error: {0}")]
    Transport(String),
}

/// Read-only platform operations the engine depends on.
///
/// Implementations must be `Send + Sync`; the engine shares one behind
/// an `Arc` across eligibility tasks and the dispatcher.
#[async_trait]
pub trait ChatGateway: Send + Sync {
    /// Resolve `user` as a member of `guild`.
    ///
    /// Returns [`GatewayError::NotFound`] when the user is not (or is
    /// no longer) a member.
    async fn fetch_member(&self, guild: GuildId, user: UserId) -> Result<(), GatewayError>;

    /// The users able to read `channel`.
    async fn channel_members(&self, channel: ChannelId) -> Result<Vec<UserId>, GatewayError>;

    /// Up to `limit` messages surrounding `around`, oldest first.
    async fn history_around(
        &self,
        channel: ChannelId,
        around: MessageId,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, GatewayError>;
}
