//! Core message types for earshot.
//!
//! The [`ChatMessage`] struct is the engine's view of one inbound chat
//! message. Hosts adapt their platform's message object into this shape
//! before feeding it to the engine; nothing here talks to a chat
//! platform directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user account identifier.
pub type UserId = u64;
/// A guild (server) identifier.
pub type GuildId = u64;
/// A channel identifier.
pub type ChannelId = u64;
/// A message identifier.
pub type MessageId = u64;

/// Where a message was posted, beyond the channel id itself.
///
/// Threads carry their parent channel because membership checks are
/// resolved against the parent's member list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChannelKind {
    /// An ordinary guild channel.
    Normal,
    /// A thread hanging off a parent channel.
    Thread {
        /// Parent channel id
        parent: ChannelId,
        /// Private threads never produce highlights
        private: bool,
    },
}

/// One inbound chat message, as seen by the engine.
///
/// # Fields
///
/// - `id` / `author_id` / `channel_id`: platform identifiers
/// - `guild_id`: absent for direct messages (which never highlight)
/// - `content`: raw message text, scanned against trigger phrases
/// - `attachments` / `embeds` / `stickers`: counts only; non-text
///   content is rendered as placeholders in notification transcripts
/// - `mentions`: users directly pinged by this message
/// - `link`: a host-supplied permalink, used to link trigger lines in
///   the notification transcript when present
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatMessage {
    /// Message id
    pub id: MessageId,

    /// Author's user id
    #[serde(rename = "authorId")]
    pub author_id: UserId,

    /// Author's display name
    #[serde(rename = "authorName")]
    pub author_name: String,

    /// Whether the author is an automated account
    #[serde(default)]
    pub bot: bool,

    /// Guild id, absent for direct messages
    #[serde(rename = "guildId", skip_serializing_if = "Option::is_none")]
    pub guild_id: Option<GuildId>,

    /// Guild display name, used in notification headers
    #[serde(rename = "guildName", skip_serializing_if = "Option::is_none")]
    pub guild_name: Option<String>,

    /// Channel id
    #[serde(rename = "channelId")]
    pub channel_id: ChannelId,

    /// Channel display name, used in notification headers
    #[serde(rename = "channelName")]
    pub channel_name: String,

    /// Channel taxonomy (normal channel or thread)
    #[serde(rename = "channelKind", default = "default_channel_kind")]
    pub channel_kind: ChannelKind,

    /// Raw message text
    pub content: String,

    /// Number of attachments
    #[serde(default)]
    pub attachments: u32,

    /// Number of embeds
    #[serde(default)]
    pub embeds: u32,

    /// Number of stickers
    #[serde(default)]
    pub stickers: u32,

    /// Users directly mentioned by this message
    #[serde(default)]
    pub mentions: Vec<UserId>,

    /// Permalink to the message, when the host can provide one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,

    /// When the message was created
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

fn default_channel_kind() -> ChannelKind {
    ChannelKind::Normal
}

impl ChatMessage {
    /// Create a message with the required fields; everything else
    /// starts empty and can be layered on with the `with_*` builders.
    pub fn new(
        id: MessageId,
        author_id: UserId,
        author_name: impl Into<String>,
        channel_id: ChannelId,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id,
            author_id,
            author_name: author_name.into(),
            bot: false,
            guild_id: None,
            guild_name: None,
            channel_id,
            channel_name: String::new(),
            channel_kind: ChannelKind::Normal,
            content: content.into(),
            attachments: 0,
            embeds: 0,
            stickers: 0,
            mentions: Vec::new(),
            link: None,
            created_at: Utc::now(),
        }
    }

    /// Set the guild this message belongs to
    pub fn with_guild(mut self, id: GuildId, name: impl Into<String>) -> Self {
        self.guild_id = Some(id);
        self.guild_name = Some(name.into());
        self
    }

    /// Set the channel display name
    pub fn with_channel_name(mut self, name: impl Into<String>) -> Self {
        self.channel_name = name.into();
        self
    }

    /// Set the channel taxonomy
    pub fn with_channel_kind(mut self, kind: ChannelKind) -> Self {
        self.channel_kind = kind;
        self
    }

    /// Mark the author as a bot account
    pub fn with_bot(mut self) -> Self {
        self.bot = true;
        self
    }

    /// Set the mentioned users
    pub fn with_mentions(mut self, mentions: Vec<UserId>) -> Self {
        self.mentions = mentions;
        self
    }

    /// Set non-text content counts
    pub fn with_extras(mut self, attachments: u32, embeds: u32, stickers: u32) -> Self {
        self.attachments = attachments;
        self.embeds = embeds;
        self.stickers = stickers;
        self
    }

    /// Set the permalink
    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    /// Set the creation timestamp
    pub fn with_created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = at;
        self
    }

    /// True when this message was sent outside any guild.
    pub fn is_direct(&self) -> bool {
        self.guild_id.is_none()
    }

    /// True when this message directly mentions the given user.
    pub fn mentions_user(&self, user: UserId) -> bool {
        self.mentions.contains(&user)
    }

    /// The channel whose member list governs visibility: the channel
    /// itself, or the parent for threads.
    pub fn membership_channel(&self) -> ChannelId {
        match self.channel_kind {
            ChannelKind::Normal => self.channel_id,
            ChannelKind::Thread { parent, .. } => parent,
        }
    }

    /// "Guild/#channel" location string for notification headers.
    pub fn location(&self) -> String {
        format!(
            "{}/#{}",
            self.guild_name.as_deref().unwrap_or("unknown"),
            self.channel_name
        )
    }
}
