//! Per-owner highlight settings.
//!
//! Settings are owned by the host application's profile system; the
//! engine keeps a copy per owner and is told about changes through
//! [`crate::engine::EngineHandle::update_settings`].

use crate::message::{ChatMessage, UserId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One owner's highlight settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UserSettings {
    /// Master switch; disabled owners never receive highlights
    #[serde(default = "default_receive")]
    pub receive_highlights: bool,

    /// Ids (guild, channel, user, or message) whose messages never
    /// trigger this owner's highlights
    #[serde(default)]
    pub blocklist: HashSet<u64>,

    /// Grace-period length after the owner posts in a channel
    #[serde(rename = "timeoutMinutes", default = "default_timeout")]
    pub timeout_minutes: u64,
}

fn default_receive() -> bool {
    true
}

fn default_timeout() -> u64 {
    5
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            receive_highlights: default_receive(),
            blocklist: HashSet::new(),
            timeout_minutes: default_timeout(),
        }
    }
}

impl UserSettings {
    /// The grace-period length in seconds.
    pub fn timeout_secs(&self) -> u64 {
        self.timeout_minutes * 60
    }

    /// True when any of the message's checkable ids is blocklisted.
    pub fn blocks(&self, message: &ChatMessage) -> bool {
        BlockTargets::of(message).any_in(&self.blocklist)
    }
}

/// The four ids a blocklist entry can match against, extracted once
/// per check. A fixed-shape lookup: no field-name dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockTargets {
    /// The message's own id
    pub message: u64,
    /// Guild id, 0 when absent (never blocklisted)
    pub guild: Option<u64>,
    /// Channel id
    pub channel: u64,
    /// Author's user id
    pub author: u64,
}

impl BlockTargets {
    /// Extract the checkable ids from a message.
    pub fn of(message: &ChatMessage) -> Self {
        Self {
            message: message.id,
            guild: message.guild_id,
            channel: message.channel_id,
            author: message.author_id,
        }
    }

    /// True when any target id is a member of `blocklist`.
    pub fn any_in(&self, blocklist: &HashSet<u64>) -> bool {
        blocklist.contains(&self.message)
            || self.guild.is_some_and(|g| blocklist.contains(&g))
            || blocklist.contains(&self.channel)
            || blocklist.contains(&self.author)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> ChatMessage {
        ChatMessage::new(100, 42, "ada", 7, "hello").with_guild(3, "rustaceans")
    }

    #[test]
    fn test_defaults() {
        let settings = UserSettings::default();
        assert!(settings.receive_highlights);
        assert!(settings.blocklist.is_empty());
        assert_eq!(settings.timeout_secs(), 300);
    }

    #[test]
    fn test_blocklist_matches_each_id_space() {
        for blocked in [100u64, 42, 7, 3] {
            let settings = UserSettings {
                blocklist: HashSet::from([blocked]),
                ..Default::default()
            };
            assert!(settings.blocks(&message()), "id {blocked} should block");
        }

        let settings = UserSettings {
            blocklist: HashSet::from([999u64]),
            ..Default::default()
        };
        assert!(!settings.blocks(&message()));
    }

    #[test]
    fn test_missing_guild_never_matches() {
        let dm = ChatMessage::new(100, 42, "ada", 7, "hello");
        let targets = BlockTargets::of(&dm);
        assert_eq!(targets.guild, None);
        // An absent guild can't collide with any blocklist entry
        assert!(!targets.any_in(&HashSet::from([0u64])));
    }

    #[test]
    fn test_settings_deserialize_defaults() {
        let settings: UserSettings = serde_json::from_str("{}").unwrap();
        assert!(settings.receive_highlights);
        assert_eq!(settings.timeout_minutes, 5);
    }
}
