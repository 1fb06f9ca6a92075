//! Notification payloads and the transcript formatter.
//!
//! A delivered highlight is more useful with the surrounding
//! conversation attached. [`ContextFormatter`] fetches a short window
//! of messages around the primary trigger message and renders them as a
//! compact transcript, marking the lines that actually triggered.
//!
//! Non-text content never reaches the transcript raw: custom emoji
//! codes collapse to a placeholder glyph and attachments, embeds, and
//! stickers become bracketed counts, keeping the body inside its size
//! budget.

use crate::gateway::{ChatGateway, GatewayError};
use crate::message::{ChatMessage, UserId};
use crate::queue::PendingNotification;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// How many surrounding messages a transcript holds.
pub const DEFAULT_CONTEXT_WINDOW: usize = 6;

/// Transcript and lead-line size budget, in characters.
pub const DEFAULT_CONTENT_BUDGET: usize = 1500;

/// Stand-in for a message whose content would blow the budget.
const OMITTED: &str = "*[Omitted due to length]*";

/// Per-author marker glyphs, picked by author id.
const MARKERS: [&str; 6] = ["🔵", "🟢", "🟡", "🟣", "🔴", "🟠"];

/// A fully rendered notification, ready for a delivery channel.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    /// Correlation id for delivery logging
    pub id: Uuid,
    /// The trigger owner this notification is for
    pub recipient: UserId,
    /// "In {guild}/#{channel}"
    pub title: String,
    /// The rendered transcript
    pub body: String,
    /// "{author}: {content}" of the primary message
    #[serde(rename = "leadLine")]
    pub lead_line: String,
    /// Creation time of the primary message
    pub timestamp: DateTime<Utc>,
}

/// Renders [`PendingNotification`]s into [`Notification`]s.
pub struct ContextFormatter {
    gateway: Arc<dyn ChatGateway>,
    window: usize,
    budget: usize,
    custom_emoji: Regex,
}

impl ContextFormatter {
    /// Create a formatter with the default window and budget.
    pub fn new(gateway: Arc<dyn ChatGateway>) -> Self {
        Self::with_limits(gateway, DEFAULT_CONTEXT_WINDOW, DEFAULT_CONTENT_BUDGET)
    }

    /// Create a formatter with explicit limits.
    pub fn with_limits(gateway: Arc<dyn ChatGateway>, window: usize, budget: usize) -> Self {
        Self {
            gateway,
            window,
            budget,
            custom_emoji: Regex::new(r"<a?:[a-zA-Z0-9_]{2,}:\d+>")
                .expect("custom emoji pattern is valid"),
        }
    }

    /// Render one pending notification.
    ///
    /// Fetches up to `window` messages around the primary; when the
    /// platform returns nothing, the trigger messages themselves form
    /// the transcript.
    pub async fn render(
        &self,
        pending: &PendingNotification,
    ) -> Result<Notification, GatewayError> {
        let primary = &pending.primary;
        let trigger_ids: HashSet<u64> = pending.trigger_message_ids().into_iter().collect();

        let mut window = self
            .gateway
            .history_around(primary.channel_id, primary.id, self.window)
            .await?;
        if window.is_empty() {
            window.push(primary.clone());
            window.extend(pending.later.iter().cloned());
            window.sort_by_key(|m| m.created_at);
        }

        let mut body = String::new();
        let mut used = 0usize;
        for message in &window {
            let mut content = self.clean_content(message);
            if used + content.chars().count() > self.budget {
                content = OMITTED.to_string();
            }

            let line = format_line(message, &content, trigger_ids.contains(&message.id));
            let line_len = line.chars().count() + 1;
            if used + line_len > self.budget {
                debug!(recipient = %pending.trigger.owner_id, "Transcript budget reached, truncating window");
                break;
            }
            body.push_str(&line);
            body.push('\n');
            used += line_len;
        }

        Ok(Notification {
            id: Uuid::new_v4(),
            recipient: pending.trigger.owner_id,
            title: format!("In {}", primary.location()),
            body,
            lead_line: truncate_chars(
                &format!("{}: {}", primary.author_name, primary.content),
                self.budget,
            ),
            timestamp: primary.created_at,
        })
    }

    /// Substitute non-text content with compact placeholders.
    fn clean_content(&self, message: &ChatMessage) -> String {
        let mut content = self
            .custom_emoji
            .replace_all(&message.content, "❔")
            .into_owned();

        if message.attachments > 0 {
            content.push_str(&format!(" *[Attachment x{}]*", message.attachments));
        }
        if message.embeds > 0 {
            content.push_str(&format!(" *[Embed x{}]*", message.embeds));
        }
        if message.stickers > 0 {
            content.push_str(&format!(" *[Sticker x{}]*", message.stickers));
        }
        content
    }
}

/// Render one transcript line, link-wrapping trigger lines when the
/// message carries a permalink.
fn format_line(message: &ChatMessage, content: &str, is_trigger: bool) -> String {
    let marker = MARKERS[(message.author_id % MARKERS.len() as u64) as usize];
    if is_trigger {
        if let Some(link) = message.link.as_deref() {
            return format!("[{marker} **{}**]({link}) {content}", message.author_name);
        }
    }
    format!("{marker} **{}** {content}", message.author_name)
}

fn truncate_chars(text: &str, budget: usize) -> String {
    if text.chars().count() <= budget {
        text.to_string()
    } else {
        text.chars().take(budget).collect()
    }
}
