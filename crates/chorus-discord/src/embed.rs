//! [`EmbedReplySink`] implementation driving the embed-based streaming path
//! used by persistent chatbot-mode responses (§4.9). Unlike the plain-text
//! sink, there is exactly one message: every tick re-edits its embed in place.

use std::sync::Arc;

use async_trait::async_trait;
use chorus_core::Snowflake;
use chorus_stream::{EmbedReplySink, SinkError};
use serenity::builder::{CreateEmbed, EditMessage};
use serenity::http::Http;
use serenity::model::colour::Colour;
use serenity::model::id::{ChannelId, MessageId};

const DESCRIPTION_LIMIT: usize = 4096;
const FIELD_VALUE_LIMIT: usize = 1024;

fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(limit.saturating_sub(1)).collect();
    truncated.push('\u{2026}');
    truncated
}

pub struct DiscordEmbedSink {
    http: Arc<Http>,
    channel_id: ChannelId,
    message_id: MessageId,
}

impl DiscordEmbedSink {
    pub fn new(http: Arc<Http>, channel_id: Snowflake, message_id: Snowflake) -> Self {
        Self {
            http,
            channel_id: ChannelId::new(channel_id),
            message_id: MessageId::new(message_id),
        }
    }

    async fn apply(&self, embed: CreateEmbed) -> Result<(), SinkError> {
        self.channel_id
            .edit_message(&self.http, self.message_id, EditMessage::new().embed(embed))
            .await
            .map(|_| ())
            .map_err(|e| SinkError::Platform(e.to_string()))
    }
}

#[async_trait]
impl EmbedReplySink for DiscordEmbedSink {
    async fn update(&self, text: &str, thinking: Option<&str>) -> Result<(), SinkError> {
        let mut embed = CreateEmbed::new()
            .description(truncate(text, DESCRIPTION_LIMIT))
            .colour(Colour::BLURPLE);
        if let Some(reasoning) = thinking {
            if !reasoning.trim().is_empty() {
                embed = embed.field("Thinking", truncate(reasoning, FIELD_VALUE_LIMIT), false);
            }
        }
        self.apply(embed).await
    }

    async fn update_status(&self, status_line: &str) -> Result<(), SinkError> {
        let embed = CreateEmbed::new().description(truncate(status_line, DESCRIPTION_LIMIT)).colour(Colour::LIGHT_GREY);
        self.apply(embed).await
    }

    async fn update_error(&self, message: &str) -> Result<(), SinkError> {
        let embed = CreateEmbed::new()
            .description(format!("Error: {}", truncate(message, DESCRIPTION_LIMIT - 7)))
            .colour(Colour::RED);
        self.apply(embed).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_leaves_short_text_untouched() {
        assert_eq!(truncate("hello", 10), "hello");
    }

    #[test]
    fn truncate_cuts_long_text_with_ellipsis() {
        let long = "a".repeat(20);
        let truncated = truncate(&long, 10);
        assert_eq!(truncated.chars().count(), 10);
        assert!(truncated.ends_with('\u{2026}'));
    }
}
