//! Chunked plain-message sending, and the [`PlainReplySink`] used by
//! [`chorus_inline::InlineResponseEngine`]'s non-embed streaming path (§4.9).

use std::sync::Arc;

use async_trait::async_trait;
use chorus_core::Snowflake;
use chorus_stream::{PlainReplySink, SinkError};
use serenity::builder::{CreateMessage, EditMessage};
use serenity::http::Http;
use serenity::model::id::{ChannelId, MessageId};
use tokio::sync::Mutex;

/// Maximum characters per Discord message (2000 is the hard limit; 1950
/// leaves headroom for the chunker's own boundary adjustments upstream).
const CHUNK_MAX: usize = 1950;

/// Split `text` into chunks of at most [`CHUNK_MAX`] characters, preferring
/// splits on whitespace/newline boundaries over cutting a word mid-way.
pub fn split_chunks(text: &str) -> Vec<String> {
    if text.len() <= CHUNK_MAX {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while remaining.len() > CHUNK_MAX {
        let window = &remaining[..CHUNK_MAX];
        let split_at = window.rfind('\n').or_else(|| window.rfind(' ')).unwrap_or(CHUNK_MAX);

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    if !remaining.is_empty() {
        chunks.push(remaining.to_string());
    }

    chunks
}

/// Send `text` to `channel_id` in ≤1950-char chunks. The first chunk replies
/// to `reply_to` when given; remaining chunks are plain sends (Discord has no
/// concept of a multi-message reply chain).
pub async fn send_chunked(
    http: &Http,
    channel_id: ChannelId,
    text: &str,
    reply_to: Option<MessageId>,
) -> Result<(), serenity::Error> {
    for (i, chunk) in split_chunks(text).into_iter().enumerate() {
        let mut builder = CreateMessage::new().content(chunk);
        if i == 0 {
            if let Some(reply_id) = reply_to {
                builder = builder.reference_message((channel_id, reply_id));
            }
        }
        channel_id.send_message(http, builder).await?;
    }
    Ok(())
}

/// Drives a growing chain of plain Discord messages for one inline-response
/// trigger: index 0 is the "Thinking..." placeholder, later indices are
/// appended by [`Self::send_new`] as the reply outgrows a single message.
pub struct DiscordPlainSink {
    http: Arc<Http>,
    channel_id: ChannelId,
    messages: Mutex<Vec<MessageId>>,
}

impl DiscordPlainSink {
    pub fn new(http: Arc<Http>, channel_id: Snowflake, placeholder_id: Snowflake) -> Self {
        Self {
            http,
            channel_id: ChannelId::new(channel_id),
            messages: Mutex::new(vec![MessageId::new(placeholder_id)]),
        }
    }
}

#[async_trait]
impl PlainReplySink for DiscordPlainSink {
    async fn edit(&self, index: usize, text: &str) -> Result<(), SinkError> {
        let id = {
            let messages = self.messages.lock().await;
            *messages
                .get(index)
                .ok_or_else(|| SinkError::Platform(format!("no tracked message at index {index}")))?
        };
        self.channel_id
            .edit_message(&self.http, id, EditMessage::new().content(text))
            .await
            .map(|_| ())
            .map_err(|e| SinkError::Platform(e.to_string()))
    }

    async fn send_new(&self, text: &str) -> Result<(), SinkError> {
        let sent = self
            .channel_id
            .send_message(&self.http, CreateMessage::new().content(text))
            .await
            .map_err(|e| SinkError::Platform(e.to_string()))?;
        self.messages.lock().await.push(sent.id);
        Ok(())
    }

    async fn delete_from(&self, from: usize) -> Result<(), SinkError> {
        let mut messages = self.messages.lock().await;
        if from >= messages.len() {
            return Ok(());
        }
        for id in messages.split_off(from) {
            let _ = self.channel_id.delete_message(&self.http, id).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_single_chunk() {
        let chunks = split_chunks("Hello, world!");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], "Hello, world!");
    }

    #[test]
    fn long_text_splits_on_newline() {
        let line = "a".repeat(1000);
        let text = format!("{}\n{}", line, line);
        let chunks = split_chunks(&text);
        assert_eq!(chunks.len(), 2);
        for c in &chunks {
            assert!(c.len() <= CHUNK_MAX, "chunk too large: {}", c.len());
        }
    }

    #[test]
    fn very_long_word_still_splits() {
        let text = "x".repeat(4000);
        let chunks = split_chunks(&text);
        assert!(chunks.len() >= 2);
        for c in &chunks {
            assert!(c.len() <= CHUNK_MAX);
        }
    }
}
