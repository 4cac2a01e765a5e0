use std::path::PathBuf;
use std::sync::Arc;

use chorus_core::{RawMessage, Result, Snowflake};
use chorus_index::IndexManager;
use chorus_storage::JsonStore;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::config::ChatbotConfigStore;
use crate::extract::extract_context;
use crate::types::ConversationMessage;
use crate::validity::is_valid_context_message;

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Per-channel ordered message history: append, filter, prune, edit, delete
/// (§4.3). Owns its files directly and calls [`IndexManager`] to keep the
/// user index in sync with authored messages — the two stores never reach
/// into each other's files.
pub struct ConversationStore {
    store: Arc<JsonStore>,
    data_root: PathBuf,
    index: Arc<IndexManager>,
}

impl ConversationStore {
    pub fn new(store: Arc<JsonStore>, data_root: impl Into<PathBuf>, index: Arc<IndexManager>) -> Self {
        Self {
            store,
            data_root: data_root.into(),
            index,
        }
    }

    fn path(&self, guild_id: Snowflake, channel_id: Snowflake) -> PathBuf {
        self.data_root
            .join("conversations")
            .join(format!("guild_{guild_id}"))
            .join(format!("channel_{channel_id}.json"))
    }

    async fn read_raw(&self, guild_id: Snowflake, channel_id: Snowflake) -> Result<Vec<ConversationMessage>> {
        let value = self.store.read(&self.path(guild_id, channel_id)).await;
        let messages = value
            .get("messages")
            .cloned()
            .map(serde_json::from_value::<Vec<ConversationMessage>>)
            .transpose()?
            .unwrap_or_default();
        Ok(messages)
    }

    async fn write_raw(&self, guild_id: Snowflake, channel_id: Snowflake, messages: &[ConversationMessage]) -> Result<()> {
        let value = json!({ "messages": messages, "last_updated": now() });
        self.store.write(&self.path(guild_id, channel_id), &value).await
    }

    /// Read the file, drop anything older than `context_window_hours`, then
    /// run the validity gate. Returns chronologically ordered survivors.
    pub async fn load_history(&self, guild_id: Snowflake, channel_id: Snowflake, context_window_hours: u32) -> Result<Vec<ConversationMessage>> {
        let messages = self.read_raw(guild_id, channel_id).await?;
        let cutoff = now() - (context_window_hours as i64) * 3600;
        let mut survivors: Vec<ConversationMessage> = messages
            .into_iter()
            .filter(|m| m.timestamp >= cutoff)
            .filter(is_valid_context_message)
            .collect();
        survivors.sort_by_key(|m| m.timestamp);
        Ok(survivors)
    }

    /// Append `raw` if it's new, within the time window, and not empty after
    /// extraction. Dedupes by `message_id` via a file scan (per-channel files
    /// are small, so this is cheap enough to skip an in-memory index).
    /// Returns whether the message was added plus the author's facts so the
    /// caller can feed them into a bulk index pass if desired (they are
    /// already applied to the index here).
    pub async fn add(
        &self,
        raw: &RawMessage,
        max_context_messages: u32,
        context_window_hours: u32,
    ) -> Result<bool> {
        let cutoff = now() - (context_window_hours as i64) * 3600;
        if raw.timestamp < cutoff {
            return Ok(false);
        }

        let mut messages = self.read_raw(raw.guild_id, raw.channel_id).await?;
        if messages.iter().any(|m| m.message_id == raw.message_id) {
            return Ok(false);
        }

        let extracted = extract_context(raw);
        let candidate = ConversationMessage {
            message_id: raw.message_id,
            user_id: raw.author.user_id,
            username: raw.author.display_name.clone(),
            content: extracted.content,
            timestamp: raw.timestamp,
            is_bot_response: raw.is_bot_response,
            is_self_bot_response: raw.is_self_bot_response,
            referenced_message_id: raw.referenced_message_id,
            attachment_urls: extracted.attachment_urls,
            embed_urls: extracted.embed_urls,
            multimodal_content: extracted.multimodal_content,
        };

        if !is_valid_context_message(&candidate) {
            return Ok(false);
        }

        self.index.update_user(&raw.author, true).await?;

        messages.push(candidate);
        messages.sort_by_key(|m| m.timestamp);
        if messages.len() as u32 > max_context_messages {
            let excess = messages.len() - max_context_messages as usize;
            messages.drain(0..excess);
        }
        self.write_raw(raw.guild_id, raw.channel_id, &messages).await?;
        self.index.bump_channel_message_count(raw.guild_id, raw.channel_id, 1).await?;
        Ok(true)
    }

    /// Batched variant: loop `add`'s dedup/extraction/validity logic over
    /// `raws` with a single final write, and a single user-index write per
    /// guild (via [`IndexManager::bulk_update_users`]).
    pub async fn bulk_add(&self, guild_id: Snowflake, channel_id: Snowflake, raws: &[RawMessage], max_context_messages: u32, context_window_hours: u32) -> Result<usize> {
        if raws.is_empty() {
            return Ok(0);
        }
        let cutoff = now() - (context_window_hours as i64) * 3600;
        let mut messages = self.read_raw(guild_id, channel_id).await?;
        let mut existing_ids: std::collections::HashSet<Snowflake> = messages.iter().map(|m| m.message_id).collect();
        let mut users_to_index = Vec::new();
        let mut added = 0usize;

        for raw in raws {
            if raw.timestamp < cutoff || existing_ids.contains(&raw.message_id) {
                continue;
            }
            let extracted = extract_context(raw);
            let candidate = ConversationMessage {
                message_id: raw.message_id,
                user_id: raw.author.user_id,
                username: raw.author.display_name.clone(),
                content: extracted.content,
                timestamp: raw.timestamp,
                is_bot_response: raw.is_bot_response,
                is_self_bot_response: raw.is_self_bot_response,
                referenced_message_id: raw.referenced_message_id,
                attachment_urls: extracted.attachment_urls,
                embed_urls: extracted.embed_urls,
                multimodal_content: extracted.multimodal_content,
            };
            if !is_valid_context_message(&candidate) {
                continue;
            }
            existing_ids.insert(candidate.message_id);
            users_to_index.push((raw.author.clone(), true));
            messages.push(candidate);
            added += 1;
        }

        if added == 0 {
            return Ok(0);
        }

        messages.sort_by_key(|m| m.timestamp);
        if messages.len() as u32 > max_context_messages {
            let excess = messages.len() - max_context_messages as usize;
            messages.drain(0..excess);
        }
        self.write_raw(guild_id, channel_id, &messages).await?;
        self.index.bulk_update_users(guild_id, &users_to_index).await?;
        self.index.bump_channel_message_count(guild_id, channel_id, added as u64).await?;
        debug!(guild_id, channel_id, added, "bulk ingested conversation history");
        Ok(added)
    }

    /// Replace only the text `content` field — attachments/embeds are not
    /// re-fetched because the raw Discord edit event doesn't provide them
    /// (§9 open question — behaviour is intentionally preserved).
    pub async fn edit(&self, guild_id: Snowflake, channel_id: Snowflake, message_id: Snowflake, new_content: &str) -> Result<bool> {
        let mut messages = self.read_raw(guild_id, channel_id).await?;
        let Some(entry) = messages.iter_mut().find(|m| m.message_id == message_id) else {
            return Ok(false);
        };
        entry.content = new_content.to_string();
        entry.multimodal_content = if new_content.is_empty() {
            Vec::new()
        } else {
            vec![chorus_core::ContentPart::text(new_content.to_string())]
        };
        self.write_raw(guild_id, channel_id, &messages).await?;
        Ok(true)
    }

    pub async fn delete(&self, guild_id: Snowflake, channel_id: Snowflake, message_id: Snowflake) -> Result<bool> {
        let mut messages = self.read_raw(guild_id, channel_id).await?;
        let before = messages.len();
        messages.retain(|m| m.message_id != message_id);
        let removed = messages.len() != before;
        if removed {
            self.write_raw(guild_id, channel_id, &messages).await?;
        }
        Ok(removed)
    }

    /// Walk every configured channel, drop out-of-window/over-count
    /// messages, delete the file entirely if it ends up empty.
    pub async fn prune_all(&self, config_store: &ChatbotConfigStore) -> Result<usize> {
        let mut pruned_channels = 0usize;
        for (guild_id, channel_id) in config_store.configured_channels().await? {
            let cfg = config_store.get_effective(guild_id, channel_id).await?;
            let messages = self.read_raw(guild_id, channel_id).await?;
            let cutoff = now() - (cfg.context_window_hours as i64) * 3600;
            let mut kept: Vec<ConversationMessage> = messages.into_iter().filter(|m| m.timestamp >= cutoff).collect();
            kept.sort_by_key(|m| m.timestamp);
            if kept.len() as u32 > cfg.max_context_messages {
                let excess = kept.len() - cfg.max_context_messages as usize;
                kept.drain(0..excess);
            }
            if kept.is_empty() {
                self.store.remove(&self.path(guild_id, channel_id)).await?;
            } else {
                self.write_raw(guild_id, channel_id, &kept).await?;
            }
            pruned_channels += 1;
        }
        info!(pruned_channels, "completed scheduled conversation prune pass");
        Ok(pruned_channels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chorus_core::{RawMediaRef, UserFacts};

    fn env() -> (ConversationStore, PathBuf) {
        let nanos = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap().as_nanos();
        let dir = std::env::temp_dir().join(format!("chorus-conv-test-{nanos}"));
        let json_store = Arc::new(JsonStore::new());
        let index = Arc::new(IndexManager::new(json_store.clone(), &dir));
        (ConversationStore::new(json_store, &dir, index), dir)
    }

    fn raw(id: u64, content: &str, ts: i64) -> RawMessage {
        RawMessage {
            message_id: id,
            channel_id: 10,
            guild_id: 1,
            author: UserFacts {
                user_id: 99,
                username: "alice".into(),
                display_name: "Alice".into(),
                guild_id: 1,
                guild_name: "g".into(),
                roles: vec![],
                avatar_url: None,
                status: None,
                is_bot: false,
            },
            is_bot_response: false,
            is_self_bot_response: false,
            referenced_message_id: None,
            content: content.to_string(),
            timestamp: ts,
            attachments: Vec::<RawMediaRef>::new(),
            embeds: Vec::new(),
        }
    }

    #[tokio::test]
    async fn add_then_dedupe_by_message_id() {
        let (store, dir) = env();
        let now_ts = now();
        assert!(store.add(&raw(1, "hello", now_ts), 100, 24).await.unwrap());
        assert!(!store.add(&raw(1, "hello again", now_ts), 100, 24).await.unwrap());
        let history = store.load_history(1, 10, 24).await.unwrap();
        assert_eq!(history.len(), 1);
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn add_rejects_messages_outside_window() {
        let (store, dir) = env();
        let old_ts = now() - 48 * 3600;
        assert!(!store.add(&raw(2, "old", old_ts), 100, 24).await.unwrap());
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn add_truncates_to_max_context_messages() {
        let (store, dir) = env();
        let now_ts = now();
        for i in 0..5 {
            store.add(&raw(i, "hi", now_ts + i as i64), 3, 24).await.unwrap();
        }
        let history = store.load_history(1, 10, 24).await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].message_id, 2);
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn edit_replaces_content_only() {
        let (store, dir) = env();
        let now_ts = now();
        store.add(&raw(1, "hello", now_ts), 100, 24).await.unwrap();
        store.edit(1, 10, 1, "edited").await.unwrap();
        let history = store.load_history(1, 10, 24).await.unwrap();
        assert_eq!(history[0].content, "edited");
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn delete_removes_message() {
        let (store, dir) = env();
        let now_ts = now();
        store.add(&raw(1, "hello", now_ts), 100, 24).await.unwrap();
        assert!(store.delete(1, 10, 1).await.unwrap());
        let history = store.load_history(1, 10, 24).await.unwrap();
        assert!(history.is_empty());
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn history_filter_monotonic_in_window_size() {
        let (store, dir) = env();
        let now_ts = now();
        store.add(&raw(1, "a", now_ts - 10 * 3600), 100, 24).await.unwrap();
        store.add(&raw(2, "b", now_ts - 40 * 3600), 100, 48).await.unwrap();
        let narrow = store.load_history(1, 10, 24).await.unwrap();
        let wide = store.load_history(1, 10, 48).await.unwrap();
        assert!(wide.len() >= narrow.len());
        for m in &narrow {
            assert!(wide.iter().any(|w| w.message_id == m.message_id));
        }
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
