use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chorus_core::config::ChatbotDefaults;
use chorus_core::{ChannelChatbotConfigRanges, Result, Snowflake};
use chorus_storage::JsonStore;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Per-guild/channel chatbot configuration (§3 `ChannelChatbotConfig`).
/// Numeric fields are clamped to their documented ranges on load rather than
/// rejected (§7).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelChatbotConfig {
    pub enabled: bool,
    pub max_context_messages: u32,
    pub max_user_context_messages: u32,
    pub context_window_hours: u32,
    pub response_delay_seconds: u32,
    pub max_response_length: u32,
    pub auto_prune_enabled: bool,
    pub prune_interval_hours: u32,
    pub auto_respond_to_mentions: bool,
    pub auto_respond_to_replies: bool,
    #[serde(default)]
    pub safety_settings: Option<HashMap<String, String>>,
    /// Checkpoint for incremental indexing: only messages newer than this
    /// need to be (re)ingested.
    #[serde(default)]
    pub last_cleared_timestamp: Option<i64>,
}

impl Default for ChannelChatbotConfig {
    fn default() -> Self {
        let d = ChatbotDefaults::default();
        Self {
            enabled: false,
            max_context_messages: d.max_context_messages,
            max_user_context_messages: d.max_user_context_messages,
            context_window_hours: d.context_window_hours,
            response_delay_seconds: d.response_delay_seconds,
            max_response_length: d.max_response_length,
            auto_prune_enabled: d.auto_prune_enabled,
            prune_interval_hours: d.prune_interval_hours,
            auto_respond_to_mentions: d.auto_respond_to_mentions,
            auto_respond_to_replies: d.auto_respond_to_replies,
            safety_settings: None,
            last_cleared_timestamp: None,
        }
    }
}

impl ChannelChatbotConfigRanges for ChannelChatbotConfig {
    fn clamp(&mut self) {
        self.max_context_messages = self.max_context_messages.clamp(10, 1000);
        self.max_user_context_messages = self.max_user_context_messages.clamp(5, 500);
        self.context_window_hours = self.context_window_hours.clamp(1, 168);
        self.response_delay_seconds = self.response_delay_seconds.clamp(0, 10);
        self.max_response_length = self.max_response_length.clamp(100, 4000);
        self.prune_interval_hours = self.prune_interval_hours.clamp(1, 48);
    }
}

/// Owns `data/chatbot_config.json` (§6 persistence layout).
pub struct ChatbotConfigStore {
    store: Arc<JsonStore>,
    path: PathBuf,
}

impl ChatbotConfigStore {
    pub fn new(store: Arc<JsonStore>, data_root: impl Into<PathBuf>) -> Self {
        Self {
            store,
            path: data_root.into().join("chatbot_config.json"),
        }
    }

    /// Raw (possibly absent) per-channel override, used by editing commands
    /// so they never write back an already-merged view.
    pub async fn get_channel_override(&self, guild_id: Snowflake, channel_id: Snowflake) -> Result<Option<ChannelChatbotConfig>> {
        let value = self.store.read(&self.path).await;
        let entry = value
            .get("channels")
            .and_then(|c| c.get(guild_id.to_string()))
            .and_then(|g| g.get(channel_id.to_string()))
            .cloned();
        Ok(entry.map(serde_json::from_value).transpose()?)
    }

    /// Effective config for a channel: hardcoded defaults overridden by any
    /// stored per-channel override, clamped to documented ranges.
    pub async fn get_effective(&self, guild_id: Snowflake, channel_id: Snowflake) -> Result<ChannelChatbotConfig> {
        let mut config = self
            .get_channel_override(guild_id, channel_id)
            .await?
            .unwrap_or_default();
        config.clamp();
        Ok(config)
    }

    pub async fn set_channel_config(&self, guild_id: Snowflake, channel_id: Snowflake, mut config: ChannelChatbotConfig) -> Result<()> {
        config.clamp();
        self.store
            .update(&self.path, |value| {
                let mut root = value.as_object().cloned().unwrap_or_default();
                let mut channels = root
                    .get("channels")
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default();
                let mut guild = channels
                    .get(&guild_id.to_string())
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default();
                guild.insert(channel_id.to_string(), serde_json::to_value(&config).unwrap());
                channels.insert(guild_id.to_string(), Value::Object(guild));
                root.insert("channels".to_string(), Value::Object(channels));
                Value::Object(root)
            })
            .await
    }

    pub async fn set_checkpoint(&self, guild_id: Snowflake, channel_id: Snowflake, timestamp: i64) -> Result<()> {
        let mut config = self.get_effective(guild_id, channel_id).await?;
        config.last_cleared_timestamp = Some(timestamp);
        self.set_channel_config(guild_id, channel_id, config).await
    }

    /// All `(guild_id, channel_id)` pairs with a stored override — used by
    /// the pruning timer to enumerate configured channels (§4.3 `prune_all`).
    pub async fn configured_channels(&self) -> Result<Vec<(Snowflake, Snowflake)>> {
        let value = self.store.read(&self.path).await;
        let mut pairs = Vec::new();
        if let Some(channels) = value.get("channels").and_then(Value::as_object) {
            for (guild_str, guild_val) in channels {
                let Ok(guild_id) = guild_str.parse::<Snowflake>() else { continue };
                if let Some(guild_obj) = guild_val.as_object() {
                    for channel_str in guild_obj.keys() {
                        if let Ok(channel_id) = channel_str.parse::<Snowflake>() {
                            pairs.push((guild_id, channel_id));
                        }
                    }
                }
            }
        }
        Ok(pairs)
    }

    #[allow(dead_code)]
    fn global_default(&self) -> Value {
        json!(ChannelChatbotConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tempdir() -> PathBuf {
        let nanos = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap().as_nanos();
        std::env::temp_dir().join(format!("chorus-chatbot-config-test-{nanos}"))
    }

    #[tokio::test]
    async fn effective_config_defaults_when_unset() {
        let store = ChatbotConfigStore::new(Arc::new(JsonStore::new()), tempdir());
        let cfg = store.get_effective(1, 2).await.unwrap();
        assert!(!cfg.enabled);
        assert_eq!(cfg.max_context_messages, 100);
    }

    #[tokio::test]
    async fn out_of_range_values_are_clamped_not_rejected() {
        let dir = tempdir();
        let store = ChatbotConfigStore::new(Arc::new(JsonStore::new()), &dir);
        let mut cfg = ChannelChatbotConfig::default();
        cfg.max_context_messages = 50_000;
        cfg.context_window_hours = 0;
        store.set_channel_config(1, 2, cfg).await.unwrap();
        let effective = store.get_effective(1, 2).await.unwrap();
        assert_eq!(effective.max_context_messages, 1000);
        assert_eq!(effective.context_window_hours, 1);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
