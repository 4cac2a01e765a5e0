use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chorus_core::{Result, Snowflake};
use chorus_storage::JsonStore;
use serde::{Deserialize, Serialize};

/// Where a successful OCR match (or raw OCR text, if no pattern matched)
/// should be delivered (§4.7.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    /// Source channel is both a read and response channel — reply in place.
    ReplyInPlace,
    /// Post a link to the original message in `channel`, then reply there.
    PostLinkThenReply { channel: Snowflake },
    /// No eligible response channel; use the first configured fallback.
    Fallback { channel: Snowflake },
    /// No read channel, no response channel, no fallback — log and drop.
    Drop,
}

/// Per-guild OCR channel configuration: which channels feed the pipeline,
/// which receive its output, the fallback of last resort, and each
/// channel's OCR language (defaulting to the pipeline default when absent).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OcrChannelConfig {
    pub read_channels: Vec<Snowflake>,
    pub response_channels: Vec<Snowflake>,
    pub fallback_channels: Vec<Snowflake>,
    pub channel_languages: HashMap<Snowflake, String>,
}

impl OcrChannelConfig {
    pub fn language_for(&self, channel_id: Snowflake, default_language: &str) -> String {
        self.channel_languages.get(&channel_id).cloned().unwrap_or_else(|| default_language.to_string())
    }

    /// §4.7.1 response routing: try in-place reply, then a response channel
    /// that isn't also a read channel with a matching language, then the
    /// first fallback channel, else drop.
    pub fn route(&self, source_channel: Snowflake, default_language: &str) -> RouteDecision {
        let is_read = self.read_channels.contains(&source_channel);
        let is_response = self.response_channels.contains(&source_channel);
        if is_read && is_response {
            return RouteDecision::ReplyInPlace;
        }

        let source_lang = self.language_for(source_channel, default_language);
        let matched = self
            .response_channels
            .iter()
            .find(|&&candidate| !self.read_channels.contains(&candidate) && self.language_for(candidate, default_language) == source_lang);
        if let Some(&channel) = matched {
            return RouteDecision::PostLinkThenReply { channel };
        }

        if let Some(&channel) = self.fallback_channels.first() {
            return RouteDecision::Fallback { channel };
        }

        RouteDecision::Drop
    }
}

/// Owns `data/ocr_channel_config.json`: `{<guild>: OcrChannelConfig}` (§6).
/// The pipeline itself is handed a single merged snapshot at startup
/// ([`Self::merged`]) since channel IDs are globally unique and it holds no
/// per-guild routing state of its own.
pub struct OcrChannelConfigStore {
    store: Arc<JsonStore>,
    path: PathBuf,
}

impl OcrChannelConfigStore {
    pub fn new(store: Arc<JsonStore>, data_root: impl Into<PathBuf>) -> Self {
        Self {
            store,
            path: data_root.into().join("ocr_channel_config.json"),
        }
    }

    pub async fn get_guild_config(&self, guild_id: Snowflake) -> Result<OcrChannelConfig> {
        let value = self.store.read(&self.path).await;
        let entry = value.get(guild_id.to_string()).cloned();
        Ok(entry.map(serde_json::from_value).transpose()?.unwrap_or_default())
    }

    pub async fn set_guild_config(&self, guild_id: Snowflake, config: OcrChannelConfig) -> Result<()> {
        self.store
            .update(&self.path, |value| {
                let mut root = value.as_object().cloned().unwrap_or_default();
                root.insert(guild_id.to_string(), serde_json::to_value(&config).unwrap());
                serde_json::Value::Object(root)
            })
            .await
    }

    /// Union every configured guild's channel lists into one snapshot,
    /// handed to [`crate::OcrPipeline::spawn`] at startup.
    pub async fn merged(&self) -> Result<OcrChannelConfig> {
        let value = self.store.read(&self.path).await;
        let mut merged = OcrChannelConfig::default();
        if let Some(guilds) = value.as_object() {
            for guild_value in guilds.values() {
                if let Ok(cfg) = serde_json::from_value::<OcrChannelConfig>(guild_value.clone()) {
                    merged.read_channels.extend(cfg.read_channels);
                    merged.response_channels.extend(cfg.response_channels);
                    merged.fallback_channels.extend(cfg.fallback_channels);
                    merged.channel_languages.extend(cfg.channel_languages);
                }
            }
        }
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_and_response_channel_replies_in_place() {
        let mut config = OcrChannelConfig::default();
        config.read_channels.push(1);
        config.response_channels.push(1);
        assert_eq!(config.route(1, "eng"), RouteDecision::ReplyInPlace);
    }

    #[test]
    fn language_matched_response_channel_is_preferred() {
        let mut config = OcrChannelConfig::default();
        config.read_channels = vec![1];
        config.response_channels = vec![2, 3];
        config.channel_languages.insert(2, "rus".to_string());
        config.channel_languages.insert(3, "eng".to_string());
        assert_eq!(config.route(1, "eng"), RouteDecision::PostLinkThenReply { channel: 3 });
    }

    #[test]
    fn falls_back_when_no_matching_response_channel() {
        let mut config = OcrChannelConfig::default();
        config.read_channels = vec![1];
        config.fallback_channels = vec![9];
        assert_eq!(config.route(1, "eng"), RouteDecision::Fallback { channel: 9 });
    }

    #[test]
    fn drops_when_nothing_configured() {
        let config = OcrChannelConfig::default();
        assert_eq!(config.route(1, "eng"), RouteDecision::Drop);
    }
}
