use std::path::PathBuf;
use std::sync::Arc;

use chorus_core::config::InlineDefaults;
use chorus_core::{Result, Snowflake};
use chorus_storage::JsonStore;
use serde_json::Value;

use crate::permission::{InlineChannelConfig, InlineConfigOverride};

/// Owns `data/inline_response_config.json`: `{servers:{<guild>:{server_settings:{...},
/// channels:{<channel>:{...}}}}}` (§6).
pub struct InlineConfigStore {
    store: Arc<JsonStore>,
    path: PathBuf,
    defaults: InlineDefaults,
}

impl InlineConfigStore {
    pub fn new(store: Arc<JsonStore>, data_root: impl Into<PathBuf>, defaults: InlineDefaults) -> Self {
        Self {
            store,
            path: data_root.into().join("inline_response_config.json"),
            defaults,
        }
    }

    async fn server_override(&self, guild_id: Snowflake) -> Result<InlineConfigOverride> {
        let value = self.store.read(&self.path).await;
        let entry = value
            .get("servers")
            .and_then(|s| s.get(guild_id.to_string()))
            .and_then(|g| g.get("server_settings"))
            .cloned();
        Ok(entry.map(serde_json::from_value).transpose()?.unwrap_or_default())
    }

    pub async fn get_channel_override(&self, guild_id: Snowflake, channel_id: Snowflake) -> Result<Option<InlineConfigOverride>> {
        let value = self.store.read(&self.path).await;
        let entry = value
            .get("servers")
            .and_then(|s| s.get(guild_id.to_string()))
            .and_then(|g| g.get("channels"))
            .and_then(|c| c.get(channel_id.to_string()))
            .cloned();
        Ok(entry.map(serde_json::from_value).transpose()?)
    }

    /// Effective config for a channel: hardcoded defaults ◁ server override
    /// ◁ channel override, permission lists unioned across all three (§3).
    pub async fn get_effective(&self, guild_id: Snowflake, channel_id: Snowflake) -> Result<InlineChannelConfig> {
        let server = self.server_override(guild_id).await?;
        let channel = self.get_channel_override(guild_id, channel_id).await?.unwrap_or_default();
        Ok(InlineChannelConfig::merge(&self.defaults, &server, &channel))
    }

    pub async fn set_server_config(&self, guild_id: Snowflake, config: InlineConfigOverride) -> Result<()> {
        self.store
            .update(&self.path, |value| {
                let mut root = value.as_object().cloned().unwrap_or_default();
                let mut servers = root.get("servers").and_then(Value::as_object).cloned().unwrap_or_default();
                let mut guild = servers.get(&guild_id.to_string()).and_then(Value::as_object).cloned().unwrap_or_default();
                guild.insert("server_settings".to_string(), serde_json::to_value(&config).unwrap());
                servers.insert(guild_id.to_string(), Value::Object(guild));
                root.insert("servers".to_string(), Value::Object(servers));
                Value::Object(root)
            })
            .await
    }

    pub async fn set_channel_config(&self, guild_id: Snowflake, channel_id: Snowflake, config: InlineConfigOverride) -> Result<()> {
        self.store
            .update(&self.path, |value| {
                let mut root = value.as_object().cloned().unwrap_or_default();
                let mut servers = root.get("servers").and_then(Value::as_object).cloned().unwrap_or_default();
                let mut guild = servers.get(&guild_id.to_string()).and_then(Value::as_object).cloned().unwrap_or_default();
                let mut channels = guild.get("channels").and_then(Value::as_object).cloned().unwrap_or_default();
                channels.insert(channel_id.to_string(), serde_json::to_value(&config).unwrap());
                guild.insert("channels".to_string(), Value::Object(channels));
                servers.insert(guild_id.to_string(), Value::Object(guild));
                root.insert("servers".to_string(), Value::Object(servers));
                Value::Object(root)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tempdir() -> PathBuf {
        let nanos = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap().as_nanos();
        std::env::temp_dir().join(format!("chorus-inline-config-test-{nanos}"))
    }

    #[tokio::test]
    async fn effective_config_defaults_when_unset() {
        let store = InlineConfigStore::new(Arc::new(JsonStore::new()), tempdir(), InlineDefaults::default());
        let cfg = store.get_effective(1, 2).await.unwrap();
        assert!(!cfg.enabled);
    }

    #[tokio::test]
    async fn channel_override_wins_over_server_and_lists_union() {
        let dir = tempdir();
        let store = InlineConfigStore::new(Arc::new(JsonStore::new()), &dir, InlineDefaults::default());

        let mut server = InlineConfigOverride::default();
        server.enabled = Some(true);
        server.role_whitelist.push(42);
        store.set_server_config(1, server).await.unwrap();

        let mut channel = InlineConfigOverride::default();
        channel.enabled = Some(false);
        channel.role_whitelist.push(43);
        store.set_channel_config(1, 2, channel).await.unwrap();

        let effective = store.get_effective(1, 2).await.unwrap();
        assert!(!effective.enabled, "channel override should win over server");
        assert_eq!(effective.role_whitelist, vec![42, 43]);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
