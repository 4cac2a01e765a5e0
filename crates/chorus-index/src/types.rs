use chorus_core::{ChannelKind, Snowflake};
use serde::{Deserialize, Serialize};

/// Per-guild user index entry (§3 `UserIndexEntry`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserIndexEntry {
    pub user_id: Snowflake,
    pub username: String,
    pub display_name: String,
    pub guild_id: Snowflake,
    pub guild_name: String,
    pub roles: Vec<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    pub first_seen: i64,
    pub last_seen: i64,
    pub message_count: u64,
    pub is_bot: bool,
}

/// Per-guild channel index entry (§3 `ChannelIndexEntry`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelIndexEntry {
    pub channel_id: Snowflake,
    pub guild_id: Snowflake,
    pub channel_name: String,
    pub channel_type: ChannelKind,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub category_name: Option<String>,
    pub is_nsfw: bool,
    #[serde(default)]
    pub guild_name: Option<String>,
    #[serde(default)]
    pub guild_description: Option<String>,
    pub last_indexed: i64,
    pub message_count: u64,
}

/// Subset of a conversation message kept for the pinned-message index
/// (§3 `PinnedMessage` — no reply field, no bot-echo distinction).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PinnedMessage {
    pub message_id: Snowflake,
    pub user_id: Snowflake,
    pub username: String,
    pub content: String,
    pub timestamp: i64,
    pub attachment_urls: Vec<String>,
}

/// Diagnostic snapshot returned by `IndexManager::indexing_stats` (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexingStats {
    pub users_indexed: usize,
    pub channels_indexed: usize,
    pub total_user_messages: u64,
}
