//! The narrow surface the engine needs from the chat platform (§4.8 steps
//! 1-2, 4). Kept separate from `chorus_stream`'s reply sinks, which only
//! cover the response side, not history retrieval or membership lookups.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chorus_core::{RawMessage, Result, Snowflake, UserFacts};
use chorus_stream::PlainReplySink;

#[async_trait]
pub trait InlineHost: Send + Sync {
    /// Fetch up to `limit` messages strictly older than `before` (or the
    /// most recent `limit` when `before` is `None`), newest first.
    async fn fetch_history_batch(&self, channel_id: Snowflake, before: Option<Snowflake>, limit: u32) -> Result<Vec<RawMessage>>;

    /// Resolve guild members not already present in the user index.
    async fn fetch_members(&self, guild_id: Snowflake, user_ids: &[Snowflake]) -> Result<Vec<UserFacts>>;

    /// Role id → name for the guild, excluding `@everyone`, for sanitising
    /// role mentions in LLM output (§4.5 `llm_to_discord`).
    async fn fetch_role_names(&self, guild_id: Snowflake) -> Result<HashMap<Snowflake, String>>;

    /// Post the "Thinking..." placeholder, returning its message id.
    async fn send_placeholder(&self, channel_id: Snowflake, text: &str) -> Result<Snowflake>;

    /// A reply sink chained off the placeholder message, for the plain-text
    /// message chain the streaming relay grows via edits (§4.9).
    fn plain_sink(&self, channel_id: Snowflake, placeholder_id: Snowflake) -> Arc<dyn PlainReplySink>;
}
