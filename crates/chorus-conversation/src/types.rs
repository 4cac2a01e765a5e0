use chorus_core::{ContentPart, Snowflake};
use serde::{Deserialize, Serialize};

/// Append-only record in a per-channel history (§3 `ConversationMessage`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub message_id: Snowflake,
    pub user_id: Snowflake,
    /// Display name at capture time — not re-resolved on read.
    pub username: String,
    /// Text with media URLs stripped.
    pub content: String,
    /// Seconds since epoch.
    pub timestamp: i64,
    pub is_bot_response: bool,
    pub is_self_bot_response: bool,
    pub referenced_message_id: Option<Snowflake>,
    /// Image + document URLs retained in order of appearance.
    pub attachment_urls: Vec<String>,
    /// Non-media embed URLs, kept for potential future use.
    pub embed_urls: Vec<String>,
    pub multimodal_content: Vec<ContentPart>,
}

impl ConversationMessage {
    /// Concatenation of the text parts of `multimodal_content`, used by the
    /// invariant check in §3 and by `is_valid_context_message`.
    pub fn multimodal_text(&self) -> String {
        self.multimodal_content
            .iter()
            .filter_map(ContentPart::as_text)
            .collect::<Vec<_>>()
            .join("")
    }
}
