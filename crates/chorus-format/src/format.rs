use std::collections::{HashMap, HashSet};

use chorus_conversation::ConversationMessage;
use chorus_core::{ContentPart, Result, Snowflake};
use chorus_index::{IndexManager, UserIndexEntry};

use crate::blocks::{channel_context_block, pinned_context_block, reply_annotation, user_context_block};
use crate::sanitize::discord_to_llm_readable;
use crate::types::{HistoryContent, HistoryEntry, Role};

/// Bundle returned by [`format_context_for_llm`]: the static context string
/// plus the structured per-message history (§4.5).
pub struct FormattedContext {
    pub static_context: String,
    pub history: Vec<HistoryEntry>,
}

/// Assemble the static-context string and structured history handed to the
/// LLM. `resolve_attachment` validates/refreshes a pinned-message attachment
/// URL (see [`crate::blocks::pinned_context_block`]); `self_bot_username` and
/// `self_bot_id` identify the bot's own entries in the user-facing blocks.
/// `full_history` is the unwindowed history `messages` was prioritised from,
/// used to resolve a reply whose target fell outside the window (§4.5).
pub async fn format_context_for_llm<F, Fut>(
    messages: &[ConversationMessage],
    full_history: &[ConversationMessage],
    index: &IndexManager,
    guild_id: Snowflake,
    channel_id: Snowflake,
    self_bot_id: Snowflake,
    self_bot_username: &str,
    resolve_attachment: F,
) -> Result<FormattedContext>
where
    F: Fn(String) -> Fut,
    Fut: std::future::Future<Output = (Option<String>, Option<String>)>,
{
    let mut static_parts = Vec::new();

    if let Some(channel) = index.get_channel(guild_id, channel_id).await? {
        static_parts.push(channel_context_block(&channel));
    }

    let all_users = index.all_users(guild_id).await?;
    let user_index: HashMap<Snowflake, UserIndexEntry> = all_users.into_iter().map(|u| (u.user_id, u)).collect();

    if !messages.is_empty() {
        let unique_user_ids: HashSet<Snowflake> = messages.iter().filter(|m| !m.is_bot_response).map(|m| m.user_id).collect();
        if !unique_user_ids.is_empty() {
            let mut ids: Vec<Snowflake> = unique_user_ids.into_iter().collect();
            if !ids.contains(&self_bot_id) {
                ids.push(self_bot_id);
            }
            let entries: Vec<&UserIndexEntry> = ids.iter().filter_map(|id| user_index.get(id)).collect();
            if !entries.is_empty() {
                static_parts.push(user_context_block(&entries, self_bot_id));
            }
        }
    }

    let pins = index.load_pins(guild_id, channel_id).await?;
    let pinned_block = pinned_context_block(pins, &user_index, resolve_attachment).await;
    if !pinned_block.is_empty() {
        static_parts.push(pinned_block);
    }

    let static_context = static_parts.join("\n");

    if messages.is_empty() {
        return Ok(FormattedContext {
            static_context,
            history: Vec::new(),
        });
    }

    let message_id_to_local_index: HashMap<Snowflake, usize> =
        messages.iter().enumerate().map(|(i, m)| (m.message_id, i + 1)).collect();

    let mut history = Vec::with_capacity(messages.len());
    for (i, message) in messages.iter().enumerate() {
        let role = if message.is_self_bot_response { Role::Assistant } else { Role::User };
        let content = format_message_content(message, i + 1, &user_index, &message_id_to_local_index, full_history, self_bot_username);
        history.push(HistoryEntry { role, content });
    }

    Ok(FormattedContext { static_context, history })
}

fn role_label(message: &ConversationMessage, user_index: &HashMap<Snowflake, UserIndexEntry>, self_bot_username: &str) -> String {
    if message.is_self_bot_response {
        return user_index
            .get(&message.user_id)
            .map(|u| u.username.clone())
            .unwrap_or_else(|| self_bot_username.to_string());
    }
    user_index.get(&message.user_id).map(|u| u.username.clone()).unwrap_or_else(|| message.username.clone())
}

/// Resolve a reply's annotation (§4.5): by local index when the target is
/// still in the windowed `messages`, else by snippet from `full_history`,
/// the unwindowed history the window was prioritised from.
pub fn reply_prefix_with_fallback(
    message: &ConversationMessage,
    message_id_to_local_index: &HashMap<Snowflake, usize>,
    full_history: &[ConversationMessage],
    user_index: &HashMap<Snowflake, UserIndexEntry>,
) -> String {
    let Some(referenced_id) = message.referenced_message_id else {
        return String::new();
    };
    if let Some(&local_index) = message_id_to_local_index.get(&referenced_id) {
        return reply_annotation(Some(local_index), None, None);
    }
    if let Some(original) = full_history.iter().find(|m| m.message_id == referenced_id) {
        let author = user_index.get(&original.user_id).map(|u| u.username.clone()).unwrap_or_else(|| original.username.clone());
        return reply_annotation(None, Some(&author), Some(&original.content));
    }
    String::new()
}

/// Format one message's content: a single string when it carries only text,
/// otherwise a list of typed parts, each prefixed/annotated per §4.5.
pub fn format_message_content(
    message: &ConversationMessage,
    local_index: usize,
    user_index: &HashMap<Snowflake, UserIndexEntry>,
    message_id_to_local_index: &HashMap<Snowflake, usize>,
    full_history: &[ConversationMessage],
    self_bot_username: &str,
) -> HistoryContent {
    let label = role_label(message, user_index, self_bot_username);
    let reply_info = reply_prefix_with_fallback(message, message_id_to_local_index, full_history, user_index);
    let prefix = format!("[{local_index}] [id:{}] {label}: {reply_info}", message.user_id);

    let only_text = message.multimodal_content.iter().all(|p| matches!(p, ContentPart::Text { .. }));
    if only_text {
        let readable = discord_to_llm_readable(&message.content, user_index);
        return HistoryContent::Text(format!("{prefix}{readable}").trim().to_string());
    }

    let mut parts = Vec::new();
    let mut pending_text = vec![prefix];
    for part in &message.multimodal_content {
        match part {
            ContentPart::Text { text } => {
                pending_text.push(discord_to_llm_readable(text, user_index));
            }
            ContentPart::Image { image_url } => {
                if !pending_text.is_empty() {
                    parts.push(ContentPart::text(pending_text.join(" ").trim().to_string()));
                    pending_text = Vec::new();
                }
                parts.push(ContentPart::image(image_url.url.clone()));
            }
            ContentPart::Document { document_url } => {
                if !pending_text.is_empty() {
                    parts.push(ContentPart::text(pending_text.join(" ").trim().to_string()));
                    pending_text = Vec::new();
                }
                parts.push(ContentPart::document(document_url.url.clone()));
            }
        }
    }
    if !pending_text.is_empty() {
        parts.push(ContentPart::text(pending_text.join(" ").trim().to_string()));
    }
    HistoryContent::Parts(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_message(id: u64, user_id: u64, content: &str) -> ConversationMessage {
        ConversationMessage {
            message_id: id,
            user_id,
            username: "bob".to_string(),
            content: content.to_string(),
            timestamp: id as i64,
            is_bot_response: false,
            is_self_bot_response: false,
            referenced_message_id: None,
            attachment_urls: Vec::new(),
            embed_urls: Vec::new(),
            multimodal_content: vec![ContentPart::text(content.to_string())],
        }
    }

    #[test]
    fn text_only_message_formats_as_single_string() {
        let msg = text_message(1, 5, "hello");
        let content = format_message_content(&msg, 1, &HashMap::new(), &HashMap::new(), &[], "bot");
        match content {
            HistoryContent::Text(s) => assert!(s.ends_with("hello")),
            HistoryContent::Parts(_) => panic!("expected text"),
        }
    }

    #[test]
    fn multimodal_message_formats_as_parts() {
        let mut msg = text_message(1, 5, "look");
        msg.multimodal_content = vec![ContentPart::text("look"), ContentPart::image("https://x/img.png")];
        let content = format_message_content(&msg, 1, &HashMap::new(), &HashMap::new(), &[], "bot");
        match content {
            HistoryContent::Parts(parts) => assert_eq!(parts.len(), 2),
            HistoryContent::Text(_) => panic!("expected parts"),
        }
    }

    #[test]
    fn reply_to_message_outside_window_uses_snippet_fallback() {
        let original = text_message(1, 9, "this is the original longer message content for snippet test");
        let mut reply = text_message(2, 5, "replying");
        reply.referenced_message_id = Some(1);
        let full_history = vec![original];
        let prefix = reply_prefix_with_fallback(&reply, &HashMap::new(), &full_history, &HashMap::new());
        assert!(prefix.starts_with("[Replying to @bob:"));
    }
}
