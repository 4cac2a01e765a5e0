use std::collections::HashMap;

use chorus_core::Snowflake;
use chorus_index::{ChannelIndexEntry, PinnedMessage, UserIndexEntry};

use crate::sanitize::discord_to_llm_readable;
use crate::snippet::smart_snippet;

/// `=== Current Channel Info === ... === End of Channel Info ===` envelope.
/// Blank/unset fields are omitted rather than rendered empty (§4.5).
pub fn channel_context_block(channel: &ChannelIndexEntry) -> String {
    let mut lines = vec!["=== Current Channel Info ===".to_string()];
    if let Some(guild_name) = &channel.guild_name {
        if !guild_name.is_empty() {
            lines.push(format!("Server: {guild_name}"));
            if let Some(desc) = &channel.guild_description {
                if !desc.is_empty() {
                    lines.push(format!("Description: {desc}"));
                }
            }
        }
    }
    lines.push(format!("Channel: #{}", channel.channel_name));
    lines.push(format!("Type: {}", channel.channel_type.label()));
    if let Some(topic) = &channel.topic {
        if !topic.is_empty() {
            lines.push(format!("Topic: {topic}"));
        }
    }
    if let Some(category) = &channel.category_name {
        if !category.is_empty() {
            lines.push(format!("Category: {category}"));
        }
    }
    if channel.is_nsfw {
        lines.push("Note: This is an NSFW channel".to_string());
    }
    lines.push("=== End of Channel Info ===\n".to_string());
    lines.join("\n")
}

/// `=== Known Users === ... === End of Known Users ===` envelope; guaranteed
/// to include the self-bot's own entry (§4.5 `user_context_block`).
pub fn user_context_block(users: &[&UserIndexEntry], self_bot_id: Snowflake) -> String {
    if users.iter().all(|u| u.user_id != self_bot_id) {
        tracing::debug!(self_bot_id, "self-bot not present in requested user set for known-users block");
    }
    let mut lines = vec!["=== Known Users ===".to_string()];
    for user in users {
        let mut parts = vec![
            format!("ID: {}", user.user_id),
            format!("Handle: @{}", user.username),
            format!("Nickname: {}", user.display_name),
        ];
        if !user.roles.is_empty() {
            parts.push(format!("Roles: {}", user.roles.join(", ")));
        }
        lines.push(format!("\u{2022} {}", parts.join(" | ")));
    }
    lines.push("=== End of Known Users ===\n".to_string());
    lines.join("\n")
}

/// `=== Pinned Messages === ... === End of Pinned Messages ===` envelope,
/// sorted by timestamp. `resolve_attachment` maps a stored URL to
/// `(validated_url, expired_filename)` via `MediaCache::validate_and_update_url`
/// (kept as a closure so this module doesn't depend on chorus-media directly).
pub async fn pinned_context_block<F, Fut>(
    mut pins: Vec<PinnedMessage>,
    user_index: &HashMap<Snowflake, UserIndexEntry>,
    resolve_attachment: F,
) -> String
where
    F: Fn(String) -> Fut,
    Fut: std::future::Future<Output = (Option<String>, Option<String>)>,
{
    if pins.is_empty() {
        return String::new();
    }
    pins.sort_by_key(|p| p.timestamp);

    let mut lines = vec![
        "=== Pinned Messages ===".to_string(),
        "Note: These messages are important channel context.".to_string(),
    ];

    for pin in pins {
        let role_label = user_index
            .get(&pin.user_id)
            .map(|u| u.username.clone())
            .unwrap_or_else(|| pin.username.clone());
        let mut content = discord_to_llm_readable(&pin.content, user_index);

        let mut image_parts = Vec::new();
        for url in &pin.attachment_urls {
            let (validated, expired_filename) = resolve_attachment(url.clone()).await;
            if let Some(validated_url) = validated {
                image_parts.push(format!("Image: {validated_url}"));
            } else if let Some(filename) = expired_filename {
                image_parts.push(format!("Image {filename} expired"));
            }
        }
        if !image_parts.is_empty() {
            content = format!("{content} ({})", image_parts.join(", "));
        }

        lines.push(format!("{role_label}: {}", content.trim()));
    }

    lines.push("=== End of Pinned Messages ===\n".to_string());
    lines.join("\n")
}

/// `[Replying to #N]` when the referenced message is in the current window,
/// else `[Replying to @author: "snippet"]` (§4.5 reply annotation rules).
pub fn reply_annotation(referenced_local_index: Option<usize>, fallback_author: Option<&str>, fallback_content: Option<&str>) -> String {
    if let Some(local_index) = referenced_local_index {
        return format!("[Replying to #{local_index}] ");
    }
    if let Some(author) = fallback_author {
        let snippet = smart_snippet(fallback_content.unwrap_or(""));
        return format!("[Replying to @{author}: \"{snippet}\"] ");
    }
    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chorus_core::ChannelKind;

    fn channel() -> ChannelIndexEntry {
        ChannelIndexEntry {
            channel_id: 1,
            guild_id: 1,
            channel_name: "general".to_string(),
            channel_type: ChannelKind::Text,
            topic: None,
            category_name: None,
            is_nsfw: false,
            guild_name: Some("My Server".to_string()),
            guild_description: None,
            last_indexed: 0,
            message_count: 0,
        }
    }

    #[test]
    fn channel_block_omits_unset_fields() {
        let block = channel_context_block(&channel());
        assert!(block.contains("Server: My Server"));
        assert!(!block.contains("Description:"));
        assert!(!block.contains("Topic:"));
    }

    #[test]
    fn channel_block_includes_nsfw_note_when_set() {
        let mut c = channel();
        c.is_nsfw = true;
        let block = channel_context_block(&c);
        assert!(block.contains("Note: This is an NSFW channel"));
    }

    #[test]
    fn reply_annotation_prefers_local_index() {
        assert_eq!(reply_annotation(Some(3), Some("alice"), Some("hi")), "[Replying to #3] ");
    }

    #[test]
    fn reply_annotation_falls_back_to_snippet() {
        let out = reply_annotation(None, Some("alice"), Some("hi there"));
        assert_eq!(out, "[Replying to @alice: \"hi there\"] ");
    }
}
