//! Serenity → chat-platform-neutral fact conversion (§6 chat platform
//! boundary). Every other crate in the workspace only ever sees
//! `RawMessage`/`UserFacts`/`ChannelFacts`; this is the one place that
//! touches a serenity type.

use chorus_core::{ChannelFacts, ChannelKind, RawMediaKind, RawMediaRef, RawMessage, Snowflake, UserFacts};
use serenity::model::channel::{Attachment, Channel, ChannelType, Embed, Message};
use serenity::model::guild::{Member, PartialMember};
use serenity::model::user::User;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp"];
const DOCUMENT_EXTENSIONS: &[&str] = &["pdf", "txt", "log", "ini", "json", "xml", "csv", "md"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "webm", "mkv"];

fn extension_of(name_or_url: &str) -> Option<String> {
    let without_query = name_or_url.split('?').next().unwrap_or(name_or_url);
    without_query.rsplit('.').next().map(|e| e.to_lowercase())
}

fn classify_attachment(attachment: &Attachment) -> RawMediaKind {
    if let Some(ct) = &attachment.content_type {
        if ct.starts_with("image/") {
            return RawMediaKind::Image;
        }
        if ct.starts_with("video/") {
            return RawMediaKind::Video;
        }
    }
    match extension_of(&attachment.filename).as_deref() {
        Some(ext) if IMAGE_EXTENSIONS.contains(&ext) => RawMediaKind::Image,
        Some(ext) if VIDEO_EXTENSIONS.contains(&ext) => RawMediaKind::Video,
        Some(ext) if DOCUMENT_EXTENSIONS.contains(&ext) => RawMediaKind::Document,
        _ => RawMediaKind::Document,
    }
}

fn classify_embed(embed: &Embed) -> Option<RawMediaRef> {
    let url = embed.url.clone().or_else(|| embed.image.as_ref().map(|i| i.url.clone()))?;
    let kind = if embed.image.is_some() || embed.thumbnail.is_some() {
        RawMediaKind::Image
    } else if embed.video.is_some() {
        RawMediaKind::Video
    } else {
        RawMediaKind::OtherEmbed
    };
    Some(RawMediaRef { url, kind })
}

/// User facts from an author/member pair. `roles` are names already resolved
/// by the caller (a `Guild`'s role cache); `@everyone` is excluded by the caller.
pub fn user_facts(user: &User, guild_id: Snowflake, guild_name: &str, role_names: Vec<String>, nick: Option<String>) -> UserFacts {
    UserFacts {
        user_id: user.id.get(),
        username: user.name.clone(),
        display_name: nick.unwrap_or_else(|| user.global_name.clone().unwrap_or_else(|| user.name.clone())),
        guild_id,
        guild_name: guild_name.to_string(),
        roles: role_names,
        avatar_url: user.avatar_url(),
        status: None,
        is_bot: user.bot,
    }
}

pub fn member_facts(member: &Member, guild_name: &str, role_names: Vec<String>) -> UserFacts {
    user_facts(&member.user, member.guild_id.get(), guild_name, role_names, member.nick.clone())
}

pub fn partial_member_facts(user: &User, partial: &PartialMember, guild_id: Snowflake, guild_name: &str, role_names: Vec<String>) -> UserFacts {
    user_facts(user, guild_id, guild_name, role_names, partial.nick.clone())
}

pub fn channel_kind_of(kind: ChannelType) -> ChannelKind {
    match kind {
        ChannelType::Text | ChannelType::News => ChannelKind::Text,
        ChannelType::PublicThread => ChannelKind::PublicThread,
        ChannelType::PrivateThread => ChannelKind::PrivateThread,
        ChannelType::NewsThread => ChannelKind::NewsThread,
        ChannelType::Voice | ChannelType::Stage => ChannelKind::Voice,
        _ => ChannelKind::Other,
    }
}

/// Build `ChannelFacts` for a text/voice/thread channel. Thread parent
/// lookups are resolved by the caller via `Context::cache`/`Http` and passed
/// in, since this module has no network access of its own.
pub fn channel_facts(
    channel_id: Snowflake,
    guild_id: Snowflake,
    channel_name: String,
    channel_type: ChannelKind,
    topic: Option<String>,
    category_name: Option<String>,
    is_nsfw: bool,
    guild_name: Option<String>,
    guild_description: Option<String>,
    parent: Option<&Channel>,
) -> ChannelFacts {
    let (parent_topic, parent_category, parent_is_nsfw) = match parent {
        Some(Channel::Guild(parent_channel)) => (parent_channel.topic.clone(), None, Some(parent_channel.nsfw)),
        _ => (None, None, None),
    };
    ChannelFacts {
        channel_id,
        guild_id,
        channel_name,
        channel_type,
        topic,
        category_name,
        is_nsfw,
        guild_name,
        guild_description,
        parent_topic,
        parent_category,
        parent_is_nsfw,
    }
}

/// Convert an inbound `Message` into a `RawMessage`. `self_bot_id` identifies
/// the bot's own messages for `is_self_bot_response`.
pub fn message_to_raw(msg: &Message, self_bot_id: Snowflake, author: UserFacts) -> RawMessage {
    let attachments: Vec<RawMediaRef> = msg
        .attachments
        .iter()
        .map(|a| RawMediaRef {
            url: a.url.clone(),
            kind: classify_attachment(a),
        })
        .collect();
    let embeds: Vec<RawMediaRef> = msg.embeds.iter().filter_map(classify_embed).collect();

    RawMessage {
        message_id: msg.id.get(),
        channel_id: msg.channel_id.get(),
        guild_id: msg.guild_id.map(|g| g.get()).unwrap_or(0),
        is_bot_response: msg.author.bot,
        is_self_bot_response: msg.author.id.get() == self_bot_id,
        referenced_message_id: msg.message_reference.as_ref().and_then(|r| r.message_id).map(|id| id.get()),
        content: msg.content.clone(),
        timestamp: msg.timestamp.unix_timestamp(),
        author,
        attachments,
        embeds,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_of_strips_query_string() {
        assert_eq!(extension_of("https://cdn.example/a.png?ex=1&sig=2"), Some("png".to_string()));
    }

    #[test]
    fn extension_of_handles_bare_filename() {
        assert_eq!(extension_of("report.pdf"), Some("pdf".to_string()));
    }
}
