use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Discord snowflake IDs are 64-bit; stored/keyed as strings in JSON files
/// (object keys must be strings) but handled as `u64` everywhere in memory.
pub type Snowflake = u64;

/// One part of a multimodal LLM message (§3, §9 "multimodal content as sum type").
///
/// The wire form is `{type, text|image_url|document_url}`; that shape is a
/// serialisation concern handled by the tagged enum below, not something
/// callers construct by hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    #[serde(rename = "image_url")]
    Image { image_url: UrlRef },
    #[serde(rename = "document_url")]
    Document { document_url: UrlRef },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlRef {
    pub url: String,
}

impl ContentPart {
    pub fn text(s: impl Into<String>) -> Self {
        ContentPart::Text { text: s.into() }
    }

    pub fn image(url: impl Into<String>) -> Self {
        ContentPart::Image {
            image_url: UrlRef { url: url.into() },
        }
    }

    pub fn document(url: impl Into<String>) -> Self {
        ContentPart::Document {
            document_url: UrlRef { url: url.into() },
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentPart::Text { text } => Some(text),
            _ => None,
        }
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            ContentPart::Text { .. } => None,
            ContentPart::Image { image_url } => Some(&image_url.url),
            ContentPart::Document { document_url } => Some(&document_url.url),
        }
    }
}

bitflags! {
    /// Regex compile flags for the pattern rulebook (§4.6), modelled as a
    /// bitset rather than parsed from a pipe-joined string at each call site.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PatternFlags: u8 {
        const IGNORECASE = 0b0000_0001;
        const DOTALL     = 0b0000_0010;
        const MULTILINE  = 0b0000_0100;
        const ASCII      = 0b0000_1000;
        const VERBOSE    = 0b0001_0000;
        const UNICODE    = 0b0010_0000;
    }
}

impl PatternFlags {
    /// Parse the legacy `IGNORECASE|DOTALL|...` pipe-joined on-disk form.
    /// Unknown tokens are ignored so a rulebook with a stray/renamed flag
    /// still loads with whatever flags it does recognise.
    pub fn from_pipe_str(s: &str) -> Self {
        let mut flags = PatternFlags::empty();
        for token in s.split('|') {
            match token.trim().to_uppercase().as_str() {
                "IGNORECASE" => flags |= PatternFlags::IGNORECASE,
                "DOTALL" => flags |= PatternFlags::DOTALL,
                "MULTILINE" => flags |= PatternFlags::MULTILINE,
                "ASCII" => flags |= PatternFlags::ASCII,
                "VERBOSE" => flags |= PatternFlags::VERBOSE,
                "UNICODE" => flags |= PatternFlags::UNICODE,
                _ => {}
            }
        }
        flags
    }

    /// Serialise back to the pipe-joined on-disk form.
    pub fn to_pipe_str(self) -> String {
        let mut parts = Vec::new();
        if self.contains(PatternFlags::IGNORECASE) {
            parts.push("IGNORECASE");
        }
        if self.contains(PatternFlags::DOTALL) {
            parts.push("DOTALL");
        }
        if self.contains(PatternFlags::MULTILINE) {
            parts.push("MULTILINE");
        }
        if self.contains(PatternFlags::ASCII) {
            parts.push("ASCII");
        }
        if self.contains(PatternFlags::VERBOSE) {
            parts.push("VERBOSE");
        }
        if self.contains(PatternFlags::UNICODE) {
            parts.push("UNICODE");
        }
        parts.join("|")
    }

    /// Apply the flags this bitset supports onto a `regex::RegexBuilder`.
    /// `VERBOSE` has no builder equivalent — see `strip_verbose_whitespace`.
    pub fn apply(self, builder: &mut regex::RegexBuilder) {
        builder.case_insensitive(self.contains(PatternFlags::IGNORECASE));
        builder.dot_matches_new_line(self.contains(PatternFlags::DOTALL));
        builder.multi_line(self.contains(PatternFlags::MULTILINE));
        if self.contains(PatternFlags::ASCII) {
            builder.unicode(false);
        }
    }

    /// Python's `re.VERBOSE` strips unescaped whitespace and `#`-comments
    /// from the pattern before compiling. `regex`'s builder has no such
    /// flag, so when `VERBOSE` is set the pattern source is preprocessed
    /// before reaching `RegexBuilder`.
    pub fn strip_verbose_whitespace(self, pattern: &str) -> String {
        if !self.contains(PatternFlags::VERBOSE) {
            return pattern.to_string();
        }
        let mut out = String::with_capacity(pattern.len());
        let mut chars = pattern.chars().peekable();
        let mut in_class = false;
        while let Some(c) = chars.next() {
            match c {
                '\\' => {
                    out.push(c);
                    if let Some(next) = chars.next() {
                        out.push(next);
                    }
                }
                '[' => {
                    in_class = true;
                    out.push(c);
                }
                ']' => {
                    in_class = false;
                    out.push(c);
                }
                '#' if !in_class => {
                    while let Some(&next) = chars.peek() {
                        if next == '\n' {
                            break;
                        }
                        chars.next();
                    }
                }
                c if c.is_whitespace() && !in_class => {}
                c => out.push(c),
            }
        }
        out
    }
}

/// Facts about a chat-platform user, already extracted from whatever the
/// adapter's native SDK type is (§6 chat platform boundary). Consumed by
/// `IndexManager::update_user` / `bulk_update_users` — the index never
/// touches a serenity type directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserFacts {
    pub user_id: Snowflake,
    pub username: String,
    pub display_name: String,
    pub guild_id: Snowflake,
    pub guild_name: String,
    /// Role names, `@everyone` already excluded.
    pub roles: Vec<String>,
    pub avatar_url: Option<String>,
    pub status: Option<String>,
    pub is_bot: bool,
}

/// Channel/thread kind (§3 `ChannelIndexEntry.channel_type`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Text,
    PublicThread,
    PrivateThread,
    NewsThread,
    Voice,
    Other,
}

impl ChannelKind {
    pub fn is_thread(self) -> bool {
        matches!(self, ChannelKind::PublicThread | ChannelKind::PrivateThread | ChannelKind::NewsThread)
    }

    /// Lowercase `snake_case` label, matching the serialised form, for
    /// rendering into the channel-info context block.
    pub fn label(self) -> &'static str {
        match self {
            ChannelKind::Text => "text",
            ChannelKind::PublicThread => "public_thread",
            ChannelKind::PrivateThread => "private_thread",
            ChannelKind::NewsThread => "news_thread",
            ChannelKind::Voice => "voice",
            ChannelKind::Other => "other",
        }
    }
}

/// Facts about a channel, already extracted from the native SDK type.
/// Threads carry their own `channel_id`/`channel_name` plus whatever parent
/// facts the adapter resolved (`parent_topic`, `parent_category`,
/// `parent_is_nsfw`) so `IndexManager::update_channel` can apply the
/// thread-fallback rules in §4.2 without reaching back into the adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelFacts {
    pub channel_id: Snowflake,
    pub guild_id: Snowflake,
    pub channel_name: String,
    pub channel_type: ChannelKind,
    pub topic: Option<String>,
    pub category_name: Option<String>,
    pub is_nsfw: bool,
    pub guild_name: Option<String>,
    pub guild_description: Option<String>,
    /// Set only when `channel_type.is_thread()`; used for topic/category/NSFW fallback.
    pub parent_topic: Option<String>,
    pub parent_category: Option<String>,
    pub parent_is_nsfw: Option<bool>,
}

/// One attachment or embed reference on an inbound message, already
/// classified by the adapter into a media kind the extraction logic (§4.3.1)
/// can act on without knowing about Discord attachment/embed shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMediaRef {
    pub url: String,
    pub kind: RawMediaKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawMediaKind {
    Image,
    Document,
    /// Video / animated GIF — dropped entirely per §4.3.1 step 1-3.
    Video,
    /// A non-media embed, recorded in `embed_urls` but never placed in
    /// multimodal parts.
    OtherEmbed,
}

/// A message as received from (or replayed from history by) the chat
/// platform boundary — the input to `ConversationStore::add`/`bulk_add`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub message_id: Snowflake,
    pub channel_id: Snowflake,
    pub guild_id: Snowflake,
    pub author: UserFacts,
    pub is_bot_response: bool,
    pub is_self_bot_response: bool,
    pub referenced_message_id: Option<Snowflake>,
    pub content: String,
    pub timestamp: i64,
    pub attachments: Vec<RawMediaRef>,
    pub embeds: Vec<RawMediaRef>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_part_serializes_with_tagged_shape() {
        let part = ContentPart::image("https://example.com/a.png");
        let json = serde_json::to_value(&part).unwrap();
        assert_eq!(json["type"], "image_url");
        assert_eq!(json["image_url"]["url"], "https://example.com/a.png");
    }

    #[test]
    fn pattern_flags_round_trip_pipe_string() {
        let flags = PatternFlags::from_pipe_str("IGNORECASE|DOTALL");
        assert!(flags.contains(PatternFlags::IGNORECASE));
        assert!(flags.contains(PatternFlags::DOTALL));
        assert!(!flags.contains(PatternFlags::MULTILINE));
        assert_eq!(flags.to_pipe_str(), "IGNORECASE|DOTALL");
    }

    #[test]
    fn pattern_flags_ignores_unknown_tokens() {
        let flags = PatternFlags::from_pipe_str("IGNORECASE|BOGUS");
        assert_eq!(flags, PatternFlags::IGNORECASE);
    }

    #[test]
    fn verbose_strips_whitespace_and_comments_outside_class() {
        let flags = PatternFlags::VERBOSE;
        let stripped = flags.strip_verbose_whitespace("foo \\d+ # a comment\n[ a b ]");
        assert_eq!(stripped, "foo\\d+[ a b ]");
    }
}
