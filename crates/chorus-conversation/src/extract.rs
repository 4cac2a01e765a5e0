//! Discord-message → context extraction (§4.3.1).
//!
//! Produces the cleaned `content` string, the ordered `attachment_urls` /
//! `embed_urls`, and the canonical `multimodal_content` parts fed to the LLM,
//! from a platform-agnostic [`RawMessage`].

use chorus_core::{ContentPart, RawMediaKind, RawMediaRef, RawMessage};
use std::sync::OnceLock;

const IMAGE_EXTS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp"];
const DOCUMENT_EXTS: &[&str] = &["pdf", "txt", "log", "ini", "json", "xml", "csv", "md"];

fn url_regex() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"https?://\S+").expect("static regex"))
}

fn extension_of(url: &str) -> String {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    without_query
        .rsplit('.')
        .next()
        .unwrap_or("")
        .to_lowercase()
}

fn clean_trailing_punctuation(url: &str) -> &str {
    url.trim_end_matches(['.', ',', '!', '?'])
}

pub struct Extracted {
    pub content: String,
    pub attachment_urls: Vec<String>,
    pub embed_urls: Vec<String>,
    pub multimodal_content: Vec<ContentPart>,
}

/// Run the full §4.3.1 pipeline over a raw message.
pub fn extract_context(raw: &RawMessage) -> Extracted {
    let mut content = raw.content.clone();
    let mut image_urls: Vec<String> = Vec::new();
    let mut document_urls: Vec<String> = Vec::new();
    let mut embed_urls: Vec<String> = Vec::new();

    // Step 1: scan `content` for bare URLs.
    let mut to_strip: Vec<String> = Vec::new();
    for m in url_regex().find_iter(&raw.content) {
        let url = clean_trailing_punctuation(m.as_str()).to_string();
        let ext = extension_of(&url);
        if IMAGE_EXTS.contains(&ext.as_str()) {
            image_urls.push(url.clone());
            to_strip.push(m.as_str().to_string());
        } else if DOCUMENT_EXTS.contains(&ext.as_str()) {
            document_urls.push(url.clone());
            to_strip.push(m.as_str().to_string());
        }
    }
    for raw_match in &to_strip {
        content = content.replace(raw_match.as_str(), "");
    }

    // Steps 2 & 3: attachments and embeds, already classified by the adapter.
    for media in raw.attachments.iter().chain(raw.embeds.iter()) {
        classify_one(media, &mut content, &mut image_urls, &mut document_urls, &mut embed_urls);
    }

    // Step 4: collapse whitespace, trim.
    content = collapse_whitespace(&content);

    let mut attachment_urls = Vec::with_capacity(image_urls.len() + document_urls.len());
    attachment_urls.extend(image_urls.iter().cloned());
    attachment_urls.extend(document_urls.iter().cloned());

    let mut multimodal_content = Vec::new();
    if !content.is_empty() {
        multimodal_content.push(ContentPart::text(content.clone()));
    }
    for url in &image_urls {
        multimodal_content.push(ContentPart::image(url.clone()));
    }
    for url in &document_urls {
        multimodal_content.push(ContentPart::document(url.clone()));
    }

    Extracted {
        content,
        attachment_urls,
        embed_urls,
        multimodal_content,
    }
}

fn classify_one(
    media: &RawMediaRef,
    content: &mut String,
    image_urls: &mut Vec<String>,
    document_urls: &mut Vec<String>,
    embed_urls: &mut Vec<String>,
) {
    match media.kind {
        RawMediaKind::Image => image_urls.push(media.url.clone()),
        RawMediaKind::Document => document_urls.push(media.url.clone()),
        RawMediaKind::Video => {
            // Videos/animated GIFs are useless to a text/vision LLM — drop
            // entirely, stripping the URL from `content` if it was quoted there.
            *content = content.replace(media.url.as_str(), "");
        }
        RawMediaKind::OtherEmbed => embed_urls.push(media.url.clone()),
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chorus_core::UserFacts;

    fn author() -> UserFacts {
        UserFacts {
            user_id: 1,
            username: "a".into(),
            display_name: "a".into(),
            guild_id: 1,
            guild_name: "g".into(),
            roles: vec![],
            avatar_url: None,
            status: None,
            is_bot: false,
        }
    }

    fn raw(content: &str, attachments: Vec<RawMediaRef>) -> RawMessage {
        RawMessage {
            message_id: 1,
            channel_id: 1,
            guild_id: 1,
            author: author(),
            is_bot_response: false,
            is_self_bot_response: false,
            referenced_message_id: None,
            content: content.to_string(),
            timestamp: 0,
            attachments,
            embeds: vec![],
        }
    }

    #[test]
    fn strips_image_url_from_content_and_captures_it() {
        let raw = raw("check this out https://cdn.example.com/a.png now", vec![]);
        let out = extract_context(&raw);
        assert_eq!(out.content, "check this out now");
        assert_eq!(out.attachment_urls, vec!["https://cdn.example.com/a.png"]);
        assert!(matches!(out.multimodal_content[0], ContentPart::Text { .. }));
        assert!(matches!(out.multimodal_content[1], ContentPart::Image { .. }));
    }

    #[test]
    fn video_attachment_is_dropped_and_stripped_from_content() {
        let url = "https://cdn.example.com/clip.mp4".to_string();
        let raw = raw(
            &format!("look {url}"),
            vec![RawMediaRef { url: url.clone(), kind: RawMediaKind::Video }],
        );
        let out = extract_context(&raw);
        assert_eq!(out.content, "look");
        assert!(out.attachment_urls.is_empty());
    }

    #[test]
    fn other_embed_recorded_but_not_multimodal() {
        let raw = raw(
            "a link",
            vec![RawMediaRef { url: "https://example.com/article".into(), kind: RawMediaKind::OtherEmbed }],
        );
        let out = extract_context(&raw);
        assert_eq!(out.embed_urls, vec!["https://example.com/article"]);
        assert!(out.multimodal_content.iter().all(|p| p.url() != Some("https://example.com/article")));
    }

    #[test]
    fn text_parts_concatenation_matches_content_invariant() {
        let raw = raw("hello   world  ", vec![]);
        let out = extract_context(&raw);
        let text: String = out
            .multimodal_content
            .iter()
            .filter_map(ContentPart::as_text)
            .collect();
        assert_eq!(text, out.content);
        assert_eq!(out.content, "hello world");
    }
}
