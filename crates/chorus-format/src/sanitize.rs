use std::collections::HashMap;
use std::sync::OnceLock;

use chorus_core::Snowflake;
use chorus_index::UserIndexEntry;
use regex::Regex;

fn emote_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<a?:\w+:\d+>").unwrap())
}

fn mention_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<@!?(\d+)>").unwrap())
}

fn role_mention_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<@&(\d+)>").unwrap())
}

fn mass_mention_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)@(everyone|here)").unwrap())
}

fn trailing_numeric_marker_re() -> &'static Regex {
    // `regex` has no lookbehind; capture the whitespace that would have
    // been the lookbehind and splice it back in via the replacement.
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)(\s):(\d+\.?)\s*$").unwrap())
}

fn collapse_whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").unwrap())
}

fn space_before_punct_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+([.,!?:;])").unwrap())
}

fn horizontal_whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[ \t]+").unwrap())
}

fn excess_newlines_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n{3,}").unwrap())
}

fn parrot_full_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*\[\d+\]\s*(\[id:\d+\]\s*)?.*?:\s*").unwrap())
}

fn parrot_replying_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[Replying to #\d+\]\s*").unwrap())
}

fn parrot_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[id:\d+\]\s*").unwrap())
}

fn parrot_stray_index_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s*\[\d{1,3}\]\s*").unwrap())
}

fn username_colon_prefix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*[^:\n.!?]{1,60}:\s*").unwrap())
}

/// Emote-placeholder protection shared by both sanitisation passes.
fn protect_emotes(content: &str) -> (String, HashMap<String, String>) {
    let mut placeholders = HashMap::new();
    let mut counter = 0usize;
    let replaced = emote_re()
        .replace_all(content, |caps: &regex::Captures| {
            let placeholder = format!("__EMOTE__{counter}__");
            placeholders.insert(placeholder.clone(), caps[0].to_string());
            counter += 1;
            placeholder
        })
        .to_string();
    (replaced, placeholders)
}

fn restore_emotes(content: &str, placeholders: &HashMap<String, String>) -> String {
    let mut out = content.to_string();
    for (placeholder, emote) in placeholders {
        out = out.replace(placeholder, emote);
    }
    out
}

fn names_pattern(user_index: &HashMap<Snowflake, UserIndexEntry>) -> Option<(Regex, HashMap<String, String>)> {
    let mut name_to_username: HashMap<String, String> = HashMap::new();
    for user in user_index.values() {
        name_to_username.insert(user.display_name.to_lowercase(), format!("@{}", user.username));
        name_to_username.insert(user.username.to_lowercase(), format!("@{}", user.username));
    }
    let mut names: Vec<&String> = name_to_username.keys().filter(|n| n.chars().count() >= 3).collect();
    names.sort_by_key(|n| std::cmp::Reverse(n.len()));
    if names.is_empty() {
        return None;
    }
    let escaped: Vec<String> = names.iter().map(|n| regex::escape(n)).collect();
    let pattern = format!(
        r"(?i)(?:[\s\*_~`\x{{2b50}}]*)({})(?:[\s\*_~`\x{{2b50}}]*)",
        escaped.join("|")
    );
    Regex::new(&pattern).ok().map(|re| (re, name_to_username))
}

/// Convert Discord-native formatting and plain-text names into the
/// `@username` form the LLM is given (§4.5 `discord_to_llm_readable`).
pub fn discord_to_llm_readable(content: &str, user_index: &HashMap<Snowflake, UserIndexEntry>) -> String {
    if user_index.is_empty() {
        return content.to_string();
    }

    let (mut text, placeholders) = protect_emotes(content);

    text = mention_re()
        .replace_all(&text, |caps: &regex::Captures| {
            let id: Snowflake = caps[1].parse().unwrap_or(0);
            match user_index.get(&id) {
                Some(user) => format!("@{}", user.username),
                None => "@Unknown User".to_string(),
            }
        })
        .to_string();

    if let Some((pattern, name_to_username)) = names_pattern(user_index) {
        text = pattern
            .replace_all(&text, |caps: &regex::Captures| {
                let matched = caps[1].to_lowercase();
                name_to_username.get(&matched).cloned().unwrap_or_else(|| caps[0].to_string())
            })
            .to_string();
    }

    text = restore_emotes(&text, &placeholders);

    text = trailing_numeric_marker_re().replace_all(&text, "$1").to_string();
    text = collapse_whitespace_re().replace_all(&text, " ").to_string();
    text = space_before_punct_re().replace_all(&text, "$1").to_string();
    text.trim().to_string()
}

/// Defensive pass applied to every LLM output before it reaches Discord
/// (§4.5 `llm_to_discord`): strips mass mentions and parroted context
/// markers, rewrites mentions to display names, neutralises role pings.
pub fn llm_to_discord(
    text: &str,
    user_index: &HashMap<Snowflake, UserIndexEntry>,
    role_names: &HashMap<Snowflake, String>,
    creator_user_id: Option<Snowflake>,
    creator_display: &str,
) -> String {
    let (mut out, placeholders) = protect_emotes(text);

    out = mass_mention_re().replace_all(&out, "").to_string();

    out = parrot_full_line_re().replace(&out, "").to_string();
    out = parrot_replying_re().replace_all(&out, "").to_string();
    out = parrot_id_re().replace_all(&out, "").to_string();
    out = parrot_stray_index_re().replace_all(&out, " ").to_string();

    out = username_colon_prefix_re().replace(&out, "").trim().to_string();

    out = mention_re()
        .replace_all(&out, |caps: &regex::Captures| {
            let id: Snowflake = caps[1].parse().unwrap_or(0);
            if Some(id) == creator_user_id {
                return creator_display.to_string();
            }
            match user_index.get(&id) {
                Some(user) => user.display_name.clone(),
                None => "`@Unknown User`".to_string(),
            }
        })
        .to_string();

    out = role_mention_re()
        .replace_all(&out, |caps: &regex::Captures| {
            let id: Snowflake = caps[1].parse().unwrap_or(0);
            match role_names.get(&id) {
                Some(name) => format!("`@{name}`"),
                None => "`@deleted-role`".to_string(),
            }
        })
        .to_string();

    if let Some((pattern, name_to_username)) = names_pattern(user_index) {
        out = pattern
            .replace_all(&out, |caps: &regex::Captures| {
                let matched = caps[1].to_lowercase();
                let Some(at_username) = name_to_username.get(&matched) else {
                    return caps[0].to_string();
                };
                let username = at_username.trim_start_matches('@');
                let user = user_index.values().find(|u| u.username == username);
                match user {
                    Some(u) if Some(u.user_id) == creator_user_id => creator_display.to_string(),
                    Some(u) => u.display_name.clone(),
                    None => caps[0].to_string(),
                }
            })
            .to_string();
    }

    out = restore_emotes(&out, &placeholders);

    out = horizontal_whitespace_re().replace_all(&out, " ").to_string();
    out = excess_newlines_re().replace_all(&out, "\n\n").to_string();
    out = space_before_punct_re().replace_all(&out, "$1").to_string();

    out = role_mention_re().replace_all(&out, "`<@&$1>`").to_string();
    out = mention_re().replace_all(&out, "`<@$1>`").to_string();

    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> HashMap<Snowflake, UserIndexEntry> {
        let mut map = HashMap::new();
        map.insert(
            1,
            UserIndexEntry {
                user_id: 1,
                username: "alice".to_string(),
                display_name: "Alice W".to_string(),
                guild_id: 1,
                guild_name: "g".to_string(),
                roles: Vec::new(),
                avatar_url: None,
                status: None,
                first_seen: 0,
                last_seen: 0,
                message_count: 0,
                is_bot: false,
            },
        );
        map
    }

    #[test]
    fn mention_resolves_to_username() {
        let out = discord_to_llm_readable("hi <@1> there", &index());
        assert_eq!(out, "hi @alice there");
    }

    #[test]
    fn unknown_mention_falls_back() {
        let out = discord_to_llm_readable("hi <@999>", &index());
        assert!(out.contains("@Unknown User"));
    }

    #[test]
    fn llm_to_discord_strips_mass_mentions() {
        let out = llm_to_discord("@everyone hello", &index(), &HashMap::new(), None, "");
        assert!(!out.to_lowercase().contains("everyone"));
    }

    #[test]
    fn llm_to_discord_rewrites_mention_to_display_name() {
        let out = llm_to_discord("hi <@1>", &index(), &HashMap::new(), None, "");
        assert!(out.contains("Alice W"));
    }

    #[test]
    fn llm_to_discord_uses_creator_override() {
        let out = llm_to_discord("hi <@1>", &index(), &HashMap::new(), Some(1), "\u{2b50} **Creator**");
        assert!(out.contains("Creator"));
    }

    #[test]
    fn llm_to_discord_strips_parrot_prefix() {
        let out = llm_to_discord("[1] [id:1] alice: actual reply", &index(), &HashMap::new(), None, "");
        assert_eq!(out, "actual reply");
    }

    #[test]
    fn llm_to_discord_code_wraps_leftover_role_mentions() {
        let out = llm_to_discord("ping <@&555>", &index(), &HashMap::new(), None, "");
        assert!(out.contains("`@deleted-role`"));
    }
}
