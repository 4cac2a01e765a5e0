//! The validity gate (§4.3, glossary "Validity gate") that decides whether a
//! message enters conversation history.

use std::sync::OnceLock;

use crate::types::ConversationMessage;

const COMMAND_PREFIXES: &[char] = &['!', '/', '$', '?', '.', '-', '+', '>', '<', '=', '~', '`'];

fn mention_regex() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"<@!?\d+>").expect("static regex"))
}

fn emote_regex() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"<a?:\w+:\d+>").expect("static regex"))
}

fn tool_prefix_regex() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"^[A-Za-z0-9]{1,5}!").expect("static regex"))
}

/// One step of the validity evaluation, surfaced to the diagnostic command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceStep {
    pub rule: &'static str,
    pub passed: bool,
    pub detail: String,
}

/// Pure validity check: does `msg` belong in conversation history? Returns
/// the verdict plus a step-by-step trace usable by a diagnostic command.
pub fn is_valid_context_message_traced(msg: &ConversationMessage) -> (bool, Vec<TraceStep>) {
    let mut trace = Vec::new();
    let has_mentions_or_emotes = mention_regex().is_match(&msg.content) || emote_regex().is_match(&msg.content);
    let has_attachments = !msg.attachment_urls.is_empty();

    if msg.content.is_empty() && msg.attachment_urls.is_empty() {
        trace.push(TraceStep {
            rule: "empty_content_and_no_attachments",
            passed: false,
            detail: "content and attachment_urls are both empty".into(),
        });
        return (false, trace);
    }
    trace.push(TraceStep {
        rule: "empty_content_and_no_attachments",
        passed: true,
        detail: "content or attachments present".into(),
    });

    let stripped = emote_regex().replace_all(&mention_regex().replace_all(&msg.content, ""), "");
    let has_alnum = stripped.chars().any(|c| c.is_alphanumeric());

    if !has_alnum {
        if has_mentions_or_emotes || has_attachments {
            trace.push(TraceStep {
                rule: "no_alphanumeric_residue",
                passed: true,
                detail: "residue is empty but mentions/emotes/attachments retain the message".into(),
            });
        } else {
            trace.push(TraceStep {
                rule: "no_alphanumeric_residue",
                passed: false,
                detail: format!("residue {:?} has no alphanumeric characters", stripped),
            });
            return (false, trace);
        }
    } else {
        trace.push(TraceStep {
            rule: "no_alphanumeric_residue",
            passed: true,
            detail: "residue contains alphanumeric characters".into(),
        });
    }

    let trimmed = stripped.trim_start();
    if let Some(first) = trimmed.chars().next() {
        if COMMAND_PREFIXES.contains(&first) {
            trace.push(TraceStep {
                rule: "command_prefix",
                passed: false,
                detail: format!("residue starts with command prefix '{first}'"),
            });
            return (false, trace);
        }
    }
    trace.push(TraceStep {
        rule: "command_prefix",
        passed: true,
        detail: "residue does not start with a command prefix".into(),
    });

    if tool_prefix_regex().is_match(trimmed) {
        trace.push(TraceStep {
            rule: "tool_style_prefix",
            passed: false,
            detail: format!("residue matches tool-style prefix pattern: {trimmed:?}"),
        });
        return (false, trace);
    }
    trace.push(TraceStep {
        rule: "tool_style_prefix",
        passed: true,
        detail: "residue does not match a tool-style prefix".into(),
    });

    (true, trace)
}

/// [`is_valid_context_message_traced`] without the trace, for hot paths.
pub fn is_valid_context_message(msg: &ConversationMessage) -> bool {
    is_valid_context_message_traced(msg).0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chorus_core::ContentPart;

    fn msg(content: &str, attachments: Vec<String>) -> ConversationMessage {
        ConversationMessage {
            message_id: 1,
            user_id: 1,
            username: "u".into(),
            content: content.to_string(),
            timestamp: 0,
            is_bot_response: false,
            is_self_bot_response: false,
            referenced_message_id: None,
            attachment_urls: attachments,
            embed_urls: vec![],
            multimodal_content: if content.is_empty() {
                vec![]
            } else {
                vec![ContentPart::text(content)]
            },
        }
    }

    #[test]
    fn rejects_empty_content_and_no_attachments() {
        assert!(!is_valid_context_message(&msg("", vec![])));
    }

    #[test]
    fn accepts_attachment_only_message() {
        assert!(is_valid_context_message(&msg("", vec!["https://x/a.png".into()])));
    }

    #[test]
    fn rejects_command_prefix() {
        assert!(!is_valid_context_message(&msg("!roll 1d20", vec![])));
    }

    #[test]
    fn rejects_tool_style_prefix() {
        assert!(!is_valid_context_message(&msg("p!help", vec![])));
        assert!(!is_valid_context_message(&msg("ocr!status", vec![])));
    }

    #[test]
    fn accepts_plain_text() {
        assert!(is_valid_context_message(&msg("hello there", vec![])));
    }

    #[test]
    fn accepts_mention_only_message_with_no_residue_retained() {
        // Residue is empty after stripping, but the original had a mention → retained.
        assert!(is_valid_context_message(&msg("<@123>", vec![])));
    }

    #[test]
    fn rejects_plain_punctuation_with_no_mentions_or_attachments() {
        assert!(!is_valid_context_message(&msg("...", vec![])));
    }

    #[test]
    fn accepts_mention_plus_emote_with_no_alnum_residue_retained() {
        // "<@123> <:wave:456>" strips to whitespace, but mentions/emotes present → retained.
        assert!(is_valid_context_message(&msg("<@123> <:wave:456>", vec![])));
    }

    #[test]
    fn idempotent_across_repeated_calls() {
        let m = msg("hello <@123> world", vec![]);
        let (first, _) = is_valid_context_message_traced(&m);
        let (second, _) = is_valid_context_message_traced(&m);
        assert_eq!(first, second);
    }
}
