const SNIPPET_TARGET_PERCENTAGE: f64 = 0.3;
const SNIPPET_MIN_LENGTH: usize = 30;
const SNIPPET_MAX_LENGTH: usize = 150;
const LONG_MESSAGE_THRESHOLD: usize = 500;

/// Truncate `content` to at most `max_len` chars, preferring a sentence
/// boundary, then a phrase boundary, then a word boundary, finally a hard
/// cut with a trailing `...` (§4.5 `smart_snippet`).
fn intelligent_truncate(content: &str, max_len: usize) -> String {
    let chars: Vec<char> = content.chars().collect();
    if chars.len() <= max_len {
        return content.to_string();
    }
    let truncated: String = chars[..max_len].iter().collect();

    let sentence_end = ['.', '!', '?']
        .iter()
        .filter_map(|p| truncated.rfind(*p))
        .max();
    if let Some(pos) = sentence_end {
        if pos > 0 {
            return truncated[..pos + 1].to_string();
        }
    }

    let phrase_end = [',', ';', ':'].iter().filter_map(|p| truncated.rfind(*p)).max();
    if let Some(pos) = phrase_end {
        if pos > 0 {
            return truncated[..pos + 1].to_string();
        }
    }

    if let Some(pos) = truncated.rfind(' ') {
        if pos > 0 {
            return format!("{}...", &truncated[..pos]);
        }
    }

    format!("{truncated}...")
}

/// Context-aware truncation for reply snippets and pinned-message previews.
pub fn smart_snippet(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let len = text.chars().count();
    if len <= SNIPPET_MAX_LENGTH {
        return text.to_string();
    }

    if len > LONG_MESSAGE_THRESHOLD {
        let chars: Vec<char> = text.chars().collect();
        let half = SNIPPET_MAX_LENGTH / 2;
        let start_snippet = intelligent_truncate(text, half);
        let tail: String = chars[chars.len().saturating_sub(half)..].iter().collect();
        let end_snippet = intelligent_truncate(&tail, half);
        return format!("{start_snippet} ... {end_snippet}");
    }

    let target = ((len as f64) * SNIPPET_TARGET_PERCENTAGE) as usize;
    let final_len = target.clamp(SNIPPET_MIN_LENGTH, SNIPPET_MAX_LENGTH);
    intelligent_truncate(text, final_len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_returned_unchanged() {
        assert_eq!(smart_snippet("hello"), "hello");
    }

    #[test]
    fn medium_text_truncates_at_percentage() {
        let text = "a".repeat(300);
        let snippet = smart_snippet(&text);
        assert!(snippet.len() <= 153);
    }

    #[test]
    fn long_text_gets_head_and_tail() {
        let text = format!("{}. {}", "x".repeat(600), "end of message");
        let snippet = smart_snippet(&text);
        assert!(snippet.contains(" ... "));
    }

    #[test]
    fn prefers_sentence_boundary() {
        let text = format!("First sentence here. {}", "y".repeat(200));
        let snippet = smart_snippet(&text);
        assert!(snippet.starts_with("First sentence here."));
    }
}
