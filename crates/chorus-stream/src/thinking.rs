//! Streaming-safe stripping of inline "thinking" markup from model output.
//!
//! Some providers interleave reasoning and answer text in the same content
//! stream using ad-hoc tags (`<think>`, `<thinking>`, `<thought>`) or
//! markdown-ish markers (`[thinking]`/`[/thinking]`, `*thinking*` as a
//! toggle). Because this runs against a partially-received buffer on every
//! throttle tick, it has to tolerate a tag that hasn't closed yet.

const OPEN_TAGS: [&str; 4] = ["<think>", "<thinking>", "<thought>", "[thinking]"];
const CLOSE_TAGS: [&str; 4] = ["</think>", "</thinking>", "</thought>", "[/thinking]"];
/// `*thinking*` has no distinct open/close spelling; it toggles state like
/// the bracket form collapsed into a single marker.
const TOGGLE_TAG: &str = "*thinking*";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StripResult {
    /// Visible text with all thinking markup and its contents removed.
    pub cleaned: String,
    /// Concatenated thinking-tag contents, if any were seen.
    pub thinking_content: Option<String>,
    /// True when the buffer so far is entirely inside an (open or closed)
    /// thinking block, i.e. `cleaned.trim()` is empty.
    pub is_thinking_only: bool,
    /// `**bold**`-only lines found inside thinking content, in order —
    /// structured progress headers some providers emit mid-reasoning.
    pub summaries: Vec<String>,
}

/// Scan `full` for thinking markup and separate it from visible text.
/// Handles an unclosed trailing tag by treating everything after it as
/// thinking content.
pub fn strip_thinking_tags(full: &str) -> StripResult {
    let mut cleaned = String::new();
    let mut thinking = String::new();
    let mut saw_thinking = false;
    let mut pos = 0usize;
    let mut in_thinking = false;

    while pos < full.len() {
        let rest = &full[pos..];
        if !in_thinking {
            match next_open_tag(rest) {
                Some((offset, tag_len)) => {
                    cleaned.push_str(&rest[..offset]);
                    pos += offset + tag_len;
                    in_thinking = true;
                    saw_thinking = true;
                }
                None => {
                    cleaned.push_str(rest);
                    break;
                }
            }
        } else {
            match next_close_tag(rest) {
                Some((offset, tag_len)) => {
                    thinking.push_str(&rest[..offset]);
                    pos += offset + tag_len;
                    in_thinking = false;
                }
                None => {
                    // Unclosed — remainder is thinking content.
                    thinking.push_str(rest);
                    break;
                }
            }
        }
    }

    let thinking_content = if saw_thinking { Some(thinking.clone()) } else { None };
    let summaries = thinking_content
        .as_deref()
        .map(extract_bold_summaries)
        .unwrap_or_default();

    StripResult {
        is_thinking_only: saw_thinking && cleaned.trim().is_empty(),
        cleaned,
        thinking_content,
        summaries,
    }
}

/// Find the nearest opening marker in `s`, returning (byte offset, marker length).
fn next_open_tag(s: &str) -> Option<(usize, usize)> {
    let mut best: Option<(usize, usize)> = None;
    for tag in OPEN_TAGS.iter().chain(std::iter::once(&TOGGLE_TAG)) {
        if let Some(idx) = s.find(tag) {
            let better = match best {
                Some((b, _)) => idx < b,
                None => true,
            };
            if better {
                best = Some((idx, tag.len()));
            }
        }
    }
    best
}

fn next_close_tag(s: &str) -> Option<(usize, usize)> {
    let mut best: Option<(usize, usize)> = None;
    for tag in CLOSE_TAGS.iter().chain(std::iter::once(&TOGGLE_TAG)) {
        if let Some(idx) = s.find(tag) {
            let better = match best {
                Some((b, _)) => idx < b,
                None => true,
            };
            if better {
                best = Some((idx, tag.len()));
            }
        }
    }
    best
}

/// Extract lines that are entirely a single `**bold**` span — the
/// progress-header convention some providers use inside their thinking text.
fn extract_bold_summaries(thinking: &str) -> Vec<String> {
    thinking
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            let stripped = line.strip_prefix("**")?.strip_suffix("**")?;
            if stripped.is_empty() || stripped.contains("**") {
                None
            } else {
                Some(stripped.to_string())
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_through_plain_text() {
        let r = strip_thinking_tags("just an answer");
        assert_eq!(r.cleaned, "just an answer");
        assert!(r.thinking_content.is_none());
        assert!(!r.is_thinking_only);
    }

    #[test]
    fn strips_closed_think_tag() {
        let r = strip_thinking_tags("<think>pondering</think>the answer");
        assert_eq!(r.cleaned, "the answer");
        assert_eq!(r.thinking_content.as_deref(), Some("pondering"));
        assert!(!r.is_thinking_only);
    }

    #[test]
    fn unclosed_tag_is_thinking_only() {
        let r = strip_thinking_tags("<thinking>still working on it");
        assert_eq!(r.cleaned, "");
        assert!(r.is_thinking_only);
        assert_eq!(r.thinking_content.as_deref(), Some("still working on it"));
    }

    #[test]
    fn bracket_variant_supported() {
        let r = strip_thinking_tags("[thinking]hmm[/thinking]done");
        assert_eq!(r.cleaned, "done");
        assert_eq!(r.thinking_content.as_deref(), Some("hmm"));
    }

    #[test]
    fn star_toggle_variant_supported() {
        let r = strip_thinking_tags("*thinking*reasoning here*thinking*final answer");
        assert_eq!(r.cleaned, "final answer");
        assert_eq!(r.thinking_content.as_deref(), Some("reasoning here"));
    }

    #[test]
    fn extracts_bold_summary_lines() {
        let r = strip_thinking_tags("<think>**Checking the docs**\nsome detail\n**Writing the fix**</think>done");
        assert_eq!(r.summaries, vec!["Checking the docs", "Writing the fix"]);
    }
}
