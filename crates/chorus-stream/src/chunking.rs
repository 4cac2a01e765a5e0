//! Paragraph/line/word-aware message splitting for Discord's 2000-char limit.

/// Split `text` into chunks of at most `limit` characters.
///
/// Preserves paragraph breaks (`\n\n`) and line breaks (`\n`) where possible:
/// whole paragraphs are packed together up to the limit; a paragraph that
/// alone exceeds the limit is split by line; a line that alone exceeds the
/// limit is split by word; a word that alone exceeds the limit is hard-cut
/// every `limit` chars. Never emits empty or whitespace-only chunks.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for paragraph in split_keep_delim(text, "\n\n") {
        if paragraph.trim().is_empty() {
            continue;
        }
        if current.is_empty() {
            if paragraph.len() <= limit {
                current = paragraph.to_string();
                continue;
            }
        } else if current.len() + paragraph.len() <= limit {
            current.push_str(&paragraph);
            continue;
        }

        if !current.trim().is_empty() {
            chunks.push(std::mem::take(&mut current));
        }

        if paragraph.len() <= limit {
            current = paragraph.to_string();
        } else {
            chunks.extend(split_by_line(&paragraph, limit));
        }
    }

    if !current.trim().is_empty() {
        chunks.push(current);
    }

    if chunks.is_empty() {
        chunks.push(String::new());
    }

    chunks.retain(|c| !c.trim().is_empty());
    if chunks.is_empty() {
        chunks.push(text.chars().take(limit).collect());
    }
    chunks
}

/// Split `text` on `delim`, keeping the delimiter attached to the preceding
/// piece so re-joining pieces reproduces the original text.
fn split_keep_delim<'a>(text: &'a str, delim: &str) -> Vec<&'a str> {
    let mut pieces = Vec::new();
    let mut rest = text;
    while let Some(idx) = rest.find(delim) {
        let end = idx + delim.len();
        pieces.push(&rest[..end]);
        rest = &rest[end..];
    }
    if !rest.is_empty() {
        pieces.push(rest);
    }
    pieces
}

fn split_by_line(paragraph: &str, limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for line in split_keep_delim(paragraph, "\n") {
        if current.len() + line.len() <= limit {
            current.push_str(line);
            continue;
        }
        if !current.trim().is_empty() {
            chunks.push(std::mem::take(&mut current));
        }
        if line.len() <= limit {
            current = line.to_string();
        } else {
            chunks.extend(split_by_word(line, limit));
        }
    }

    if !current.trim().is_empty() {
        chunks.push(current);
    }
    chunks
}

fn split_by_word(line: &str, limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for word in split_keep_delim(line, " ") {
        if current.len() + word.len() <= limit {
            current.push_str(word);
            continue;
        }
        if !current.trim().is_empty() {
            chunks.push(std::mem::take(&mut current));
        }
        if word.len() <= limit {
            current = word.to_string();
        } else {
            chunks.extend(hard_cut(word, limit));
        }
    }

    if !current.trim().is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Hard-cut a single oversized word every `limit` chars (char-boundary safe).
fn hard_cut(word: &str, limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut buf = String::new();
    for c in word.chars() {
        if buf.len() + c.len_utf8() > limit {
            chunks.push(std::mem::take(&mut buf));
        }
        buf.push(c);
    }
    if !buf.is_empty() {
        chunks.push(buf);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_single_chunk() {
        let chunks = split_message("hello world", 2000);
        assert_eq!(chunks, vec!["hello world"]);
    }

    #[test]
    fn never_emits_empty_chunks() {
        let chunks = split_message("\n\n\n\n", 2000);
        assert!(chunks.iter().all(|c| !c.trim().is_empty()));
    }

    #[test]
    fn preserves_paragraph_breaks_when_they_fit() {
        let text = "para one\n\npara two";
        let chunks = split_message(text, 2000);
        assert_eq!(chunks, vec![text]);
    }

    #[test]
    fn splits_oversized_paragraph_by_line() {
        let line_a = "a".repeat(60);
        let line_b = "b".repeat(60);
        let text = format!("{line_a}\n{line_b}");
        let chunks = split_message(&text, 80);
        assert!(chunks.len() >= 2);
        for c in &chunks {
            assert!(c.len() <= 80, "chunk too large: {}", c.len());
        }
    }

    #[test]
    fn splits_oversized_line_by_word() {
        let words = vec!["word"; 50].join(" ");
        let chunks = split_message(&words, 30);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.len() <= 30);
        }
    }

    #[test]
    fn hard_cuts_oversized_single_word() {
        let text = "x".repeat(100);
        let chunks = split_message(&text, 30);
        assert!(chunks.len() >= 4);
        for c in &chunks {
            assert!(c.len() <= 30);
        }
    }

    #[test]
    fn reassembly_preserves_all_non_whitespace_content() {
        let text = "first paragraph here\n\nsecond paragraph is quite a bit longer than the first one was";
        let chunks = split_message(text, 40);
        let rejoined: String = chunks.concat();
        let original_words: Vec<&str> = text.split_whitespace().collect();
        let rejoined_words: Vec<&str> = rejoined.split_whitespace().collect();
        assert_eq!(original_words, rejoined_words);
    }
}
