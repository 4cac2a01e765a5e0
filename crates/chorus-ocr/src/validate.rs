use std::sync::OnceLock;

use regex::Regex;

fn url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"https?://\S+").unwrap())
}

/// First HTTP(S) URL appearing in message content, used as a fallback OCR
/// source when the message carries no attachment (§4.7).
pub fn first_url(content: &str) -> Option<&str> {
    url_re().find(content).map(|m| m.as_str())
}

#[derive(Debug, Clone, Copy)]
pub struct AttachmentCandidate {
    pub content_type: Option<&'static str>,
    pub size_bytes: u64,
}

/// Cheap gateway-side pre-validation for a message attachment (§4.7 step 1):
/// content-type prefix `image/`, size under the configured cap. Dimensions
/// are checked separately once bytes are in hand (`check_dimensions`),
/// since a HEAD request alone can't report pixel size.
pub fn attachment_passes_cheap_checks(content_type: Option<&str>, size_bytes: u64, max_bytes: u64) -> bool {
    size_bytes < max_bytes && content_type.map(|ct| ct.starts_with("image/")).unwrap_or(false)
}

/// Decode only enough of `bytes` to read pixel dimensions (no full decode),
/// then check against the configured minimum.
pub fn check_dimensions(bytes: &[u8], min_width: u32, min_height: u32) -> Option<(u32, u32)> {
    let reader = image::io::Reader::new(std::io::Cursor::new(bytes)).with_guessed_format().ok()?;
    let (width, height) = reader.into_dimensions().ok()?;
    if width > min_width && height > min_height {
        Some((width, height))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_first_url_from_message() {
        assert_eq!(first_url("check this out https://example.com/a.png thanks"), Some("https://example.com/a.png"));
    }

    #[test]
    fn no_url_returns_none() {
        assert_eq!(first_url("no links here"), None);
    }

    #[test]
    fn cheap_checks_reject_oversized_attachment() {
        assert!(!attachment_passes_cheap_checks(Some("image/png"), 600_000, 500_000));
    }

    #[test]
    fn cheap_checks_reject_non_image_content_type() {
        assert!(!attachment_passes_cheap_checks(Some("video/mp4"), 100, 500_000));
    }

    #[test]
    fn cheap_checks_accept_small_image() {
        assert!(attachment_passes_cheap_checks(Some("image/jpeg"), 100, 500_000));
    }
}
