use chorus_core::ContentPart;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// `content` is a single string when the message is text-only, otherwise a
/// list of typed parts (§4.5 `format_context_for_llm`). Modelled as an
/// untagged enum so the wire shape matches exactly without a wrapper object.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum HistoryContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub content: HistoryContent,
}
