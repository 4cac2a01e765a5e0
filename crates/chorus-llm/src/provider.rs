use async_trait::async_trait;
use chorus_core::ContentPart;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::prompt::SystemPrompt;
use crate::stream::StreamEvent;
use crate::thinking::ThinkingLevel;

/// Classification of a provider's authentication mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    /// Plain API key (e.g. `sk-...`).
    ApiKey,
    /// OAuth access token with refresh capability.
    OAuth,
    /// Token exchanged from another credential (e.g. Copilot).
    Exchange,
    /// No authentication needed (e.g. local Ollama).
    None,
}

/// Snapshot of a provider's current authentication state.
#[derive(Debug, Clone, Serialize)]
pub struct TokenInfo {
    pub token_type: TokenType,
    /// Unix timestamp (seconds) when the token expires. `None` if unknown.
    pub expires_at: Option<i64>,
    /// Whether the provider can automatically refresh its credentials.
    pub refreshable: bool,
}

/// A single message in the conversation history. `content` is the same
/// `ContentPart` sum type the formatter produces (§9) — plain text for most
/// turns, a list of text/image/document parts for multimodal ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    pub fn text(s: impl Into<String>) -> Self {
        MessageContent::Text(s.into())
    }

    /// Flatten to plain text for providers with no multimodal support;
    /// image/document parts are rendered as a bracketed URL marker rather
    /// than silently dropped.
    pub fn to_plain_text(&self) -> String {
        match self {
            MessageContent::Text(s) => s.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .map(|p| match p {
                    ContentPart::Text { text } => text.clone(),
                    ContentPart::Image { image_url } => format!("[image: {}]", image_url.url),
                    ContentPart::Document { document_url } => format!("[document: {}]", document_url.url),
                })
                .collect::<Vec<_>>()
                .join(" "),
        }
    }

    /// OpenAI-compatible wire form: a plain string for text-only content, or
    /// an array of `{type, text|image_url}` blocks — the same shape
    /// `ContentPart` already serialises to.
    pub fn to_openai_json(&self) -> serde_json::Value {
        match self {
            MessageContent::Text(s) => serde_json::Value::String(s.clone()),
            MessageContent::Parts(parts) => serde_json::to_value(parts).unwrap_or(serde_json::Value::Null),
        }
    }

    /// Gemini-compatible `parts` array: image/document parts become
    /// `{"fileData": {"fileUri": ...}}`; Gemini infers mime type from the URI
    /// for `fileData` references it's already allowed to fetch.
    pub fn to_gemini_parts(&self) -> Vec<serde_json::Value> {
        match self {
            MessageContent::Text(s) => vec![serde_json::json!({"text": s})],
            MessageContent::Parts(parts) => parts
                .iter()
                .map(|p| match p {
                    ContentPart::Text { text } => serde_json::json!({"text": text}),
                    ContentPart::Image { image_url } => {
                        serde_json::json!({"fileData": {"fileUri": image_url.url}})
                    }
                    ContentPart::Document { document_url } => {
                        serde_json::json!({"fileData": {"fileUri": document_url.url}})
                    }
                })
                .collect(),
        }
    }

    /// Anthropic-compatible content blocks: image/document parts become
    /// `{"type":"image"|"document","source":{"type":"url","url":...}}`.
    pub fn to_anthropic_json(&self) -> serde_json::Value {
        match self {
            MessageContent::Text(s) => serde_json::Value::String(s.clone()),
            MessageContent::Parts(parts) => {
                let blocks: Vec<serde_json::Value> = parts
                    .iter()
                    .map(|p| match p {
                        ContentPart::Text { text } => serde_json::json!({"type": "text", "text": text}),
                        ContentPart::Image { image_url } => {
                            serde_json::json!({"type": "image", "source": {"type": "url", "url": image_url.url}})
                        }
                        ContentPart::Document { document_url } => {
                            serde_json::json!({"type": "document", "source": {"type": "url", "url": document_url.url}})
                        }
                    })
                    .collect();
                serde_json::Value::Array(blocks)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// Per-harm-category moderation threshold (§3 `ChannelChatbotConfig.safety_settings`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetySetting {
    pub category: String,
    pub threshold: String,
}

/// Request to an LLM provider (§6 boundary): `complete(model, messages,
/// temperature, timeout, safety_settings, stream?, max_tokens?, thinking?,
/// reasoning_effort?, api_base?)`.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Opaque `<provider>/<model>` or `local/<model>` identifier (§6); the
    /// router/registry resolve provider selection from the prefix.
    pub model: String,
    /// Plain text system prompt (used by non-Anthropic providers).
    pub system: String,
    /// Optional 3-tier prompt with cache breakpoints (Anthropic only).
    pub system_prompt: Option<SystemPrompt>,
    pub messages: Vec<Message>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    pub safety_settings: Vec<SafetySetting>,
    pub stream: bool,
    /// Optional thinking level for extended reasoning (Anthropic only).
    /// `None` and `Some(ThinkingLevel::Off)` both disable the thinking block.
    pub thinking: Option<ThinkingLevel>,
    /// Reasoning-effort hint for providers that expose one instead of a
    /// token budget (e.g. OpenAI o-series `reasoning_effort`).
    pub reasoning_effort: Option<String>,
    /// Per-request base URL override, bypassing the provider's configured default.
    pub api_base: Option<String>,
}

/// Response from an LLM provider (non-streaming).
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub model: String,
    pub tokens_in: u32,
    pub tokens_out: u32,
    pub stop_reason: String,
}

/// Common interface for all LLM providers (Anthropic, OpenAI, Ollama, etc).
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name for logging and error messages.
    fn name(&self) -> &str;

    /// Send a non-streaming chat request, wait for full response.
    async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError>;

    /// Stream response events through a channel.
    /// Default: falls back to non-streaming send, emits TextDelta + Done.
    async fn send_stream(
        &self,
        req: &ChatRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), ProviderError> {
        let resp = self.send(req).await?;
        let _ = tx.send(StreamEvent::TextDelta { text: resp.content }).await;
        let _ = tx
            .send(StreamEvent::Done {
                model: resp.model,
                tokens_in: resp.tokens_in,
                tokens_out: resp.tokens_out,
                stop_reason: resp.stop_reason,
            })
            .await;
        Ok(())
    }

    /// Return current authentication state. Providers without tokens return `None`.
    fn token_info(&self) -> Option<TokenInfo> {
        None
    }

    /// Attempt to refresh authentication credentials.
    /// Providers that don't support refresh return `Ok(())` (no-op).
    async fn refresh_auth(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("operation cancelled")]
    Cancelled,
}
