//! The narrow surface the relay needs from the chat platform. Kept separate
//! from `chorus_llm::LlmProvider` and from any concrete gateway client so
//! this crate never depends on serenity.

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },
    #[error("chat platform error: {0}")]
    Platform(String),
}

/// Drives a chain of plain-text messages that grows as a response streams
/// in (InlineResponseEngine's non-embed path, §4.9).
#[async_trait]
pub trait PlainReplySink: Send + Sync {
    /// Replace the content of the message at `index` (0 = the original
    /// placeholder). The sink is responsible for having already sent it.
    async fn edit(&self, index: usize, text: &str) -> Result<(), SinkError>;

    /// Send a new message continuing the chain; its index is
    /// `previous highest index + 1`.
    async fn send_new(&self, text: &str) -> Result<(), SinkError>;

    /// Delete every message whose index is `>= from` — used when a later
    /// draft needed fewer messages than an earlier one.
    async fn delete_from(&self, from: usize) -> Result<(), SinkError>;
}

/// Drives a single embed-backed message that is edited in place as a
/// response streams in (the default chatbot-channel path, §4.9).
#[async_trait]
pub trait EmbedReplySink: Send + Sync {
    /// Replace the embed body with `text`, optionally including a collapsed
    /// "thinking" panel.
    async fn update(&self, text: &str, thinking: Option<&str>) -> Result<(), SinkError>;

    /// Replace the embed body with a short status line (used for the
    /// "Thinking... (<summary>)" placeholder while no visible text exists yet).
    async fn update_status(&self, status_line: &str) -> Result<(), SinkError>;

    /// Replace the embed with a terminal error state.
    async fn update_error(&self, message: &str) -> Result<(), SinkError>;
}
