//! Stand-in provider for the case where no credentials are configured at all
//! (§7: "fatal misconfiguration is surfaced by an explicit error, never a
//! silent retry loop"). Keeps `ProviderRouter::new`'s non-empty-slots
//! invariant satisfied without forcing every call site to special-case the
//! zero-provider case.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::provider::{ChatRequest, ChatResponse, LlmProvider, ProviderError};
use crate::stream::StreamEvent;

pub struct UnconfiguredProvider;

#[async_trait]
impl LlmProvider for UnconfiguredProvider {
    fn name(&self) -> &str {
        "unconfigured"
    }

    async fn send(&self, _req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        Err(ProviderError::Unavailable(
            "no LLM provider is configured (set [llm.anthropic] or [llm.openai] in chorus.toml)".to_string(),
        ))
    }

    async fn send_stream(&self, _req: &ChatRequest, _tx: mpsc::Sender<StreamEvent>) -> Result<(), ProviderError> {
        Err(ProviderError::Unavailable(
            "no LLM provider is configured (set [llm.anthropic] or [llm.openai] in chorus.toml)".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_reports_unavailable() {
        let req = ChatRequest {
            model: "test".to_string(),
            system: String::new(),
            system_prompt: None,
            messages: Vec::new(),
            temperature: 0.7,
            max_tokens: 1,
            timeout_secs: 1,
            safety_settings: Vec::new(),
            stream: false,
            thinking: None,
            reasoning_effort: None,
            api_base: None,
        };
        let err = UnconfiguredProvider.send(&req).await.unwrap_err();
        assert!(matches!(err, ProviderError::Unavailable(_)));
    }
}
