//! Builds the rotated LLM provider (§6 LLM provider boundary) from config:
//! every credentialed provider becomes a [`chorus_llm::ProviderSlot`] in
//! priority order, with [`chorus_llm::UnconfiguredProvider`] as the
//! zero-credential fallback so `ProviderRouter::new`'s non-empty invariant
//! always holds and a misconfigured deployment fails loudly per-request
//! rather than at startup.

use std::sync::Arc;

use chorus_core::config::LlmConfig;
use chorus_llm::anthropic::AnthropicProvider;
use chorus_llm::openai::OpenAiProvider;
use chorus_llm::{LlmProvider, ProviderRouter, ProviderSlot, UnconfiguredProvider};

const DEFAULT_MAX_RETRIES: u32 = 2;

pub fn build_provider(config: &LlmConfig) -> Arc<dyn LlmProvider> {
    let mut slots = Vec::new();

    if let Some(anthropic) = &config.anthropic {
        slots.push(ProviderSlot::new(
            Box::new(AnthropicProvider::new(anthropic.api_key.clone(), anthropic.base_url.clone())),
            DEFAULT_MAX_RETRIES,
        ));
    }
    if let Some(openai) = &config.openai {
        slots.push(ProviderSlot::new(
            Box::new(OpenAiProvider::new(openai.api_key.clone(), openai.base_url.clone())),
            DEFAULT_MAX_RETRIES,
        ));
    }

    if slots.is_empty() {
        return Arc::new(UnconfiguredProvider);
    }
    Arc::new(ProviderRouter::new(slots))
}
