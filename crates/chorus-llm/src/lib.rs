//! LLM provider boundary (§6): a narrow client interface the Context &
//! Dispatch Engine calls through, with concrete providers and a rotating
//! router behind it so the engine itself never deals with provider
//! selection or key rotation.

pub mod anthropic;
pub mod anthropic_stream;
pub mod bedrock;
pub mod health;
pub mod ollama;
pub mod openai;
pub mod prompt;
pub mod provider;
pub mod registry;
pub mod router;
pub mod stream;
pub mod thinking;
pub mod unconfigured;
pub mod vertex;

pub use health::{HealthTracker, ProviderHealthEntry, ProviderStatus};
pub use prompt::SystemPrompt;
pub use provider::{
    ChatRequest, ChatResponse, LlmProvider, Message, MessageContent, ProviderError, Role,
    SafetySetting,
};
pub use registry::{KnownProvider, KNOWN_PROVIDERS};
pub use router::{ProviderRouter, ProviderSlot};
pub use stream::StreamEvent;
pub use thinking::ThinkingLevel;
pub use unconfigured::UnconfiguredProvider;
