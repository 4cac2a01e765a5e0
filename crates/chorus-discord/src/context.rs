//! Shared application state handed to the adapter, the event handler, and
//! every slash command (§6). One instance is built once at startup and
//! cloned as `Arc<DiscordAppContext>` into every task that needs it.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, OnceLock};

use chorus_conversation::{ChatbotConfigStore, ConversationStore};
use chorus_core::config::{ChorusConfig, OcrConfig};
use chorus_core::Snowflake;
use chorus_index::IndexManager;
use chorus_inline::{InlineConfigStore, InlineResponseEngine};
use chorus_llm::LlmProvider;
use chorus_media::MediaCache;
use chorus_ocr::{OcrChannelConfigStore, OcrPipeline};
use chorus_patterns::PatternMatcher;

/// Everything a handler or command needs to act on an inbound event. Built
/// once in the gateway's entrypoint and shared via `Arc` across every
/// spawned task.
pub struct DiscordAppContext {
    pub config: ChorusConfig,
    pub ocr_config: OcrConfig,

    pub index: Arc<IndexManager>,
    pub conversation: Arc<ConversationStore>,
    pub chatbot_config: Arc<ChatbotConfigStore>,
    pub patterns: Arc<PatternMatcher>,
    pub ocr_pipeline: Arc<OcrPipeline>,
    pub ocr_channel_config: Arc<OcrChannelConfigStore>,
    pub media_cache: Arc<MediaCache>,
    pub inline_config: Arc<InlineConfigStore>,
    pub inline_engine: Arc<InlineResponseEngine>,
    pub provider: Arc<dyn LlmProvider>,

    /// Set once in `ready()`, since the bot's own id isn't known until the
    /// gateway handshake completes.
    self_bot_id: OnceLock<Snowflake>,
    self_bot_username: OnceLock<String>,

    /// Guild ids seen on any inbound message, so the §5 maintenance timers
    /// know which guilds to sweep without depending on the gateway cache.
    known_guilds: Mutex<HashSet<Snowflake>>,
}

impl DiscordAppContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: ChorusConfig,
        ocr_config: OcrConfig,
        index: Arc<IndexManager>,
        conversation: Arc<ConversationStore>,
        chatbot_config: Arc<ChatbotConfigStore>,
        patterns: Arc<PatternMatcher>,
        ocr_pipeline: Arc<OcrPipeline>,
        ocr_channel_config: Arc<OcrChannelConfigStore>,
        media_cache: Arc<MediaCache>,
        inline_config: Arc<InlineConfigStore>,
        inline_engine: Arc<InlineResponseEngine>,
        provider: Arc<dyn LlmProvider>,
    ) -> Self {
        Self {
            config,
            ocr_config,
            index,
            conversation,
            chatbot_config,
            patterns,
            ocr_pipeline,
            ocr_channel_config,
            media_cache,
            inline_config,
            inline_engine,
            provider,
            self_bot_id: OnceLock::new(),
            self_bot_username: OnceLock::new(),
            known_guilds: Mutex::new(HashSet::new()),
        }
    }

    /// Record a guild as live so the background cleanup timer covers it.
    pub fn record_guild(&self, guild_id: Snowflake) {
        self.known_guilds.lock().unwrap().insert(guild_id);
    }

    pub fn known_guilds(&self) -> Vec<Snowflake> {
        self.known_guilds.lock().unwrap().iter().copied().collect()
    }

    pub fn set_self_bot(&self, id: Snowflake, username: String) {
        let _ = self.self_bot_id.set(id);
        let _ = self.self_bot_username.set(username);
    }

    pub fn self_bot_id(&self) -> Snowflake {
        self.self_bot_id.get().copied().unwrap_or(0)
    }

    pub fn self_bot_username(&self) -> &str {
        self.self_bot_username.get().map(String::as_str).unwrap_or("")
    }
}
