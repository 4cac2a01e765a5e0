use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{ChorusError, Result};

/// Top-level config (chorus.toml + CHORUS_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChorusConfig {
    pub discord: DiscordConfig,
    #[serde(default)]
    pub chatbot: ChatbotDefaults,
    #[serde(default)]
    pub inline: InlineDefaults,
    #[serde(default)]
    pub streaming: StreamingConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
    #[serde(default)]
    pub media_cache: MediaCacheConfig,
    #[serde(default)]
    pub watchdog: WatchdogConfig,
    #[serde(default)]
    pub llm: LlmConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    pub bot_token: String,
    /// Discord user id rendered with a fixed, decorated name in LLM output
    /// (§4.5 llm_to_discord step 4). Unset disables the special-cased rendering.
    pub creator_user_id: Option<u64>,
    /// Override display string used for `creator_user_id`; falls back to the
    /// user's ordinary display name when unset.
    pub creator_display_override: Option<String>,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            creator_user_id: None,
            creator_display_override: None,
        }
    }
}

/// Defaults applied to a new `ChannelChatbotConfig` (§3); ranges are enforced
/// by [`ChannelChatbotConfig::clamp`], not by rejecting out-of-range input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatbotDefaults {
    pub max_context_messages: u32,
    pub max_user_context_messages: u32,
    pub context_window_hours: u32,
    pub response_delay_seconds: u32,
    pub max_response_length: u32,
    pub auto_prune_enabled: bool,
    pub prune_interval_hours: u32,
    pub auto_respond_to_mentions: bool,
    pub auto_respond_to_replies: bool,
    pub cleanup_horizon_hours: u64,
}

impl Default for ChatbotDefaults {
    fn default() -> Self {
        Self {
            max_context_messages: 100,
            max_user_context_messages: 30,
            context_window_hours: 24,
            response_delay_seconds: 0,
            max_response_length: 2000,
            auto_prune_enabled: true,
            prune_interval_hours: 6,
            auto_respond_to_mentions: true,
            auto_respond_to_replies: true,
            cleanup_horizon_hours: 168,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InlineDefaults {
    pub trigger_on_start_only: bool,
    pub context_messages: u32,
    pub user_context_messages: u32,
    pub use_streaming: bool,
    /// Inactivity timeout after which a per-channel worker exits (§4.8).
    pub worker_idle_timeout_secs: u64,
}

impl Default for InlineDefaults {
    fn default() -> Self {
        Self {
            trigger_on_start_only: true,
            context_messages: 30,
            user_context_messages: 15,
            use_streaming: true,
            worker_idle_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingConfig {
    pub min_update_interval_ms: u64,
    pub rate_limit_backoff_ms: u64,
    pub max_plain_messages: usize,
    pub message_char_limit: usize,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            min_update_interval_ms: 1200,
            rate_limit_backoff_ms: 2000,
            max_plain_messages: 5,
            message_char_limit: 2000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    pub queue_capacity: usize,
    pub worker_count: usize,
    pub enqueue_timeout_secs: u64,
    pub max_attachment_bytes: u64,
    pub min_width: u32,
    pub min_height: u32,
    pub default_language: String,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 100,
            worker_count: 2,
            enqueue_timeout_secs: 5,
            max_attachment_bytes: 500_000,
            min_width: 300,
            min_height: 200,
            default_language: "eng".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaCacheConfig {
    pub enabled: bool,
    pub services: Vec<String>,
    pub pixeldrain_api_key: Option<String>,
    pub catbox_user_hash: Option<String>,
    pub upload_timeout_secs: u64,
    pub save_interval_secs: u64,
}

impl Default for MediaCacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            services: Vec::new(),
            pixeldrain_api_key: None,
            catbox_user_hash: None,
            upload_timeout_secs: 30,
            save_interval_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchdogConfig {
    pub enabled: bool,
    pub max_uptime_hours: u64,
    pub check_interval_minutes: u64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_uptime_hours: 24,
            check_interval_minutes: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LlmConfig {
    pub anthropic: Option<ApiKeyProvider>,
    pub openai: Option<ApiKeyProvider>,
    #[serde(default)]
    pub models: ModelTierConfig,
}

/// `<provider>/<model>`-shaped identifiers for the three inline-response
/// model tiers (§3 `InlineResponseConfig.model_type`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelTierConfig {
    pub ask: String,
    pub think: String,
    pub chat: String,
}

impl Default for ModelTierConfig {
    fn default() -> Self {
        Self {
            ask: "claude-3-5-haiku-latest".to_string(),
            think: "claude-3-7-sonnet-latest".to_string(),
            chat: "claude-3-5-sonnet-latest".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyProvider {
    pub api_key: String,
    pub base_url: Option<String>,
}

impl ChannelChatbotConfigRanges for ChatbotDefaults {
    fn clamp(&mut self) {
        self.max_context_messages = self.max_context_messages.clamp(10, 1000);
        self.max_user_context_messages = self.max_user_context_messages.clamp(5, 500);
        self.context_window_hours = self.context_window_hours.clamp(1, 168);
        self.response_delay_seconds = self.response_delay_seconds.clamp(0, 10);
        self.max_response_length = self.max_response_length.clamp(100, 4000);
        self.prune_interval_hours = self.prune_interval_hours.clamp(1, 48);
    }
}

/// Implemented by any config carrying the §3 `ChannelChatbotConfig` numeric
/// ranges, so loaders can clamp rather than reject out-of-range values (§7).
pub trait ChannelChatbotConfigRanges {
    fn clamp(&mut self);
}

impl ChorusConfig {
    /// Load config from a TOML file with `CHORUS_`-prefixed env var overrides.
    ///
    /// Resolution order: explicit path argument > `CHORUS_CONFIG` env var >
    /// `./chorus.toml`.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = config_path
            .map(String::from)
            .or_else(|| std::env::var("CHORUS_CONFIG").ok())
            .unwrap_or_else(|| "chorus.toml".to_string());

        let mut config: ChorusConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("CHORUS_").split("__"))
            .extract()
            .map_err(|e| ChorusError::Config(e.to_string()))?;

        config.chatbot.clamp();
        Ok(config)
    }
}
