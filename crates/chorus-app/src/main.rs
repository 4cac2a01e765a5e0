use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chorus_conversation::{ChatbotConfigStore, ConversationStore};
use chorus_core::config::ChorusConfig;
use chorus_discord::{DiscordAdapter, DiscordAppContext, DiscordInlineHost};
use chorus_index::IndexManager;
use chorus_inline::{InlineConfigStore, InlineResponseEngine, ModelMap};
use chorus_ocr::{OcrChannelConfigStore, OcrPipeline, TesseractEngine};
use chorus_patterns::PatternMatcher;
use chorus_storage::JsonStore;
use serenity::http::Http;
use tracing::{info, warn};

mod ocr_responder;
mod provider;
mod watchdog;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "chorus=info".into()))
        .init();

    // load config: explicit path > CHORUS_CONFIG env > ./chorus.toml
    let config_path = std::env::var("CHORUS_CONFIG").ok();
    let config = ChorusConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("config load failed ({e}), using defaults");
        ChorusConfig::default()
    });

    if config.discord.bot_token.is_empty() {
        anyhow::bail!("discord.bot_token is not configured (set it in chorus.toml or CHORUS_DISCORD__BOT_TOKEN)");
    }

    let data_root = PathBuf::from("data");
    let store = Arc::new(JsonStore::new());

    let index = Arc::new(IndexManager::new(Arc::clone(&store), data_root.clone()));
    let conversation = Arc::new(ConversationStore::new(Arc::clone(&store), data_root.clone(), Arc::clone(&index)));
    let chatbot_config = Arc::new(ChatbotConfigStore::new(Arc::clone(&store), data_root.clone()));
    let patterns = Arc::new(PatternMatcher::load(Arc::clone(&store), data_root.clone()).await?);
    let ocr_channel_config = Arc::new(OcrChannelConfigStore::new(Arc::clone(&store), data_root.clone()));
    let inline_config = Arc::new(InlineConfigStore::new(Arc::clone(&store), data_root.clone(), config.inline.clone()));

    let media_cache = Arc::new(chorus_media::build_cache(Arc::clone(&store), data_root.clone(), config.media_cache.clone()).await?);

    let llm_provider = provider::build_provider(&config.llm);

    // A standalone `Http` client identifies the bot (and serves the OCR
    // responder / inline-gather paths) before the gateway connection opens,
    // so every other subsystem can be built with the real bot id up front
    // instead of waiting on the `ready` event.
    let http = Arc::new(Http::new(&config.discord.bot_token));
    let current_user = http
        .get_current_user()
        .await
        .map_err(|e| anyhow::anyhow!("fetching bot identity: {e}"))?;
    let self_bot_id = current_user.id.get();
    let self_bot_username = current_user.name.clone();

    let ocr_channel_config_snapshot = Arc::new(ocr_channel_config.merged().await?);
    let ocr_responder_http = Arc::clone(&http);
    let ocr_pipeline = Arc::new(OcrPipeline::spawn(
        config.ocr.queue_capacity,
        config.ocr.worker_count,
        Duration::from_secs(config.ocr.enqueue_timeout_secs),
        Arc::new(TesseractEngine::default()),
        Arc::clone(&patterns),
        ocr_channel_config_snapshot,
        config.ocr.default_language.clone(),
        move |outcome| {
            let http = Arc::clone(&ocr_responder_http);
            async move { ocr_responder::respond(&http, outcome).await }
        },
    ));

    let inline_host = DiscordInlineHost::new(Arc::clone(&http), self_bot_id);
    let model_map = ModelMap {
        ask: config.llm.models.ask.clone(),
        think: config.llm.models.think.clone(),
        chat: config.llm.models.chat.clone(),
    };
    let inline_engine = InlineResponseEngine::new(
        inline_host,
        Arc::clone(&index),
        Arc::clone(&conversation),
        Arc::clone(&llm_provider),
        config.streaming.clone(),
        model_map,
        self_bot_id,
        self_bot_username.clone(),
        config.inline.worker_idle_timeout_secs,
        config.discord.creator_user_id,
        config.discord.creator_display_override.clone(),
    );

    let ocr_config = config.ocr.clone();
    let ctx = Arc::new(DiscordAppContext::new(
        config.clone(),
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
        llm_provider,
    ));
    ctx.set_self_bot(self_bot_id, self_bot_username.clone());

    watchdog::spawn(config.watchdog.clone());

    info!(bot = %self_bot_username, id = self_bot_id, "starting Discord gateway connection");
    let adapter = DiscordAdapter::new(config.discord.bot_token.clone(), ctx);
    adapter.run().await?;

    Ok(())
}
