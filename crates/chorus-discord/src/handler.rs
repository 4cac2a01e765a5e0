//! Serenity event handler (§4.7-4.9): classifies every inbound guild message
//! as an OCR candidate, a chatbot-mode message, or an inline-response
//! trigger, and dispatches it to the matching subsystem.

use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use chorus_conversation::ChannelChatbotConfig;
use chorus_core::{ChannelFacts, RawMediaKind, RawMessage, Snowflake, UserFacts};
use chorus_format::{format_context_for_llm, get_prioritised_context, HistoryContent, HistoryEntry, Role as FormatRole};
use chorus_inline::{admits, InlineGateEvent};
use chorus_llm::prompt::build_system_prompt;
use chorus_llm::{ChatRequest, Message as LlmMessage, MessageContent, Role as LlmRole};
use chorus_media::MediaCache;
use chorus_ocr::OcrJob;
use chorus_stream::{drive_embed, EmbedReplySink, SinkError};
use serenity::builder::{CreateEmbed, CreateMessage};
use serenity::http::Http;
use serenity::model::channel::{Channel, Message};
use serenity::model::colour::Colour;
use serenity::model::gateway::Ready;
use serenity::model::id::{ChannelId, GuildId, RoleId, UserId};
use serenity::prelude::{Context, EventHandler};
use tracing::{info, warn};

use crate::attach::find_ocr_candidate;
use crate::context::DiscordAppContext;
use crate::conversion;
use crate::embed::DiscordEmbedSink;

/// Serenity event handler wired to the context/dispatch engine.
pub struct Handler {
    pub ctx: Arc<DiscordAppContext>,
    http_client: reqwest::Client,
    bot_id: OnceLock<UserId>,
}

impl Handler {
    pub fn new(ctx: Arc<DiscordAppContext>) -> Self {
        Self {
            ctx,
            http_client: reqwest::Client::new(),
            bot_id: OnceLock::new(),
        }
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        let _ = self.bot_id.set(ready.user.id);
        self.ctx.set_self_bot(ready.user.id.get(), ready.user.name.clone());
        info!(name = %ready.user.name, id = ready.user.id.get(), "Discord bot connected");
    }

    async fn message(&self, ctx: Context, msg: Message) {
        // §4.3: the chatbot listener skips every bot message, including the
        // self-bot's own — its own replies are persisted explicitly by
        // `respond_chatbot`/`InlineResponseEngine` right after they're sent.
        if msg.author.bot {
            return;
        }
        let Some(guild_id) = msg.guild_id.map(|g| g.get()) else {
            return; // DMs are out of scope.
        };
        let channel_id = msg.channel_id.get();
        let self_bot_id = self.ctx.self_bot_id();
        self.ctx.record_guild(guild_id);

        if let Some(facts) = build_channel_facts(&ctx, guild_id, channel_id) {
            if let Err(e) = self.ctx.index.update_channel(&facts).await {
                warn!(guild_id, channel_id, error = %e, "failed to index channel facts");
            }
        }

        // Step 1: OCR candidates (§4.7).
        match self.ctx.ocr_channel_config.get_guild_config(guild_id).await {
            Ok(ocr_cfg) if ocr_cfg.read_channels.contains(&channel_id) => {
                if let Some(candidate) = find_ocr_candidate(
                    &self.http_client,
                    &msg,
                    self.ctx.ocr_config.max_attachment_bytes,
                    self.ctx.ocr_config.min_width,
                    self.ctx.ocr_config.min_height,
                )
                .await
                {
                    let lang = ocr_cfg.language_for(channel_id, &self.ctx.ocr_config.default_language);
                    let job = OcrJob {
                        guild_id,
                        channel_id,
                        message_id: msg.id.get(),
                        author_id: msg.author.id.get(),
                        image_bytes: candidate.image_bytes,
                        lang,
                    };
                    if !self.ctx.ocr_pipeline.try_enqueue(job).await {
                        let _ = msg.react(&ctx.http, '⏳').await;
                    }
                    return;
                }
            }
            Ok(_) => {}
            Err(e) => warn!(guild_id, channel_id, error = %e, "failed to load ocr channel config"),
        }

        let chatbot_cfg = match self.ctx.chatbot_config.get_effective(guild_id, channel_id).await {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!(guild_id, channel_id, error = %e, "failed to load chatbot config");
                return;
            }
        };

        let role_ids: Vec<Snowflake> = msg.member.as_ref().map(|m| m.roles.iter().map(|r| r.get()).collect()).unwrap_or_default();
        let role_names = resolve_role_names(&ctx, GuildId::new(guild_id), &role_ids);
        let author = match &msg.member {
            Some(member) => conversion::partial_member_facts(&msg.author, member, guild_id, "", role_names),
            None => conversion::user_facts(&msg.author, guild_id, "", role_names, None),
        };
        let mut raw = conversion::message_to_raw(&msg, self_bot_id, author);

        // Step 2: chatbot mode (§4.3, §3 `ChannelChatbotConfig`).
        if chatbot_cfg.enabled {
            cache_media_urls(&self.ctx.media_cache, &mut raw).await;
            if let Err(e) = self.ctx.conversation.add(&raw, chatbot_cfg.max_context_messages, chatbot_cfg.context_window_hours).await {
                warn!(guild_id, channel_id, error = %e, "failed to persist chatbot message");
            }

            let mentions_bot = msg.mentions_user_id(UserId::new(self_bot_id));
            let is_reply_to_bot = msg.referenced_message.as_ref().is_some_and(|m| m.author.id.get() == self_bot_id);
            let should_respond =
                (chatbot_cfg.auto_respond_to_mentions && mentions_bot) || (chatbot_cfg.auto_respond_to_replies && is_reply_to_bot);

            if should_respond {
                let app = Arc::clone(&self.ctx);
                let http = Arc::clone(&ctx.http);
                let delay = chatbot_cfg.response_delay_seconds as u64;
                tokio::spawn(async move {
                    if delay > 0 {
                        tokio::time::sleep(Duration::from_secs(delay)).await;
                    }
                    respond_chatbot(app, http, guild_id, channel_id, raw, chatbot_cfg).await;
                });
            }
            return;
        }

        // Step 3: inline response (§4.8).
        let inline_cfg = match self.ctx.inline_config.get_effective(guild_id, channel_id).await {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!(guild_id, channel_id, error = %e, "failed to load inline config");
                return;
            }
        };
        let mention_tokens = vec![format!("<@{self_bot_id}>"), format!("<@!{self_bot_id}>")];
        let event = InlineGateEvent {
            is_self_bot: false,
            in_guild: true,
            chatbot_enabled: false,
            content: &raw.content,
            mention_tokens: &mention_tokens,
            author_id: raw.author.user_id,
            author_role_ids: &role_ids,
            everyone_role_id: guild_id,
        };
        if admits(&inline_cfg, &event) {
            self.ctx.inline_engine.enqueue(raw, inline_cfg);
        }
    }
}

/// §4.2: raw per-channel facts from the gateway cache, thread-parent lookup
/// included. [`chorus_index::IndexManager::update_channel`] owns the
/// topic/category/NSFW thread-fallback logic itself; this only supplies the
/// inputs it needs.
fn build_channel_facts(ctx: &Context, guild_id: Snowflake, channel_id: Snowflake) -> Option<ChannelFacts> {
    let guild = ctx.cache.guild(GuildId::new(guild_id))?;
    let channel = guild.channels.get(&ChannelId::new(channel_id))?.clone();
    let channel_kind = conversion::channel_kind_of(channel.kind);

    let category_name = channel.parent_id.and_then(|pid| guild.channels.get(&pid)).map(|c| c.name.clone());
    let parent_channel: Option<Channel> = if channel_kind.is_thread() {
        channel.parent_id.and_then(|pid| guild.channels.get(&pid)).cloned().map(Channel::Guild)
    } else {
        None
    };

    Some(conversion::channel_facts(
        channel_id,
        guild_id,
        channel.name.clone(),
        channel_kind,
        channel.topic.clone(),
        category_name,
        channel.nsfw,
        Some(guild.name.clone()),
        guild.description.clone(),
        parent_channel.as_ref(),
    ))
}

fn resolve_role_names(ctx: &Context, guild_id: GuildId, role_ids: &[Snowflake]) -> Vec<String> {
    let Some(guild) = ctx.cache.guild(guild_id) else {
        return Vec::new();
    };
    role_ids.iter().filter_map(|&id| guild.roles.get(&RoleId::new(id)).map(|r| r.name.clone())).collect()
}

/// §4.4: rewrite image/document URLs through the media cache before a
/// chatbot-mode message is persisted, so history never stores a link that
/// will expire.
async fn cache_media_urls(media_cache: &MediaCache, raw: &mut RawMessage) {
    for media in raw.attachments.iter_mut().chain(raw.embeds.iter_mut()) {
        if matches!(media.kind, RawMediaKind::Image | RawMediaKind::Document) {
            media.url = media_cache.cache_url(&media.url).await;
        }
    }
}

fn history_entry_to_llm_message(entry: &HistoryEntry) -> LlmMessage {
    LlmMessage {
        role: match entry.role {
            FormatRole::User => LlmRole::User,
            FormatRole::Assistant => LlmRole::Assistant,
        },
        content: match &entry.content {
            HistoryContent::Text(text) => MessageContent::Text(text.clone()),
            HistoryContent::Parts(parts) => MessageContent::Parts(parts.clone()),
        },
    }
}

/// Forwards to the real embed sink while recording the last rendered body,
/// since [`drive_embed`] returns only timing metrics — the final text is
/// needed to persist the bot's own reply into conversation history (§4.3
/// step 8 parity with the inline-response path).
struct ChatbotRecordingSink {
    inner: DiscordEmbedSink,
    last_text: Mutex<String>,
}

impl ChatbotRecordingSink {
    fn new(inner: DiscordEmbedSink) -> Self {
        Self { inner, last_text: Mutex::new(String::new()) }
    }

    fn final_text(&self) -> String {
        let text = self.last_text.lock().unwrap().clone();
        text.split("\n\n-# ").next().unwrap_or(&text).trim().to_string()
    }
}

#[async_trait]
impl EmbedReplySink for ChatbotRecordingSink {
    async fn update(&self, text: &str, thinking: Option<&str>) -> Result<(), SinkError> {
        *self.last_text.lock().unwrap() = text.to_string();
        self.inner.update(text, thinking).await
    }

    async fn update_status(&self, status_line: &str) -> Result<(), SinkError> {
        self.inner.update_status(status_line).await
    }

    async fn update_error(&self, message: &str) -> Result<(), SinkError> {
        self.inner.update_error(message).await
    }
}

/// §4.9 chatbot-mode path: build context, stream the reply through a single
/// edited embed, then persist the bot's own reply the same way a real
/// member's message would be (§4.3 step 8).
async fn respond_chatbot(
    app: Arc<DiscordAppContext>,
    http: Arc<Http>,
    guild_id: Snowflake,
    channel_id: Snowflake,
    trigger: RawMessage,
    cfg: ChannelChatbotConfig,
) {
    let channel = ChannelId::new(channel_id);
    let _ = channel.broadcast_typing(&http).await;

    let placeholder = match channel
        .send_message(
            &http,
            CreateMessage::new().embed(CreateEmbed::new().description("**Thinking...**").colour(Colour::LIGHT_GREY)),
        )
        .await
    {
        Ok(m) => m,
        Err(e) => {
            warn!(guild_id, channel_id, error = %e, "failed to send chatbot placeholder");
            return;
        }
    };

    let history = match app.conversation.load_history(guild_id, channel_id, cfg.context_window_hours).await {
        Ok(h) => h,
        Err(e) => {
            warn!(guild_id, channel_id, error = %e, "failed to load conversation history");
            Vec::new()
        }
    };
    let full_history = history.clone();
    let messages = get_prioritised_context(history, trigger.author.user_id, cfg.max_context_messages as usize, cfg.max_user_context_messages as usize);

    let media_cache = Arc::clone(&app.media_cache);
    let formatted = match format_context_for_llm(
        &messages,
        &full_history,
        &app.index,
        guild_id,
        channel_id,
        app.self_bot_id(),
        app.self_bot_username(),
        move |url: String| {
            let media_cache = Arc::clone(&media_cache);
            async move {
                let is_discord_url = url.contains("discordapp.com") || url.contains("discordapp.net");
                match media_cache.validate_and_update_url(&url, is_discord_url).await {
                    Some(validated) => (Some(validated), None),
                    None => (None, Some(url.rsplit('/').next().unwrap_or("attachment").to_string())),
                }
            }
        },
    )
    .await
    {
        Ok(f) => f,
        Err(e) => {
            warn!(guild_id, channel_id, error = %e, "failed to format chatbot context");
            return;
        }
    };

    let system_prompt = build_system_prompt(&formatted.static_context, &chrono::Utc::now().to_rfc3339());
    let llm_messages: Vec<LlmMessage> = formatted.history.iter().map(history_entry_to_llm_message).collect();

    let request = ChatRequest {
        model: app.config.llm.models.chat.clone(),
        system: system_prompt.to_plain_text(),
        system_prompt: Some(system_prompt),
        messages: llm_messages,
        temperature: 0.7,
        max_tokens: 2048,
        timeout_secs: 120,
        safety_settings: Vec::new(),
        stream: true,
        thinking: None,
        reasoning_effort: None,
        api_base: None,
    };

    let sink = ChatbotRecordingSink::new(DiscordEmbedSink::new(Arc::clone(&http), channel_id, placeholder.id.get()));

    let (tx, rx) = tokio::sync::mpsc::channel(64);
    let provider = Arc::clone(&app.provider);
    let stream_request = request.clone();
    let relay_task = tokio::spawn(async move { provider.send_stream(&stream_request, tx).await });
    drive_embed(rx, &sink, &app.config.streaming).await;
    match relay_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(guild_id, channel_id, error = %e, "chatbot stream ended in error"),
        Err(e) => warn!(guild_id, channel_id, error = %e, "chatbot stream task panicked"),
    }

    let reply_text = sink.final_text();
    if reply_text.is_empty() {
        return;
    }

    let raw_reply = RawMessage {
        message_id: placeholder.id.get(),
        channel_id,
        guild_id,
        author: UserFacts {
            user_id: app.self_bot_id(),
            username: app.self_bot_username().to_string(),
            display_name: app.self_bot_username().to_string(),
            guild_id,
            guild_name: String::new(),
            roles: Vec::new(),
            avatar_url: None,
            status: None,
            is_bot: true,
        },
        is_bot_response: true,
        is_self_bot_response: true,
        referenced_message_id: Some(trigger.message_id),
        content: reply_text,
        timestamp: chrono::Utc::now().timestamp(),
        attachments: Vec::new(),
        embeds: Vec::new(),
    };
    if let Err(e) = app.conversation.add(&raw_reply, cfg.max_context_messages, cfg.context_window_hours).await {
        warn!(guild_id, channel_id, error = %e, "failed to persist chatbot reply");
    }
}
