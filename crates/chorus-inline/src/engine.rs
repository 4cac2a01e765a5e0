//! Per-channel FIFO worker pool driving the inline-response path (§4.8
//! steps 6-8): lazily spawns one worker per channel on first trigger, and
//! lets it exit after `worker_idle_timeout_secs` of inactivity so a quiet
//! channel doesn't hold a task open forever.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chorus_conversation::ConversationMessage;
use chorus_conversation::{extract_context, is_valid_context_message, ConversationStore};
use chorus_core::{RawMessage, Result, Snowflake, UserFacts};
use chorus_format::{format_context_for_llm, get_prioritised_context, llm_to_discord, HistoryContent, HistoryEntry, Role as FormatRole};
use chorus_index::{IndexManager, UserIndexEntry};
use chorus_llm::prompt::build_system_prompt;
use chorus_llm::{ChatRequest, LlmProvider, Message, MessageContent, Role as LlmRole};
use chorus_stream::{PlainReplySink, SinkError};
use tokio::sync::mpsc;
use tracing::warn;

use crate::gather::{gather_window, GatherConfig};
use crate::host::InlineHost;
use crate::permission::{InlineChannelConfig, ModelType};

const DEFAULT_MAX_TOKENS: u32 = 2048;
const DEFAULT_TIMEOUT_SECS: u64 = 60;
/// §4.3 messages outside this window are never persisted; the bot's own
/// reply is always fresh, so this only guards against clock skew.
const REPLY_CONTEXT_WINDOW_HOURS: u32 = 24;

/// Maps the three §3 model tiers to concrete `<provider>/<model>` strings.
#[derive(Debug, Clone)]
pub struct ModelMap {
    pub ask: String,
    pub think: String,
    pub chat: String,
}

impl ModelMap {
    fn resolve(&self, model_type: ModelType) -> &str {
        match model_type {
            ModelType::Ask => &self.ask,
            ModelType::Think => &self.think,
            ModelType::Chat => &self.chat,
        }
    }
}

struct Job {
    trigger: RawMessage,
    config: InlineChannelConfig,
}

/// Owns one lazily-spawned worker per channel. A trigger that arrives for a
/// channel with no running worker spawns one; a trigger for a channel that
/// already has one is simply pushed onto its queue.
pub struct InlineResponseEngine {
    host: Arc<dyn InlineHost>,
    index: Arc<IndexManager>,
    conversation: Arc<ConversationStore>,
    provider: Arc<dyn LlmProvider>,
    streaming: chorus_core::config::StreamingConfig,
    models: ModelMap,
    self_bot_id: Snowflake,
    self_bot_username: String,
    creator_user_id: Option<Snowflake>,
    creator_display_override: Option<String>,
    idle_timeout: Duration,
    workers: Mutex<HashMap<Snowflake, mpsc::UnboundedSender<Job>>>,
}

impl InlineResponseEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        host: Arc<dyn InlineHost>,
        index: Arc<IndexManager>,
        conversation: Arc<ConversationStore>,
        provider: Arc<dyn LlmProvider>,
        streaming: chorus_core::config::StreamingConfig,
        models: ModelMap,
        self_bot_id: Snowflake,
        self_bot_username: String,
        worker_idle_timeout_secs: u64,
        creator_user_id: Option<Snowflake>,
        creator_display_override: Option<String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            host,
            index,
            conversation,
            provider,
            streaming,
            models,
            self_bot_id,
            self_bot_username,
            creator_user_id,
            creator_display_override,
            idle_timeout: Duration::from_secs(worker_idle_timeout_secs),
            workers: Mutex::new(HashMap::new()),
        })
    }

    /// Enqueue a trigger onto its channel's FIFO queue, spawning a worker if
    /// none is currently running for that channel. `config` is the already
    /// resolved + admission-checked effective config (§4.8 steps 1-5 run
    /// upstream, in the chat-platform adapter).
    pub fn enqueue(self: &Arc<Self>, trigger: RawMessage, config: InlineChannelConfig) {
        let channel_id = trigger.channel_id;
        let mut job = Some(Job { trigger, config });

        let mut workers = self.workers.lock().unwrap();
        if let Some(tx) = workers.get(&channel_id) {
            match tx.send(job.take().unwrap()) {
                Ok(()) => return,
                Err(e) => job = Some(e.0),
            }
        }

        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(job.take().unwrap()).expect("receiver held by the worker we're about to spawn");
        workers.insert(channel_id, tx);
        drop(workers);

        let engine = Arc::clone(self);
        tokio::spawn(async move { engine.run_worker(channel_id, rx).await });
    }

    async fn run_worker(self: Arc<Self>, channel_id: Snowflake, mut rx: mpsc::UnboundedReceiver<Job>) {
        loop {
            match tokio::time::timeout(self.idle_timeout, rx.recv()).await {
                Ok(Some(job)) => {
                    if let Err(e) = self.process_job(job).await {
                        warn!(channel_id, error = %e, "inline response job failed");
                    }
                }
                Ok(None) => break,
                Err(_elapsed) => {
                    // Idle timeout. A trigger may have raced in between our
                    // last recv and the map removal below; drain it before
                    // giving up the slot so it isn't silently dropped.
                    match rx.try_recv() {
                        Ok(job) => {
                            if let Err(e) = self.process_job(job).await {
                                warn!(channel_id, error = %e, "inline response job failed");
                            }
                        }
                        Err(_) => break,
                    }
                }
            }
        }
        self.workers.lock().unwrap().remove(&channel_id);
    }

    async fn process_job(&self, job: Job) -> Result<()> {
        let Job { trigger, config } = job;
        let channel_id = trigger.channel_id;
        let guild_id = trigger.guild_id;

        let placeholder_id = self.host.send_placeholder(channel_id, "*Thinking...*").await?;

        let gather_config = GatherConfig::from_defaults(config.context_messages, config.user_context_messages);
        let window = gather_window(self.host.as_ref(), channel_id, &trigger, &gather_config).await?;

        self.index_authors(guild_id, &window).await;

        let full_history: Vec<ConversationMessage> = window
            .iter()
            .map(to_conversation_message)
            .filter(is_valid_context_message)
            .collect();
        let messages = get_prioritised_context(
            full_history.clone(),
            trigger.author.user_id,
            config.context_messages as usize,
            config.user_context_messages as usize,
        );

        let formatted = format_context_for_llm(
            &messages,
            &full_history,
            &self.index,
            guild_id,
            channel_id,
            self.self_bot_id,
            &self.self_bot_username,
            |_url: String| async move { (None::<String>, None::<String>) },
        )
        .await?;

        let user_index: HashMap<Snowflake, UserIndexEntry> =
            self.index.all_users(guild_id).await?.into_iter().map(|u| (u.user_id, u)).collect();
        let role_names = self.host.fetch_role_names(guild_id).await.unwrap_or_default();
        let creator_user_id = self.creator_user_id;
        let creator_display = self.creator_display_override.clone().unwrap_or_default();
        let sanitize = move |text: &str| llm_to_discord(text, &user_index, &role_names, creator_user_id, &creator_display);

        let system_prompt = build_system_prompt(&formatted.static_context, &chrono::Utc::now().to_rfc3339());
        let llm_messages: Vec<Message> = formatted.history.iter().map(history_entry_to_message).collect();

        let request = ChatRequest {
            model: self.models.resolve(config.model_type).to_string(),
            system: system_prompt.to_plain_text(),
            system_prompt: Some(system_prompt),
            messages: llm_messages,
            temperature: 0.7,
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            safety_settings: Vec::new(),
            stream: config.use_streaming,
            thinking: None,
            reasoning_effort: None,
            api_base: None,
        };

        let sink = self.host.plain_sink(channel_id, placeholder_id);
        let recorder = Arc::new(RecordingSink::new(sink));

        let reply_text = if config.use_streaming {
            let (tx, rx) = mpsc::channel(64);
            let provider = Arc::clone(&self.provider);
            let stream_request = request.clone();
            let relay_task = tokio::spawn(async move { provider.send_stream(&stream_request, tx).await });
            chorus_stream::drive_plain(rx, recorder.as_ref(), &self.streaming, &sanitize).await;
            match relay_task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(channel_id, error = %e, "inline response stream ended in error"),
                Err(e) => warn!(channel_id, error = %e, "inline response stream task panicked"),
            }
            recorder.full_text()
        } else {
            match self.provider.send(&request).await {
                Ok(resp) => {
                    let cleaned = sanitize(&resp.content);
                    chorus_stream::publish_plain(recorder.as_ref(), &cleaned, &self.streaming, 1).await;
                    cleaned
                }
                Err(e) => {
                    warn!(channel_id, error = %e, "inline response request failed");
                    let message = format!("Sorry, something went wrong: {e}");
                    let _ = recorder.edit(0, &message).await;
                    String::new()
                }
            }
        };

        if !reply_text.trim().is_empty() {
            self.persist_own_reply(&trigger, placeholder_id, reply_text, &config).await;
        }

        Ok(())
    }

    /// §4.8 step 8: the engine's own reply joins conversation history the
    /// same way a real member's message would, so later triggers in the
    /// same channel see it.
    async fn persist_own_reply(&self, trigger: &RawMessage, placeholder_id: Snowflake, content: String, config: &InlineChannelConfig) {
        let raw_reply = RawMessage {
            message_id: placeholder_id,
            channel_id: trigger.channel_id,
            guild_id: trigger.guild_id,
            author: UserFacts {
                user_id: self.self_bot_id,
                username: self.self_bot_username.clone(),
                display_name: self.self_bot_username.clone(),
                guild_id: trigger.guild_id,
                guild_name: String::new(),
                roles: Vec::new(),
                avatar_url: None,
                status: None,
                is_bot: true,
            },
            is_bot_response: true,
            is_self_bot_response: true,
            referenced_message_id: Some(trigger.message_id),
            content,
            timestamp: chrono::Utc::now().timestamp(),
            attachments: Vec::new(),
            embeds: Vec::new(),
        };
        if let Err(e) = self.conversation.add(&raw_reply, config.context_messages, REPLY_CONTEXT_WINDOW_HOURS).await {
            warn!(channel_id = trigger.channel_id, error = %e, "failed to persist inline response's own reply");
        }
    }

    /// Merge embedded per-message author facts with a fresh member lookup
    /// (roles/display names can go stale between captures) into the guild
    /// user index.
    async fn index_authors(&self, guild_id: Snowflake, window: &[RawMessage]) {
        let mut author_facts: HashMap<Snowflake, UserFacts> = HashMap::new();
        for m in window {
            author_facts.entry(m.author.user_id).or_insert_with(|| m.author.clone());
        }

        let ids: Vec<Snowflake> = author_facts.keys().copied().collect();
        match self.host.fetch_members(guild_id, &ids).await {
            Ok(fetched) => {
                for user in fetched {
                    author_facts.insert(user.user_id, user);
                }
            }
            Err(e) => warn!(guild_id, error = %e, "fetch_members failed, indexing with embedded author facts"),
        }

        let updates: Vec<(UserFacts, bool)> = author_facts.into_values().map(|u| (u, true)).collect();
        if let Err(e) = self.index.bulk_update_users(guild_id, &updates).await {
            warn!(guild_id, error = %e, "failed to index inline-response authors");
        }
    }
}

/// Forwards every call to the real sink while also buffering the chunks it
/// sees, so the caller can recover the final rendered text after the relay
/// finishes — `drive_plain` itself only returns timing metrics.
struct RecordingSink {
    inner: Arc<dyn PlainReplySink>,
    chunks: Mutex<Vec<String>>,
}

impl RecordingSink {
    fn new(inner: Arc<dyn PlainReplySink>) -> Self {
        Self { inner, chunks: Mutex::new(Vec::new()) }
    }

    fn full_text(&self) -> String {
        self.chunks.lock().unwrap().join("")
    }
}

#[async_trait::async_trait]
impl PlainReplySink for RecordingSink {
    async fn edit(&self, index: usize, text: &str) -> std::result::Result<(), SinkError> {
        let mut chunks = self.chunks.lock().unwrap();
        if index >= chunks.len() {
            chunks.resize(index + 1, String::new());
        }
        chunks[index] = text.to_string();
        drop(chunks);
        self.inner.edit(index, text).await
    }

    async fn send_new(&self, text: &str) -> std::result::Result<(), SinkError> {
        self.chunks.lock().unwrap().push(text.to_string());
        self.inner.send_new(text).await
    }

    async fn delete_from(&self, from: usize) -> std::result::Result<(), SinkError> {
        self.chunks.lock().unwrap().truncate(from);
        self.inner.delete_from(from).await
    }
}

fn to_conversation_message(raw: &RawMessage) -> ConversationMessage {
    let extracted = extract_context(raw);
    ConversationMessage {
        message_id: raw.message_id,
        user_id: raw.author.user_id,
        username: raw.author.username.clone(),
        content: extracted.content,
        timestamp: raw.timestamp,
        is_bot_response: raw.is_bot_response,
        is_self_bot_response: raw.is_self_bot_response,
        referenced_message_id: raw.referenced_message_id,
        attachment_urls: extracted.attachment_urls,
        embed_urls: extracted.embed_urls,
        multimodal_content: extracted.multimodal_content,
    }
}

fn history_entry_to_message(entry: &HistoryEntry) -> Message {
    Message {
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

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chorus_llm::{ChatResponse, ProviderError};
    use chorus_storage::JsonStore;
    use chorus_stream::{PlainReplySink, SinkError};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn user(id: Snowflake) -> UserFacts {
        UserFacts {
            user_id: id,
            username: format!("u{id}"),
            display_name: format!("u{id}"),
            guild_id: 1,
            guild_name: "g".into(),
            roles: vec![],
            avatar_url: None,
            status: None,
            is_bot: false,
        }
    }

    fn trigger() -> RawMessage {
        RawMessage {
            message_id: 10,
            channel_id: 7,
            guild_id: 1,
            author: user(5),
            is_bot_response: false,
            is_self_bot_response: false,
            referenced_message_id: None,
            content: "<@99> hello there".to_string(),
            timestamp: 1_000,
            attachments: vec![],
            embeds: vec![],
        }
    }

    struct RecordingSink {
        edits: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PlainReplySink for RecordingSink {
        async fn edit(&self, index: usize, text: &str) -> Result<(), SinkError> {
            let mut edits = self.edits.lock().unwrap();
            if index >= edits.len() {
                edits.resize(index + 1, String::new());
            }
            edits[index] = text.to_string();
            Ok(())
        }
        async fn send_new(&self, text: &str) -> Result<(), SinkError> {
            self.edits.lock().unwrap().push(text.to_string());
            Ok(())
        }
        async fn delete_from(&self, from: usize) -> Result<(), SinkError> {
            self.edits.lock().unwrap().truncate(from);
            Ok(())
        }
    }

    struct StubHost {
        sink: Arc<RecordingSink>,
        placeholder_calls: AtomicUsize,
    }

    #[async_trait]
    impl InlineHost for StubHost {
        async fn fetch_history_batch(&self, _channel_id: Snowflake, _before: Option<Snowflake>, _limit: u32) -> Result<Vec<RawMessage>> {
            Ok(vec![trigger()])
        }
        async fn fetch_members(&self, _guild_id: Snowflake, _user_ids: &[Snowflake]) -> Result<Vec<UserFacts>> {
            Ok(Vec::new())
        }
        async fn fetch_role_names(&self, _guild_id: Snowflake) -> Result<HashMap<Snowflake, String>> {
            Ok(HashMap::new())
        }
        async fn send_placeholder(&self, _channel_id: Snowflake, _text: &str) -> Result<Snowflake> {
            self.placeholder_calls.fetch_add(1, Ordering::SeqCst);
            Ok(999)
        }
        fn plain_sink(&self, _channel_id: Snowflake, _placeholder_id: Snowflake) -> Arc<dyn PlainReplySink> {
            self.sink.clone()
        }
    }

    struct EchoProvider;

    #[async_trait]
    impl LlmProvider for EchoProvider {
        fn name(&self) -> &str {
            "echo"
        }
        async fn send(&self, _req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            Ok(ChatResponse {
                content: "hi back".to_string(),
                model: "test/echo".to_string(),
                tokens_in: 1,
                tokens_out: 1,
                stop_reason: "stop".to_string(),
            })
        }
    }

    fn channel_config(use_streaming: bool) -> InlineChannelConfig {
        InlineChannelConfig {
            enabled: true,
            trigger_on_start_only: true,
            model_type: ModelType::Ask,
            context_messages: 30,
            user_context_messages: 15,
            use_streaming,
            member_blacklist: Vec::new(),
            role_blacklist: Vec::new(),
            member_whitelist: Vec::new(),
            role_whitelist: Vec::new(),
        }
    }

    fn test_engine(host: Arc<dyn InlineHost>) -> Arc<InlineResponseEngine> {
        let store = Arc::new(JsonStore::new());
        let nanos = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap().as_nanos();
        let data_root = std::env::temp_dir().join(format!("chorus-inline-engine-test-{nanos}"));
        let index = Arc::new(IndexManager::new(store.clone(), data_root.clone()));
        let conversation = Arc::new(chorus_conversation::ConversationStore::new(store, data_root, index.clone()));
        InlineResponseEngine::new(
            host,
            index,
            conversation,
            Arc::new(EchoProvider),
            chorus_core::config::StreamingConfig {
                min_update_interval_ms: 0,
                rate_limit_backoff_ms: 2000,
                max_plain_messages: 5,
                message_char_limit: 2000,
            },
            ModelMap {
                ask: "test/ask".to_string(),
                think: "test/think".to_string(),
                chat: "test/chat".to_string(),
            },
            99,
            "chorus".to_string(),
            60,
            None,
            None,
        )
    }

    #[tokio::test]
    async fn non_streaming_trigger_posts_provider_reply() {
        let sink = Arc::new(RecordingSink { edits: std::sync::Mutex::new(Vec::new()) });
        let host: Arc<dyn InlineHost> = Arc::new(StubHost { sink: sink.clone(), placeholder_calls: AtomicUsize::new(0) });
        let engine = test_engine(host);

        engine.enqueue(trigger(), channel_config(false));
        tokio::time::sleep(Duration::from_millis(200)).await;

        let edits = sink.edits.lock().unwrap();
        assert_eq!(edits.get(0).map(String::as_str), Some("hi back"));
    }

    #[tokio::test]
    async fn worker_is_reused_for_a_second_trigger_on_the_same_channel() {
        let sink = Arc::new(RecordingSink { edits: std::sync::Mutex::new(Vec::new()) });
        let host = Arc::new(StubHost { sink: sink.clone(), placeholder_calls: AtomicUsize::new(0) });
        let engine = test_engine(host.clone());

        engine.enqueue(trigger(), channel_config(false));
        tokio::time::sleep(Duration::from_millis(150)).await;
        engine.enqueue(trigger(), channel_config(false));
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(host.placeholder_calls.load(Ordering::SeqCst), 2);
        assert_eq!(engine.workers.lock().unwrap().len(), 1);
    }
}
