//! Drives a [`chorus_llm::StreamEvent`] stream into a sequence of edited
//! Discord messages (§4.9).

use std::time::{Duration, Instant};

use chorus_core::config::StreamingConfig;
use chorus_llm::StreamEvent;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::chunking::split_message;
use crate::metrics::StreamMetrics;
use crate::sink::{EmbedReplySink, PlainReplySink, SinkError};
use crate::thinking::strip_thinking_tags;

/// Accumulates raw text/thinking deltas as they arrive; this is the
/// `answerBuffer` / `reasoningBuffer` pair from §4.9.
#[derive(Default)]
struct Buffers {
    answer: String,
    reasoning: String,
    raw_chunks: Vec<String>,
}

impl Buffers {
    /// The synthetic `<thinking>{reasoning}</thinking>{answer}` view the
    /// tag-stripper runs over.
    fn full_text(&self) -> String {
        if self.reasoning.is_empty() {
            self.answer.clone()
        } else {
            format!("<thinking>{}</thinking>{}", self.reasoning, self.answer)
        }
    }
}

/// Drive an embed-backed relay (the default chatbot path): a single message
/// is edited in place until the stream closes.
pub async fn drive_embed(
    mut rx: mpsc::Receiver<StreamEvent>,
    sink: &dyn EmbedReplySink,
    config: &StreamingConfig,
) -> StreamMetrics {
    let started = Instant::now();
    let throttle = Duration::from_millis(config.min_update_interval_ms);
    let mut last_update = Instant::now() - throttle;
    let mut buffers = Buffers::default();
    let mut tokens_in = 0u32;
    let mut tokens_out = 0u32;
    let mut last_summary: Option<String> = None;
    let mut thinking_done = false;

    while let Some(event) = rx.recv().await {
        match event {
            StreamEvent::TextDelta { text } => buffers.answer.push_str(&text),
            StreamEvent::Thinking { text } => buffers.reasoning.push_str(&text),
            StreamEvent::Error { message } => {
                let _ = sink.update_error(&message).await;
                warn!(error = %message, "stream aborted with error");
                return StreamMetrics::compute(started.elapsed().as_secs_f64(), tokens_in, tokens_out);
            }
            StreamEvent::Done {
                tokens_in: ti,
                tokens_out: to,
                ..
            } => {
                tokens_in = ti;
                tokens_out = to;
                break;
            }
        }
        buffers.raw_chunks.push(buffers.answer.clone());

        if last_update.elapsed() < throttle {
            continue;
        }
        last_update = Instant::now();

        let stripped = strip_thinking_tags(&buffers.full_text());
        if stripped.is_thinking_only {
            if let Some(latest) = stripped.summaries.last() {
                if last_summary.as_deref() != Some(latest.as_str()) {
                    last_summary = Some(latest.clone());
                    let status = format!("**Thinking...** ({latest})");
                    if let Err(e) = sink.update_status(&status).await {
                        handle_tick_error(e, &mut last_update, config);
                    }
                }
            } else if last_summary.is_none() {
                let _ = sink.update_status("**Thinking...**").await;
            }
            continue;
        }

        thinking_done = true;
        if let Err(e) = sink
            .update(&stripped.cleaned, stripped.thinking_content.as_deref())
            .await
        {
            handle_tick_error(e, &mut last_update, config);
        }
    }

    let _ = thinking_done; // informational; final pass below re-derives state regardless
    let final_text = buffers.raw_chunks.last().cloned().unwrap_or(buffers.answer.clone());
    let _ = final_text;
    let stripped = strip_thinking_tags(&buffers.full_text());
    let metrics = StreamMetrics::compute(started.elapsed().as_secs_f64(), tokens_in, tokens_out);
    let final_body = format!("{}\n\n-# {}", stripped.cleaned, metrics.footer());
    let _ = sink.update(&final_body, stripped.thinking_content.as_deref()).await;
    metrics
}

/// Drive a plain-text relay (InlineResponseEngine's non-embed path): a chain
/// of messages that grows via edits, bounded by `max_plain_messages`.
pub async fn drive_plain(
    mut rx: mpsc::Receiver<StreamEvent>,
    sink: &dyn PlainReplySink,
    config: &StreamingConfig,
    sanitize: &(dyn Fn(&str) -> String + Send + Sync),
) -> StreamMetrics {
    let started = Instant::now();
    let throttle = Duration::from_millis(config.min_update_interval_ms);
    let mut last_update = Instant::now() - throttle;
    let mut buffers = Buffers::default();
    let mut tokens_in = 0u32;
    let mut tokens_out = 0u32;
    let mut messages_in_use = 1usize;

    while let Some(event) = rx.recv().await {
        match event {
            StreamEvent::TextDelta { text } => buffers.answer.push_str(&text),
            StreamEvent::Thinking { .. } => {}
            StreamEvent::Error { message } => {
                let _ = sink.edit(0, &format!("Error: {message}")).await;
                warn!(error = %message, "stream aborted with error");
                return StreamMetrics::compute(started.elapsed().as_secs_f64(), tokens_in, tokens_out);
            }
            StreamEvent::Done {
                tokens_in: ti,
                tokens_out: to,
                ..
            } => {
                tokens_in = ti;
                tokens_out = to;
                break;
            }
        }

        if last_update.elapsed() < throttle {
            continue;
        }
        last_update = Instant::now();

        let stripped = strip_thinking_tags(&buffers.answer);
        let cleaned = sanitize(&stripped.cleaned);
        messages_in_use = publish_plain(sink, &cleaned, config, messages_in_use).await;
    }

    let stripped = strip_thinking_tags(&buffers.answer);
    let metrics = StreamMetrics::compute(started.elapsed().as_secs_f64(), tokens_in, tokens_out);
    let final_text = format!("{}\n\n-# {}", sanitize(&stripped.cleaned), metrics.footer());
    publish_plain(sink, &final_text, config, messages_in_use).await;
    metrics
}

/// Split `text` into message-sized chunks and send/edit them in place,
/// trimming or deleting any trailing messages from a previous, longer draft.
pub async fn publish_plain(
    sink: &dyn PlainReplySink,
    text: &str,
    config: &StreamingConfig,
    previous_message_count: usize,
) -> usize {
    let mut chunks = split_message(text, config.message_char_limit);
    if chunks.len() > config.max_plain_messages {
        chunks.truncate(config.max_plain_messages);
        if let Some(last) = chunks.last_mut() {
            truncate_at_boundary(last, config.message_char_limit);
        }
    }

    for (index, chunk) in chunks.iter().enumerate() {
        let result = if index < previous_message_count {
            sink.edit(index, chunk).await
        } else {
            sink.send_new(chunk).await
        };
        if let Err(e) = result {
            debug!(error = %e, index, "plain relay tick failed");
        }
    }

    if chunks.len() < previous_message_count {
        let _ = sink.delete_from(chunks.len()).await;
    }

    chunks.len()
}

/// Truncate `text` to at most `limit` chars, preferring the last sentence,
/// then phrase, then word boundary.
fn truncate_at_boundary(text: &mut String, limit: usize) {
    if text.len() <= limit {
        return;
    }
    let window = &text[..limit];
    let cut = window
        .rfind(". ")
        .map(|i| i + 1)
        .or_else(|| window.rfind(", ").map(|i| i + 1))
        .or_else(|| window.rfind(' '))
        .unwrap_or(limit);
    text.truncate(cut);
}

fn handle_tick_error(err: SinkError, last_update: &mut Instant, config: &StreamingConfig) {
    match err {
        SinkError::RateLimited { .. } => {
            *last_update += Duration::from_millis(config.rate_limit_backoff_ms);
        }
        SinkError::Platform(message) => {
            warn!(error = %message, "relay tick failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct RecordingEmbedSink {
        updates: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl EmbedReplySink for RecordingEmbedSink {
        async fn update(&self, text: &str, _thinking: Option<&str>) -> Result<(), SinkError> {
            self.updates.lock().unwrap().push(text.to_string());
            Ok(())
        }
        async fn update_status(&self, status_line: &str) -> Result<(), SinkError> {
            self.updates.lock().unwrap().push(status_line.to_string());
            Ok(())
        }
        async fn update_error(&self, message: &str) -> Result<(), SinkError> {
            self.updates.lock().unwrap().push(format!("ERROR: {message}"));
            Ok(())
        }
    }

    fn fast_config() -> StreamingConfig {
        StreamingConfig {
            min_update_interval_ms: 0,
            rate_limit_backoff_ms: 2000,
            max_plain_messages: 5,
            message_char_limit: 2000,
        }
    }

    #[tokio::test]
    async fn embed_relay_publishes_final_text_with_metrics_footer() {
        let (tx, rx) = mpsc::channel(16);
        let sink = RecordingEmbedSink { updates: Mutex::new(Vec::new()) };

        tx.send(StreamEvent::TextDelta { text: "hello".to_string() }).await.unwrap();
        tx.send(StreamEvent::Done {
            model: "test".to_string(),
            tokens_in: 10,
            tokens_out: 5,
            stop_reason: "stop".to_string(),
        })
        .await
        .unwrap();
        drop(tx);

        drive_embed(rx, &sink, &fast_config()).await;
        let updates = sink.updates.lock().unwrap();
        let last = updates.last().unwrap();
        assert!(last.starts_with("hello"));
        assert!(last.contains("tok/s"));
    }

    #[tokio::test]
    async fn embed_relay_hides_thinking_only_buffer_behind_status() {
        let (tx, rx) = mpsc::channel(16);
        let sink = RecordingEmbedSink { updates: Mutex::new(Vec::new()) };

        tx.send(StreamEvent::Thinking { text: "**Looking things up**".to_string() }).await.unwrap();
        tx.send(StreamEvent::Done {
            model: "test".to_string(),
            tokens_in: 1,
            tokens_out: 1,
            stop_reason: "stop".to_string(),
        })
        .await
        .unwrap();
        drop(tx);

        drive_embed(rx, &sink, &fast_config()).await;
        let updates = sink.updates.lock().unwrap();
        assert!(updates.iter().any(|u| u.contains("Thinking")));
    }

    struct RecordingPlainSink {
        messages: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PlainReplySink for RecordingPlainSink {
        async fn edit(&self, index: usize, text: &str) -> Result<(), SinkError> {
            let mut messages = self.messages.lock().unwrap();
            if index >= messages.len() {
                messages.resize(index + 1, String::new());
            }
            messages[index] = text.to_string();
            Ok(())
        }
        async fn send_new(&self, text: &str) -> Result<(), SinkError> {
            self.messages.lock().unwrap().push(text.to_string());
            Ok(())
        }
        async fn delete_from(&self, from: usize) -> Result<(), SinkError> {
            self.messages.lock().unwrap().truncate(from);
            Ok(())
        }
    }

    #[tokio::test]
    async fn plain_relay_grows_message_chain_and_appends_metrics() {
        let (tx, rx) = mpsc::channel(16);
        let sink = RecordingPlainSink { messages: Mutex::new(Vec::new()) };

        tx.send(StreamEvent::TextDelta { text: "a response".to_string() }).await.unwrap();
        tx.send(StreamEvent::Done {
            model: "test".to_string(),
            tokens_in: 2,
            tokens_out: 2,
            stop_reason: "stop".to_string(),
        })
        .await
        .unwrap();
        drop(tx);

        drive_plain(rx, &sink, &fast_config(), &|s: &str| s.to_string()).await;
        let messages = sink.messages.lock().unwrap();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with("a response"));
        assert!(messages[0].contains("tok/s"));
    }

    #[tokio::test]
    async fn plain_relay_respects_message_count_ceiling() {
        let mut config = fast_config();
        config.max_plain_messages = 2;
        config.message_char_limit = 20;

        let long_text = "word ".repeat(30);
        let (tx, rx) = mpsc::channel(16);
        let sink = RecordingPlainSink { messages: Mutex::new(Vec::new()) };

        tx.send(StreamEvent::TextDelta { text: long_text }).await.unwrap();
        tx.send(StreamEvent::Done {
            model: "test".to_string(),
            tokens_in: 1,
            tokens_out: 1,
            stop_reason: "stop".to_string(),
        })
        .await
        .unwrap();
        drop(tx);

        drive_plain(rx, &sink, &config, &|s: &str| s.to_string()).await;
        let messages = sink.messages.lock().unwrap();
        assert!(messages.len() <= 2);
    }
}
