use std::sync::Arc;
use std::time::Duration;

use chorus_core::Snowflake;
use chorus_patterns::PatternMatcher;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::engine::OcrEngine;
use crate::routing::{OcrChannelConfig, RouteDecision};
use crate::stats::{OcrStats, OcrStatsSnapshot};

/// A pre-validated image ready for OCR (§4.7). Pre-validation (content-type,
/// size, dimensions) has already happened by the time this is constructed.
pub struct OcrJob {
    pub guild_id: Snowflake,
    pub channel_id: Snowflake,
    pub message_id: Snowflake,
    pub author_id: Snowflake,
    pub image_bytes: Vec<u8>,
    pub lang: String,
}

/// Outcome handed to the caller-supplied responder after a job is processed.
pub struct OcrOutcome {
    pub guild_id: Snowflake,
    pub channel_id: Snowflake,
    pub message_id: Snowflake,
    pub author_id: Snowflake,
    pub ocr_text: String,
    pub matched_response: Option<String>,
    pub route: RouteDecision,
}

/// Process-global bounded FIFO queue plus `N` worker tasks (§4.7). Enqueue is
/// a bounded put with a timeout — when the queue is saturated, the message
/// is rejected rather than blocking the gateway handler indefinitely.
pub struct OcrPipeline {
    sender: mpsc::Sender<OcrJob>,
    stats: Arc<OcrStats>,
    capacity: usize,
    enqueue_timeout: Duration,
}

impl OcrPipeline {
    /// Spawn `worker_count` workers draining a bounded channel of
    /// `queue_capacity`. `responder` is called once per completed job with
    /// the routing decision already resolved; it owns actually sending to
    /// Discord.
    pub fn spawn<R, Fut>(
        queue_capacity: usize,
        worker_count: usize,
        enqueue_timeout: Duration,
        engine: Arc<dyn OcrEngine>,
        patterns: Arc<PatternMatcher>,
        channel_config: Arc<OcrChannelConfig>,
        default_language: String,
        responder: R,
    ) -> Self
    where
        R: Fn(OcrOutcome) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let (sender, receiver) = mpsc::channel(queue_capacity);
        let stats = Arc::new(OcrStats::default());
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let responder = Arc::new(responder);

        for worker_id in 0..worker_count {
            let receiver = receiver.clone();
            let engine = engine.clone();
            let patterns = patterns.clone();
            let channel_config = channel_config.clone();
            let default_language = default_language.clone();
            let stats = stats.clone();
            let responder = responder.clone();

            tokio::spawn(async move {
                loop {
                    let job = {
                        let mut guard = receiver.lock().await;
                        guard.recv().await
                    };
                    let Some(job) = job else {
                        info!(worker_id, "ocr worker shutting down, channel closed");
                        break;
                    };

                    let guild_key = job.guild_id.to_string();
                    let ocr_text = match engine.recognize(&job.image_bytes, &job.lang).await {
                        Ok(text) => text,
                        Err(e) => {
                            warn!(worker_id, error = %e, "ocr recognition failed");
                            stats.record_processed();
                            continue;
                        }
                    };

                    if ocr_text.trim().is_empty() {
                        stats.record_processed();
                        continue;
                    }

                    let matched_response = patterns.find_match(&guild_key, &ocr_text).await;
                    let route = channel_config.route(job.channel_id, &default_language);

                    if !matches!(route, RouteDecision::Drop) {
                        responder(OcrOutcome {
                            guild_id: job.guild_id,
                            channel_id: job.channel_id,
                            message_id: job.message_id,
                            author_id: job.author_id,
                            ocr_text: ocr_text.clone(),
                            matched_response,
                            route,
                        })
                        .await;
                        info!(
                            guild_id = job.guild_id,
                            channel_id = job.channel_id,
                            ocr_text_len = ocr_text.len(),
                            "ocr match processed"
                        );
                    } else {
                        warn!(guild_id = job.guild_id, channel_id = job.channel_id, "no ocr response route configured, dropping result");
                    }

                    stats.record_processed();
                }
            });
        }

        Self {
            sender,
            stats,
            capacity: queue_capacity,
            enqueue_timeout,
        }
    }

    /// Attempt to enqueue a pre-validated job, waiting up to the configured
    /// timeout. Returns `false` (and bumps `total_rejected`) on timeout or a
    /// closed channel, so the caller can react with a ⏳ reaction.
    pub async fn try_enqueue(&self, job: OcrJob) -> bool {
        let depth_estimate = (self.capacity - self.sender.capacity()) as u64 + 1;
        match tokio::time::timeout(self.enqueue_timeout, self.sender.send(job)).await {
            Ok(Ok(())) => {
                self.stats.record_enqueued(depth_estimate);
                if self.stats.near_capacity(self.capacity) {
                    warn!(capacity = self.capacity, "ocr queue near capacity");
                }
                true
            }
            _ => {
                self.stats.record_rejected();
                false
            }
        }
    }

    pub fn stats(&self) -> OcrStatsSnapshot {
        self.stats.snapshot(self.capacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::StubEngine;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn job_is_processed_and_stats_updated() {
        let engine: Arc<dyn OcrEngine> = Arc::new(StubEngine {
            fixed_text: "hello world".to_string(),
        });
        let patterns = Arc::new(PatternMatcher::load(Arc::new(chorus_storage::JsonStore::new()), std::env::temp_dir().join("chorus-ocr-pipeline-test")).await.unwrap());
        let mut config = OcrChannelConfig::default();
        config.read_channels = vec![10];
        config.response_channels = vec![10];
        let config = Arc::new(config);

        let processed = Arc::new(AtomicUsize::new(0));
        let processed_clone = processed.clone();

        let pipeline = OcrPipeline::spawn(10, 1, Duration::from_secs(5), engine, patterns, config, "eng".to_string(), move |_outcome| {
            let processed = processed_clone.clone();
            async move {
                processed.fetch_add(1, Ordering::SeqCst);
            }
        });

        let enqueued = pipeline
            .try_enqueue(OcrJob {
                guild_id: 1,
                channel_id: 10,
                message_id: 100,
                author_id: 5,
                image_bytes: vec![0u8; 4],
                lang: "eng".to_string(),
            })
            .await;
        assert!(enqueued);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(processed.load(Ordering::SeqCst), 1);
        assert_eq!(pipeline.stats().total_processed, 1);
    }
}
