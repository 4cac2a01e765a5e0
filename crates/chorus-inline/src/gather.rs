//! Ephemeral context window assembly (§4.8 step 2-3). This window is built
//! fresh per trigger directly from channel history — it is not the
//! persisted chatbot context in `chorus_conversation::ConversationStore`.

use std::collections::{HashMap, HashSet};

use chorus_core::{RawMessage, Result, Snowflake};

use crate::host::InlineHost;

#[cfg(test)]
use std::sync::Arc;
#[cfg(test)]
use chorus_stream::{PlainReplySink, SinkError};

#[derive(Debug, Clone)]
pub struct GatherConfig {
    pub initial_batch_size: u32,
    pub author_context_messages: usize,
    pub general_context_messages: usize,
    pub max_fetch_attempts: u32,
    pub stitch_window_secs: i64,
}

impl Default for GatherConfig {
    fn default() -> Self {
        Self {
            initial_batch_size: 100,
            author_context_messages: 15,
            general_context_messages: 30,
            max_fetch_attempts: 10,
            stitch_window_secs: 10,
        }
    }
}

impl GatherConfig {
    /// Build from the configured `InlineDefaults` (§3), keeping the fetch
    /// batch size and stitching window at their fixed §4.8 values.
    pub fn from_defaults(context_messages: u32, user_context_messages: u32) -> Self {
        Self {
            general_context_messages: context_messages as usize,
            author_context_messages: user_context_messages as usize,
            ..Default::default()
        }
    }
}

/// Build the ephemeral context window for `trigger`: the trigger itself,
/// the last N messages from its author, the last M general messages, and
/// the transitive chain of replied-to messages, with bot-response chunks
/// stitched back together. Returned in chronological (oldest-first) order.
pub async fn gather_window<H: InlineHost + ?Sized>(host: &H, channel_id: Snowflake, trigger: &RawMessage, config: &GatherConfig) -> Result<Vec<RawMessage>> {
    let mut pool: Vec<RawMessage> = host.fetch_history_batch(channel_id, None, config.initial_batch_size).await?;
    if !pool.iter().any(|m| m.message_id == trigger.message_id) {
        pool.insert(0, trigger.clone());
    }

    let mut pool_by_id: HashMap<Snowflake, usize> = index_by_id(&pool);
    let mut working_ids = select_initial_window(&pool, trigger, config);

    let mut attempts = 0;
    loop {
        let unresolved = unresolved_references(&working_ids, &pool_by_id, &pool);
        if unresolved.is_empty() || attempts >= config.max_fetch_attempts {
            break;
        }
        attempts += 1;

        let oldest_id = pool.iter().map(|m| m.message_id).min();
        let Some(oldest_id) = oldest_id else { break };
        let next_batch = host.fetch_history_batch(channel_id, Some(oldest_id), config.initial_batch_size).await?;
        if next_batch.is_empty() {
            break; // channel history exhausted
        }
        let added_new = next_batch.iter().any(|m| !pool_by_id.contains_key(&m.message_id));
        pool.extend(next_batch);
        pool_by_id = index_by_id(&pool);
        expand_transitive_replies(&mut working_ids, &pool_by_id, &pool);
        if !added_new {
            break;
        }
    }

    expand_transitive_replies(&mut working_ids, &pool_by_id, &pool);

    let mut pool_by_time: Vec<&RawMessage> = pool.iter().collect();
    pool_by_time.sort_by_key(|m| m.timestamp);
    stitch_bot_messages(&mut working_ids, &pool_by_time, config.stitch_window_secs);

    let mut result: Vec<RawMessage> = pool.into_iter().filter(|m| working_ids.contains(&m.message_id)).collect();
    result.sort_by_key(|m| m.timestamp);
    result.dedup_by_key(|m| m.message_id);
    Ok(result)
}

fn index_by_id(pool: &[RawMessage]) -> HashMap<Snowflake, usize> {
    pool.iter().enumerate().map(|(i, m)| (m.message_id, i)).collect()
}

fn select_initial_window(pool: &[RawMessage], trigger: &RawMessage, config: &GatherConfig) -> HashSet<Snowflake> {
    let mut ids = HashSet::new();
    ids.insert(trigger.message_id);

    let mut author_count = 0;
    let mut general_count = 0;
    // `pool` is newest-first from the host; "last N" means the N most
    // recent, i.e. the first N matches in pool order.
    for msg in pool {
        if msg.message_id == trigger.message_id {
            continue;
        }
        if author_count < config.author_context_messages && msg.author.user_id == trigger.author.user_id {
            ids.insert(msg.message_id);
            author_count += 1;
        }
        if general_count < config.general_context_messages {
            ids.insert(msg.message_id);
            general_count += 1;
        }
    }
    ids
}

fn unresolved_references(working_ids: &HashSet<Snowflake>, pool_by_id: &HashMap<Snowflake, usize>, pool: &[RawMessage]) -> HashSet<Snowflake> {
    working_ids
        .iter()
        .filter_map(|id| pool_by_id.get(id))
        .filter_map(|&idx| pool[idx].referenced_message_id)
        .filter(|ref_id| !pool_by_id.contains_key(ref_id))
        .collect()
}

fn expand_transitive_replies(working_ids: &mut HashSet<Snowflake>, pool_by_id: &HashMap<Snowflake, usize>, pool: &[RawMessage]) {
    loop {
        let mut added = false;
        let referenced: Vec<Snowflake> = working_ids
            .iter()
            .filter_map(|id| pool_by_id.get(id))
            .filter_map(|&idx| pool[idx].referenced_message_id)
            .collect();
        for ref_id in referenced {
            if pool_by_id.contains_key(&ref_id) && working_ids.insert(ref_id) {
                added = true;
            }
        }
        if !added {
            break;
        }
    }
}

/// For every bot message already in the working set, pull in adjacent
/// same-author messages within `stitch_window_secs` so a response that was
/// split across multiple Discord messages stays together in context.
fn stitch_bot_messages(working_ids: &mut HashSet<Snowflake>, pool_by_time: &[&RawMessage], stitch_window_secs: i64) {
    let bot_positions: Vec<usize> = pool_by_time
        .iter()
        .enumerate()
        .filter(|(_, m)| working_ids.contains(&m.message_id) && m.is_bot_response)
        .map(|(i, _)| i)
        .collect();

    for pos in bot_positions {
        let anchor = pool_by_time[pos];

        let mut i = pos;
        while i > 0 {
            let prev = pool_by_time[i - 1];
            if prev.author.user_id == anchor.author.user_id && (anchor.timestamp - prev.timestamp).abs() <= stitch_window_secs {
                working_ids.insert(prev.message_id);
                i -= 1;
            } else {
                break;
            }
        }

        let mut j = pos;
        while j + 1 < pool_by_time.len() {
            let next = pool_by_time[j + 1];
            if next.author.user_id == anchor.author.user_id && (next.timestamp - anchor.timestamp).abs() <= stitch_window_secs {
                working_ids.insert(next.message_id);
                j += 1;
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chorus_core::UserFacts;
    use std::sync::Mutex;

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

    fn msg(id: Snowflake, author_id: Snowflake, ts: i64, is_bot: bool, reply_to: Option<Snowflake>) -> RawMessage {
        RawMessage {
            message_id: id,
            channel_id: 1,
            guild_id: 1,
            author: user(author_id),
            is_bot_response: is_bot,
            is_self_bot_response: is_bot,
            referenced_message_id: reply_to,
            content: format!("msg{id}"),
            timestamp: ts,
            attachments: vec![],
            embeds: vec![],
        }
    }

    struct StubHost {
        batches: Mutex<Vec<Vec<RawMessage>>>,
    }

    struct NoopSink;

    #[async_trait]
    impl PlainReplySink for NoopSink {
        async fn edit(&self, _index: usize, _text: &str) -> Result<(), SinkError> {
            Ok(())
        }
        async fn send_new(&self, _text: &str) -> Result<(), SinkError> {
            Ok(())
        }
        async fn delete_from(&self, _from: usize) -> Result<(), SinkError> {
            Ok(())
        }
    }

    #[async_trait]
    impl InlineHost for StubHost {
        async fn fetch_history_batch(&self, _channel_id: Snowflake, _before: Option<Snowflake>, _limit: u32) -> Result<Vec<RawMessage>> {
            let mut batches = self.batches.lock().unwrap();
            Ok(if batches.is_empty() { Vec::new() } else { batches.remove(0) })
        }
        async fn fetch_members(&self, _guild_id: Snowflake, _user_ids: &[Snowflake]) -> Result<Vec<UserFacts>> {
            Ok(Vec::new())
        }
        async fn fetch_role_names(&self, _guild_id: Snowflake) -> Result<HashMap<Snowflake, String>> {
            Ok(HashMap::new())
        }
        async fn send_placeholder(&self, _channel_id: Snowflake, _text: &str) -> Result<Snowflake> {
            Ok(1)
        }
        fn plain_sink(&self, _channel_id: Snowflake, _placeholder_id: Snowflake) -> Arc<dyn PlainReplySink> {
            Arc::new(NoopSink)
        }
    }

    #[tokio::test]
    async fn single_batch_includes_trigger_and_recent_messages() {
        let trigger = msg(10, 5, 100, false, None);
        let pool = vec![
            trigger.clone(),
            msg(9, 5, 95, false, None),
            msg(8, 6, 90, false, None),
        ];
        let host = StubHost { batches: Mutex::new(vec![pool]) };
        let config = GatherConfig::default();
        let window = gather_window(&host, 1, &trigger, &config).await.unwrap();
        let ids: HashSet<Snowflake> = window.iter().map(|m| m.message_id).collect();
        assert!(ids.contains(&10));
        assert!(ids.contains(&9));
        assert!(ids.contains(&8));
    }

    #[tokio::test]
    async fn fetches_additional_batch_to_resolve_reply_chain() {
        let trigger = msg(20, 5, 200, false, Some(1));
        let first_batch = vec![trigger.clone(), msg(19, 5, 195, false, None)];
        let replied_to = msg(1, 6, 50, false, None);
        let second_batch = vec![replied_to.clone()];
        let host = StubHost { batches: Mutex::new(vec![first_batch, second_batch]) };
        let config = GatherConfig::default();
        let window = gather_window(&host, 1, &trigger, &config).await.unwrap();
        let ids: HashSet<Snowflake> = window.iter().map(|m| m.message_id).collect();
        assert!(ids.contains(&1), "transitively-referenced message should be fetched and included");
    }

    #[tokio::test]
    async fn stitches_adjacent_bot_chunks_within_window() {
        let trigger = msg(30, 5, 300, false, None);
        let bot_chunk_1 = msg(28, 99, 280, true, None);
        let bot_chunk_2 = msg(29, 99, 285, true, None);
        let pool = vec![trigger.clone(), bot_chunk_2.clone(), bot_chunk_1.clone()];
        let host = StubHost { batches: Mutex::new(vec![pool]) };
        let mut config = GatherConfig::default();
        config.general_context_messages = 1; // only chunk_2 would be pulled in by recency alone
        let window = gather_window(&host, 1, &trigger, &config).await.unwrap();
        let ids: HashSet<Snowflake> = window.iter().map(|m| m.message_id).collect();
        assert!(ids.contains(&28), "earlier half of the split bot response should be stitched in");
        assert!(ids.contains(&29));
    }

    #[tokio::test]
    async fn stops_after_max_attempts_when_history_exhausted() {
        let trigger = msg(40, 5, 400, false, Some(999));
        let host = StubHost { batches: Mutex::new(vec![vec![trigger.clone()]]) };
        let config = GatherConfig::default();
        let window = gather_window(&host, 1, &trigger, &config).await.unwrap();
        assert_eq!(window.len(), 1);
    }
}
