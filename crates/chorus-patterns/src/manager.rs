use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chorus_core::Result;
use chorus_storage::JsonStore;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::types::{compile_pattern, CompiledResponse, ResponseRecord};

const DEFAULT_SERVER: &str = "default";

/// In-memory index `{serverID -> [Response]}` built from `patterns.json`
/// (§4.6). Reads are far more frequent than mutations (every inbound
/// message is matched against it), so the index lives behind an `RwLock`
/// rather than the single-mutex pattern used for the append-only stores.
pub struct PatternMatcher {
    store: Arc<JsonStore>,
    path: PathBuf,
    index: RwLock<HashMap<String, Vec<CompiledResponse>>>,
}

impl PatternMatcher {
    pub async fn load(store: Arc<JsonStore>, data_root: impl Into<PathBuf>) -> Result<Self> {
        let path = data_root.into().join("patterns.json");
        let value = store.read(&path).await;
        let raw: HashMap<String, Vec<ResponseRecord>> = serde_json::from_value(value).unwrap_or_default();

        let mut index = HashMap::new();
        let mut server_count = 0usize;
        for (server_id, responses) in raw {
            server_count += 1;
            let mut compiled = Vec::new();
            for record in responses {
                let mut patterns = Vec::new();
                for pattern_record in &record.patterns {
                    match compile_pattern(pattern_record) {
                        Ok(p) => patterns.push(p),
                        Err(e) => {
                            error!(
                                pattern = pattern_record.name,
                                response_id = record.response_id,
                                error = %e,
                                "failed to compile pattern, dropping it"
                            );
                        }
                    }
                }
                if patterns.is_empty() {
                    warn!(
                        response_id = record.response_id,
                        server_id, "response has no compilable patterns, dropping entire response"
                    );
                    continue;
                }
                compiled.push(CompiledResponse {
                    response_id: record.response_id,
                    response: record.response,
                    name: record.name,
                    note: record.note,
                    patterns,
                });
            }
            index.insert(server_id, compiled);
        }

        info!(servers = server_count, "loaded pattern rulebook");
        Ok(Self {
            store,
            path,
            index: RwLock::new(index),
        })
    }

    async fn save(&self) -> Result<()> {
        let index = self.index.read().await;
        let mut raw: HashMap<String, Vec<ResponseRecord>> = HashMap::new();
        for (server_id, responses) in index.iter() {
            raw.insert(server_id.clone(), responses.iter().map(CompiledResponse::to_record).collect());
        }
        let value = serde_json::to_value(&raw).unwrap_or_default();
        self.store.write(&self.path, &value).await
    }

    /// Try server-specific rules first, then `"default"`. Order within a
    /// rulebook is definition order — first match wins.
    pub async fn find_match(&self, server_id: &str, text: &str) -> Option<String> {
        let index = self.index.read().await;
        for key in [server_id, DEFAULT_SERVER] {
            if let Some(responses) = index.get(key) {
                for response in responses {
                    if response.matches(text) {
                        return Some(response.response.clone());
                    }
                }
            }
            if key == server_id && server_id == DEFAULT_SERVER {
                break;
            }
        }
        None
    }

    pub async fn find_response(&self, server_id: &str, id_or_name: &str) -> Option<u32> {
        let index = self.index.read().await;
        let responses = index.get(server_id)?;
        if let Ok(id) = id_or_name.parse::<u32>() {
            if let Some(r) = responses.iter().find(|r| r.response_id == id) {
                return Some(r.response_id);
            }
        }
        responses
            .iter()
            .find(|r| r.name.eq_ignore_ascii_case(id_or_name))
            .map(|r| r.response_id)
    }

    fn next_response_id(responses: &[CompiledResponse]) -> u32 {
        responses.iter().map(|r| r.response_id).max().unwrap_or(0) + 1
    }

    fn next_pattern_id(response: &CompiledResponse) -> u32 {
        response.patterns.iter().map(|p| p.id).max().unwrap_or(0) + 1
    }

    /// Add a response with an initial pattern to a server's rulebook,
    /// assigning the next monotonic response id. Fails if the pattern
    /// doesn't compile.
    pub async fn add_response(
        &self,
        server_id: &str,
        response_text: &str,
        name: &str,
        note: &str,
        pattern_source: &str,
        flags: &str,
        url: &str,
    ) -> Result<u32> {
        let pattern_record = crate::types::PatternRecord {
            id: 1,
            name: format!("{name}_pattern_1"),
            pattern: pattern_source.to_string(),
            flags: flags.to_string(),
            url: url.to_string(),
        };
        let compiled = compile_pattern(&pattern_record)
            .map_err(|e| chorus_core::ChorusError::Validation(format!("pattern did not compile: {e}")))?;

        let response_id = {
            let mut index = self.index.write().await;
            let responses = index.entry(server_id.to_string()).or_default();
            let response_id = Self::next_response_id(responses);
            responses.push(CompiledResponse {
                response_id,
                response: response_text.to_string(),
                name: name.to_string(),
                note: note.to_string(),
                patterns: vec![compiled],
            });
            response_id
        };
        self.save().await?;
        Ok(response_id)
    }

    pub async fn remove_response(&self, server_id: &str, response_id: u32) -> Result<bool> {
        let removed = {
            let mut index = self.index.write().await;
            match index.get_mut(server_id) {
                Some(responses) => {
                    let before = responses.len();
                    responses.retain(|r| r.response_id != response_id);
                    before != responses.len()
                }
                None => false,
            }
        };
        if removed {
            self.save().await?;
        }
        Ok(removed)
    }

    pub async fn add_pattern(&self, server_id: &str, response_id: u32, pattern_source: &str, flags: &str, name: &str, url: &str) -> Result<u32> {
        let mut index = self.index.write().await;
        let responses = index
            .get_mut(server_id)
            .ok_or_else(|| chorus_core::ChorusError::NotFound(format!("server {server_id} has no rulebook")))?;
        let response = responses
            .iter_mut()
            .find(|r| r.response_id == response_id)
            .ok_or_else(|| chorus_core::ChorusError::NotFound(format!("response {response_id} not found")))?;

        let pattern_id = Self::next_pattern_id(response);
        let record = crate::types::PatternRecord {
            id: pattern_id,
            name: name.to_string(),
            pattern: pattern_source.to_string(),
            flags: flags.to_string(),
            url: url.to_string(),
        };
        let compiled = compile_pattern(&record)
            .map_err(|e| chorus_core::ChorusError::Validation(format!("pattern did not compile: {e}")))?;
        response.patterns.push(compiled);
        drop(index);
        self.save().await?;
        Ok(pattern_id)
    }

    pub async fn remove_pattern(&self, server_id: &str, response_id: u32, pattern_id: u32) -> Result<bool> {
        let removed = {
            let mut index = self.index.write().await;
            let Some(responses) = index.get_mut(server_id) else {
                return Ok(false);
            };
            let Some(response) = responses.iter_mut().find(|r| r.response_id == response_id) else {
                return Ok(false);
            };
            let before = response.patterns.len();
            response.patterns.retain(|p| p.id != pattern_id);
            before != response.patterns.len()
        };
        if removed {
            self.save().await?;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tempdir() -> PathBuf {
        let mut dir = std::env::temp_dir();
        let nanos = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap().as_nanos();
        dir.push(format!("chorus-patterns-test-{nanos}"));
        dir
    }

    async fn seeded_matcher(dir: &PathBuf, payload: serde_json::Value) -> PatternMatcher {
        let store = Arc::new(JsonStore::new());
        store.write(&dir.join("patterns.json"), &payload).await.unwrap();
        PatternMatcher::load(store, dir.clone()).await.unwrap()
    }

    #[tokio::test]
    async fn matches_server_specific_before_default() {
        let dir = tempdir();
        let payload = json!({
            "default": [{"response_id": 1, "response": "default hit", "name": "d", "note": "", "patterns": [
                {"id": 1, "name": "p", "pattern": "hello", "flags": "IGNORECASE", "url": ""}
            ]}],
            "42": [{"response_id": 1, "response": "server hit", "name": "s", "note": "", "patterns": [
                {"id": 1, "name": "p", "pattern": "hello", "flags": "IGNORECASE", "url": ""}
            ]}],
        });
        let matcher = seeded_matcher(&dir, payload).await;
        assert_eq!(matcher.find_match("42", "Hello there").await, Some("server hit".to_string()));
        assert_eq!(matcher.find_match("99", "Hello there").await, Some("default hit".to_string()));
        let _ = tokio::fs::remove_dir_all(dir).await;
    }

    #[tokio::test]
    async fn response_with_only_uncompilable_patterns_is_dropped() {
        let dir = tempdir();
        let payload = json!({
            "default": [{"response_id": 1, "response": "bad", "name": "", "note": "", "patterns": [
                {"id": 1, "name": "p", "pattern": "(unclosed", "flags": "", "url": ""}
            ]}],
        });
        let matcher = seeded_matcher(&dir, payload).await;
        assert_eq!(matcher.find_match("default", "anything").await, None);
        let _ = tokio::fs::remove_dir_all(dir).await;
    }

    #[tokio::test]
    async fn add_and_remove_response_round_trips() {
        let dir = tempdir();
        let matcher = seeded_matcher(&dir, json!({})).await;
        let id = matcher.add_response("1", "hi", "greet", "", "hello", "IGNORECASE", "").await.unwrap();
        assert_eq!(id, 1);
        assert_eq!(matcher.find_match("1", "HELLO").await, Some("hi".to_string()));

        let removed = matcher.remove_response("1", id).await.unwrap();
        assert!(removed);
        assert_eq!(matcher.find_match("1", "HELLO").await, None);
        let _ = tokio::fs::remove_dir_all(dir).await;
    }

    #[tokio::test]
    async fn add_pattern_assigns_monotonic_id() {
        let dir = tempdir();
        let matcher = seeded_matcher(&dir, json!({})).await;
        let response_id = matcher.add_response("1", "hi", "greet", "", "hello", "", "").await.unwrap();
        let pattern_id = matcher.add_pattern("1", response_id, "hey", "", "p2", "").await.unwrap();
        assert_eq!(pattern_id, 2);
        assert_eq!(matcher.find_match("1", "hey").await, Some("hi".to_string()));
        let _ = tokio::fs::remove_dir_all(dir).await;
    }
}
