use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chorus_core::config::MediaCacheConfig;
use chorus_core::Result;
use chorus_storage::JsonStore;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::service::UploadService;

const PERMANENT_PATH_HINTS: &[&str] = &[
    "discordapp.com/avatars/",
    "discordapp.com/icons/",
    "discordapp.com/banners/",
    "discordapp.com/splashes/",
    "discordapp.com/emojis/",
];

const PERMANENT_SERVICE_NAMES: &[&str] = &["pixeldrain", "catbox"];
const TEMPORARY_SERVICE_NAME: &str = "litterbox";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaEntry {
    pub url: String,
    pub expiry_timestamp: Option<i64>,
    pub known_urls: Vec<String>,
}

#[derive(Default, Serialize, Deserialize)]
struct OnDisk {
    #[serde(default)]
    media_entries: HashMap<String, MediaEntry>,
    #[serde(default)]
    url_to_hash_map: HashMap<String, String>,
}

struct State {
    media_entries: HashMap<String, MediaEntry>,
    url_to_hash: HashMap<String, String>,
    dirty: bool,
}

/// Content-hash cache that rewrites short-lived CDN URLs into URLs that
/// survive link expiry (§4.4). Every state access goes through a single
/// async lock — upload latency dominates, so fine-grained locking buys
/// nothing but complexity.
pub struct MediaCache {
    state: Mutex<State>,
    store: Arc<JsonStore>,
    path: PathBuf,
    services: Vec<Box<dyn UploadService>>,
    config: MediaCacheConfig,
    client: reqwest::Client,
}

impl MediaCache {
    pub async fn load(
        store: Arc<JsonStore>,
        data_root: impl Into<PathBuf>,
        services: Vec<Box<dyn UploadService>>,
        config: MediaCacheConfig,
    ) -> Result<Self> {
        let path = data_root.into().join("media_cache.json");
        let value = store.read(&path).await;
        let on_disk: OnDisk = serde_json::from_value(value).unwrap_or_default();

        // Eagerly purge anything that already expired while the process was
        // down, so a long-dead entry never gets served as if still valid.
        // The purge itself isn't persisted until the next `flush`.
        let now = chrono::Utc::now().timestamp();
        let mut media_entries = on_disk.media_entries;
        let expired_hashes: std::collections::HashSet<String> = media_entries
            .iter()
            .filter(|(_, entry)| entry.expiry_timestamp.is_some_and(|ts| ts <= now))
            .map(|(hash, _)| hash.clone())
            .collect();
        let purged = expired_hashes.len();
        media_entries.retain(|hash, _| !expired_hashes.contains(hash));
        let url_to_hash: HashMap<String, String> = on_disk
            .url_to_hash_map
            .into_iter()
            .filter(|(_, hash)| !expired_hashes.contains(hash))
            .collect();
        if purged > 0 {
            info!(purged, "purged expired media cache entries on load");
        }

        Ok(Self {
            state: Mutex::new(State {
                media_entries,
                url_to_hash,
                dirty: purged > 0,
            }),
            store,
            path,
            services,
            config,
            client: reqwest::Client::new(),
        })
    }

    fn clean_url(url: &str) -> String {
        url.split('?').next().unwrap_or(url).to_string()
    }

    fn is_permanent_candidate(url: &str) -> bool {
        let lower = url.to_lowercase();
        PERMANENT_PATH_HINTS.iter().any(|hint| lower.contains(hint))
    }

    /// Take a source media URL and return one that survives link expiry,
    /// degrading gracefully to the original URL on any failure (§4.4 steps 1-7).
    pub async fn cache_url(&self, url: &str) -> String {
        if !self.config.enabled {
            return url.to_string();
        }
        let clean = Self::clean_url(url);
        let now = chrono::Utc::now().timestamp();

        // Fast path.
        {
            let state = self.state.lock().await;
            if let Some(hash) = state.url_to_hash.get(&clean) {
                if let Some(entry) = state.media_entries.get(hash) {
                    let still_valid = entry.expiry_timestamp.map(|exp| exp > now).unwrap_or(true);
                    if still_valid {
                        return entry.url.clone();
                    }
                }
            }
        }

        let bytes = match self.client.get(url).send().await {
            Ok(resp) if resp.status().is_success() => match resp.bytes().await {
                Ok(b) => b.to_vec(),
                Err(e) => {
                    warn!(url, error = %e, "failed to read media bytes, degrading to original url");
                    return url.to_string();
                }
            },
            Ok(resp) => {
                warn!(url, status = %resp.status(), "media fetch returned non-200, degrading to original url");
                return url.to_string();
            }
            Err(e) => {
                warn!(url, error = %e, "media fetch failed, degrading to original url");
                return url.to_string();
            }
        };

        let file_hash = hex::encode(Sha256::digest(&bytes));

        // Medium path: identical bytes already cached under a different URL.
        {
            let mut state = self.state.lock().await;
            if let Some(entry) = state.media_entries.get_mut(&file_hash) {
                if !entry.known_urls.contains(&clean) {
                    entry.known_urls.push(clean.clone());
                }
                let stored_url = entry.url.clone();
                state.url_to_hash.insert(clean.clone(), file_hash.clone());
                state.dirty = true;
                return stored_url;
            }
        }

        // Slow path: classify permanent vs temporary, try eligible services in random order.
        let permanent_preferred = Self::is_permanent_candidate(&clean);
        let mut eligible: Vec<&Box<dyn UploadService>> = if permanent_preferred {
            let mut perm: Vec<_> = self.services.iter().filter(|s| s.is_permanent()).collect();
            if perm.is_empty() {
                let fallback: Vec<_> = self.services.iter().filter(|s| !s.is_permanent()).collect();
                if !fallback.is_empty() {
                    warn!(url, "no permanent storage service configured, falling back to temporary");
                }
                perm = fallback;
            }
            perm
        } else {
            self.services.iter().filter(|s| !s.is_permanent()).collect()
        };
        eligible.shuffle(&mut rand::thread_rng());

        let filename = clean.rsplit('/').next().unwrap_or("media").to_string();
        for service in eligible {
            match service.upload(bytes.clone(), &filename, self.config.upload_timeout_secs).await {
                Ok(result) => {
                    let mut state = self.state.lock().await;
                    state.media_entries.insert(
                        file_hash.clone(),
                        MediaEntry {
                            url: result.url.clone(),
                            expiry_timestamp: result.expiry_timestamp,
                            known_urls: vec![clean.clone()],
                        },
                    );
                    state.url_to_hash.insert(clean.clone(), file_hash.clone());
                    state.dirty = true;
                    info!(service = service.name(), url, "media cached");
                    return result.url;
                }
                Err(e) => {
                    warn!(service = service.name(), url, error = %e, "upload failed, trying next service");
                }
            }
        }

        warn!(url, "all upload services failed, degrading to original url");
        url.to_string()
    }

    /// Re-run [`Self::cache_url`] for a Discord URL (upload-if-missing), or
    /// check the stored expiry for a non-Discord URL. Returns `None` if the
    /// entry has expired, so the formatter can render an expiry placeholder.
    pub async fn validate_and_update_url(&self, url: &str, is_discord_url: bool) -> Option<String> {
        if is_discord_url {
            return Some(self.cache_url(url).await);
        }
        let clean = Self::clean_url(url);
        let state = self.state.lock().await;
        let Some(hash) = state.url_to_hash.get(&clean) else {
            return Some(url.to_string());
        };
        let Some(entry) = state.media_entries.get(hash) else {
            return Some(url.to_string());
        };
        let now = chrono::Utc::now().timestamp();
        match entry.expiry_timestamp {
            Some(exp) if exp <= now => None,
            _ => Some(entry.url.clone()),
        }
    }

    /// Flush the in-memory state to disk if it's dirty. Called by the
    /// periodic background task and unconditionally on shutdown.
    pub async fn flush(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.dirty {
            return Ok(());
        }
        let on_disk = json!({
            "media_entries": state.media_entries,
            "url_to_hash_map": state.url_to_hash,
        });
        self.store.write(&self.path, &on_disk).await?;
        state.dirty = false;
        debug!("flushed media cache to disk");
        Ok(())
    }

    /// Spawn the 30s background flush task (§4.4 step 8, §5).
    pub fn spawn_background_flush(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let interval_secs = self.config.save_interval_secs.max(1);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
            loop {
                ticker.tick().await;
                if let Err(e) = self.flush().await {
                    warn!(error = %e, "periodic media cache flush failed");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::service::UploadResult;

    struct FakeService {
        permanent: bool,
    }

    #[async_trait]
    impl UploadService for FakeService {
        fn name(&self) -> &str {
            "fake"
        }
        fn is_permanent(&self) -> bool {
            self.permanent
        }
        async fn upload(&self, _bytes: Vec<u8>, _filename: &str, _timeout_secs: u64) -> Result<UploadResult, crate::service::UploadError> {
            Ok(UploadResult {
                url: "https://fake.example/stored".to_string(),
                expiry_timestamp: None,
            })
        }
    }

    #[test]
    fn clean_url_strips_query_string() {
        assert_eq!(MediaCache::clean_url("https://x/a.png?ex=1&sig=abc"), "https://x/a.png");
    }

    #[test]
    fn avatar_path_is_permanent_candidate() {
        assert!(MediaCache::is_permanent_candidate("https://cdn.discord/avatars/1/2.png"));
        assert!(!MediaCache::is_permanent_candidate("https://cdn.discord/attachments/1/2.png"));
    }
}
