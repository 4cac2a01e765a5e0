//! Thin key→file JSON driver with per-path locking. Every higher-level store in this
//! workspace (conversation history, indexes, pattern rulebooks, media
//! cache) calls through here rather than touching the filesystem directly,
//! so concurrent workers can never tear a file mid-write.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{error, info, warn};

pub use chorus_core::{ChorusError, Result};

/// Registry of path → per-path async lock, plus the driver methods.
///
/// Locking is deliberately per-path, not global: a write to one channel's
/// history file never blocks a read of another channel's, while writers to
/// the *same* file still serialize.
#[derive(Default)]
pub struct JsonStore {
    locks: std::sync::Mutex<HashMap<PathBuf, Arc<AsyncMutex<()>>>>,
}

impl JsonStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, path: &Path) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap();
        locks
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Read a JSON file, returning `null` (an empty object for callers that
    /// treat absence as `{}`) if the file doesn't exist. A file that fails
    /// to parse is renamed aside to `<path>.<epoch>.bak` so a future retry
    /// doesn't keep stumbling over the same corrupt bytes, and an empty
    /// value is returned rather than propagating the parse error.
    pub async fn read(&self, path: &Path) -> Value {
        let lock = self.lock_for(path);
        let _guard = lock.lock().await;
        self.read_locked(path).await
    }

    async fn read_locked(&self, path: &Path) -> Value {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Value::Object(Default::default()),
            Err(e) => {
                error!(path = %path.display(), error = %e, "failed to read storage file");
                return Value::Object(Default::default());
            }
        };

        match serde_json::from_slice::<Value>(&bytes) {
            Ok(value) => value,
            Err(e) => {
                error!(path = %path.display(), error = %e, "corrupt JSON, backing up and resetting");
                let epoch = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .map(|d| d.as_secs())
                    .unwrap_or(0);
                let backup = path.with_extension(format!(
                    "{}.{epoch}.bak",
                    path.extension().and_then(|e| e.to_str()).unwrap_or("json")
                ));
                if let Err(e) = tokio::fs::rename(path, &backup).await {
                    error!(path = %path.display(), error = %e, "could not back up corrupted file");
                } else {
                    info!(backup = %backup.display(), "backed up corrupted storage file");
                }
                Value::Object(Default::default())
            }
        }
    }

    /// Write `value` to `path` atomically: serialize to `<path>.tmp`, then
    /// rename over the target. Creates parent directories as needed.
    pub async fn write(&self, path: &Path, value: &Value) -> Result<()> {
        let lock = self.lock_for(path);
        let _guard = lock.lock().await;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ChorusError::Storage(format!("creating {}: {e}", parent.display())))?;
        }

        let tmp_path = path.with_extension(format!(
            "{}.tmp",
            path.extension().and_then(|e| e.to_str()).unwrap_or("json")
        ));
        let serialized = serde_json::to_vec_pretty(value)
            .map_err(|e| ChorusError::Storage(format!("serializing {}: {e}", path.display())))?;

        tokio::fs::write(&tmp_path, &serialized)
            .await
            .map_err(|e| ChorusError::Storage(format!("writing {}: {e}", tmp_path.display())))?;

        tokio::fs::rename(&tmp_path, path).await.map_err(|e| {
            ChorusError::Storage(format!("renaming {} -> {}: {e}", tmp_path.display(), path.display()))
        })?;

        Ok(())
    }

    /// Read-modify-write convenience: reads `path` (or `{}`), applies `f`,
    /// writes the result back. The per-path lock is held across read and
    /// write so the whole cycle is atomic with respect to other callers.
    pub async fn update<F>(&self, path: &Path, f: F) -> Result<()>
    where
        F: FnOnce(Value) -> Value,
    {
        let lock = self.lock_for(path);
        let _guard = lock.lock().await;
        let current = self.read_locked(path).await;
        let updated = f(current);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ChorusError::Storage(format!("creating {}: {e}", parent.display())))?;
        }
        let tmp_path = path.with_extension(format!(
            "{}.tmp",
            path.extension().and_then(|e| e.to_str()).unwrap_or("json")
        ));
        let serialized = serde_json::to_vec_pretty(&updated)
            .map_err(|e| ChorusError::Storage(format!("serializing {}: {e}", path.display())))?;
        tokio::fs::write(&tmp_path, &serialized)
            .await
            .map_err(|e| ChorusError::Storage(format!("writing {}: {e}", tmp_path.display())))?;
        tokio::fs::rename(&tmp_path, path).await.map_err(|e| {
            ChorusError::Storage(format!("renaming {} -> {}: {e}", tmp_path.display(), path.display()))
        })?;
        Ok(())
    }

    /// Delete a file if present; missing files are not an error.
    pub async fn remove(&self, path: &Path) -> Result<()> {
        let lock = self.lock_for(path);
        let _guard = lock.lock().await;
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to remove storage file");
                Err(ChorusError::Storage(format!("removing {}: {e}", path.display())))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn read_missing_file_returns_empty_object() {
        let store = JsonStore::new();
        let dir = tempdir();
        let path = dir.join("does-not-exist.json");
        assert_eq!(store.read(&path).await, json!({}));
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let store = JsonStore::new();
        let dir = tempdir();
        let path = dir.join("nested").join("value.json");
        let value = json!({"hello": "world"});
        store.write(&path, &value).await.unwrap();
        assert_eq!(store.read(&path).await, value);
        let _ = tokio::fs::remove_dir_all(dir).await;
    }

    #[tokio::test]
    async fn corrupt_file_is_backed_up_and_read_returns_empty() {
        let store = JsonStore::new();
        let dir = tempdir();
        let path = dir.join("corrupt.json");
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(&path, b"not json").await.unwrap();

        let value = store.read(&path).await;
        assert_eq!(value, json!({}));
        assert!(!path.exists());
        let _ = tokio::fs::remove_dir_all(dir).await;
    }

    #[tokio::test]
    async fn update_is_atomic_rmw() {
        let store = JsonStore::new();
        let dir = tempdir();
        let path = dir.join("counter.json");
        store
            .update(&path, |v| {
                let mut obj = v.as_object().cloned().unwrap_or_default();
                let n = obj.get("n").and_then(Value::as_i64).unwrap_or(0);
                obj.insert("n".to_string(), json!(n + 1));
                Value::Object(obj)
            })
            .await
            .unwrap();
        store
            .update(&path, |v| {
                let mut obj = v.as_object().cloned().unwrap_or_default();
                let n = obj.get("n").and_then(Value::as_i64).unwrap_or(0);
                obj.insert("n".to_string(), json!(n + 1));
                Value::Object(obj)
            })
            .await
            .unwrap();
        let value = store.read(&path).await;
        assert_eq!(value["n"], json!(2));
        let _ = tokio::fs::remove_dir_all(dir).await;
    }

    fn tempdir() -> PathBuf {
        let mut dir = std::env::temp_dir();
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        dir.push(format!("chorus-storage-test-{nanos}"));
        dir
    }
}
