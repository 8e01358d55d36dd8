//! Persistent response cache keyed by request URL
//!
//! Collectors store successful upstream bodies here so repeated scans do not
//! hit registries again. A lookup never fails: missing, expired and corrupted
//! entries are all reported as absent.

use crate::config::CacheConfig;
use crate::error::{Result, ScanError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::fs;
use tracing::debug;

/// Key-value store for raw response bodies
#[async_trait]
pub trait ResponseCache: Send + Sync {
    /// Look up a cached body; absence is a normal outcome
    async fn try_get(&self, key: &str) -> Option<String>;

    /// Store a body, overwriting any previous value for `key`
    async fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// Build the cache described by `config`
pub fn from_config(config: &CacheConfig) -> Arc<dyn ResponseCache> {
    if config.enabled {
        Arc::new(FileCache::new(config.directory.clone(), config.ttl()))
    } else {
        Arc::new(MemoryCache::new())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    key: String,
    body: String,
    stored_at_ms: u64,
}

/// File-backed cache: one JSON document per key, named by the SHA-256 of the key
pub struct FileCache {
    directory: PathBuf,
    ttl: Option<Duration>,
    write_seq: AtomicU64,
}

impl FileCache {
    /// Create a cache rooted at `directory`; the directory is created on first write
    pub fn new(directory: impl Into<PathBuf>, ttl: Option<Duration>) -> Self {
        Self {
            directory: directory.into(),
            ttl,
            write_seq: AtomicU64::new(0),
        }
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.directory.join(format!("{}.json", digest(key)))
    }

    fn is_expired(&self, entry: &StoredEntry) -> bool {
        match self.ttl {
            Some(ttl) => {
                let age = now_millis().saturating_sub(entry.stored_at_ms);
                u128::from(age) >= ttl.as_millis()
            }
            None => false,
        }
    }
}

#[async_trait]
impl ResponseCache for FileCache {
    async fn try_get(&self, key: &str) -> Option<String> {
        let path = self.entry_path(key);
        let content = fs::read_to_string(&path).await.ok()?;

        let entry: StoredEntry = match serde_json::from_str(&content) {
            Ok(entry) => entry,
            Err(e) => {
                debug!("Ignoring unreadable cache file {:?}: {}", path, e);
                return None;
            }
        };

        if entry.key != key {
            debug!("Cache key mismatch in {:?}", path);
            return None;
        }
        if self.is_expired(&entry) {
            debug!("Cache entry expired for {}", key);
            return None;
        }

        debug!("Cache hit for {}", key);
        Some(entry.body)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        fs::create_dir_all(&self.directory).await.map_err(|e| {
            ScanError::cache(format!(
                "cannot create cache directory {:?}: {}",
                self.directory, e
            ))
        })?;

        let entry = StoredEntry {
            key: key.to_string(),
            body: value.to_string(),
            stored_at_ms: now_millis(),
        };
        let content = serde_json::to_string(&entry)?;

        // Unique temp name per write so concurrent writers of one key never
        // interleave; the final rename is atomic and last-write-wins.
        let seq = self.write_seq.fetch_add(1, Ordering::Relaxed);
        let final_path = self.entry_path(key);
        let temp_path = self.directory.join(format!(
            "{}.{}.{}.tmp",
            digest(key),
            std::process::id(),
            seq
        ));

        fs::write(&temp_path, content)
            .await
            .map_err(|e| ScanError::cache(format!("cannot write {:?}: {}", temp_path, e)))?;

        if let Err(e) = fs::rename(&temp_path, &final_path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(ScanError::cache(format!(
                "cannot move cache entry into place {:?}: {}",
                final_path, e
            )));
        }

        debug!("Cached response for {}", key);
        Ok(())
    }
}

/// In-process cache, used when persistence is disabled and in tests
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ResponseCache for MemoryCache {
    async fn try_get(&self, key: &str) -> Option<String> {
        self.entries.read().ok()?.get(key).cloned()
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| ScanError::cache("memory cache lock poisoned"))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

fn digest(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
