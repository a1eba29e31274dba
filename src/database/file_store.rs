//! durable tier of the cache
//!
//! every key lives in its own `<percent-encoded key>.cache` file holding
//! `{value, created_at, expires_at}`. expiry is enforced here: reading an expired entry deletes
//! the file and reports a miss, and [`FileStore::clear_expired`] sweeps the whole directory.
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

const CACHE_EXTENSION: &str = "cache";

/// a hundred years. longer ttls are stored without an expiry
pub const MAX_TTL_SECONDS: u64 = 100 * 365 * 24 * 60 * 60;

/// `now + ttl`, None for a zero ttl or one past [`MAX_TTL_SECONDS`]
pub fn expiry_after(now: DateTime<Utc>, ttl_seconds: u64) -> Option<DateTime<Utc>> {
    if ttl_seconds == 0 || ttl_seconds > MAX_TTL_SECONDS {
        return None;
    }

    i64::try_from(ttl_seconds)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .and_then(|ttl| now.checked_add_signed(ttl))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileCacheEntry {
    pub value: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl FileCacheEntry {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }
}

#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub async fn open(dir: impl AsRef<Path>) -> std::io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        // keys carry ':' and potentially '/', encoding keeps them one flat file each
        self.dir
            .join(format!("{}.{}", urlencoding::encode(key), CACHE_EXTENSION))
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        let path = self.entry_path(key);

        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                error!("Error reading cache file {}: {}", key, e);
                return None;
            }
        };

        let entry: FileCacheEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                error!("Error parsing cache file {}: {}", key, e);
                return None;
            }
        };

        if entry.is_expired_at(Utc::now()) {
            debug!("Cache expired (file): {}", key);
            self.delete(key).await;
            return None;
        }

        debug!("Cache hit (file): {}", key);
        Some(entry.value)
    }

    pub async fn set(&self, key: &str, value: &str, ttl_seconds: Option<u64>) -> bool {
        let now = Utc::now();
        let entry = FileCacheEntry {
            value: value.to_string(),
            created_at: now,
            expires_at: ttl_seconds.and_then(|ttl| expiry_after(now, ttl)),
        };

        let body = match serde_json::to_string_pretty(&entry) {
            Ok(body) => body,
            Err(e) => {
                error!("Error serializing cache entry {}: {}", key, e);
                return false;
            }
        };

        // write then rename so a concurrent reader or sweep never sees half a file
        let path = self.entry_path(key);
        let tmp_path = path.with_extension(format!("{}.tmp", rand::random::<u32>()));

        if let Err(e) = tokio::fs::write(&tmp_path, body).await {
            error!("Error writing cache file {}: {}", key, e);
            return false;
        }

        match tokio::fs::rename(&tmp_path, &path).await {
            Ok(_) => {
                debug!("Cache set (file): {}", key);
                true
            }
            Err(e) => {
                error!("Error moving cache file {} into place: {}", key, e);
                let _ = tokio::fs::remove_file(&tmp_path).await;
                false
            }
        }
    }

    pub async fn delete(&self, key: &str) -> bool {
        match tokio::fs::remove_file(self.entry_path(key)).await {
            Ok(_) => {
                debug!("Cache deleted (file): {}", key);
                true
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
            Err(e) => {
                error!("Error deleting cache file {}: {}", key, e);
                false
            }
        }
    }

    pub async fn exists(&self, key: &str) -> bool {
        self.get(key).await.is_some()
    }

    /// removes every entry past its expiry, returns how many were removed
    pub async fn clear_expired(&self) -> usize {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) => {
                error!("Error listing cache dir {}: {}", self.dir.display(), e);
                return 0;
            }
        };

        let now = Utc::now();
        let mut count = 0;

        loop {
            let dir_entry = match entries.next_entry().await {
                Ok(Some(dir_entry)) => dir_entry,
                Ok(None) => break,
                Err(e) => {
                    warn!("Error walking cache dir: {}", e);
                    break;
                }
            };

            let path = dir_entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(CACHE_EXTENSION) {
                continue;
            }

            // a file that vanished or can't be parsed is somebody else's problem, skip it
            let Ok(raw) = tokio::fs::read_to_string(&path).await else {
                continue;
            };
            let Ok(entry) = serde_json::from_str::<FileCacheEntry>(&raw) else {
                continue;
            };

            if entry.is_expired_at(now) && tokio::fs::remove_file(&path).await.is_ok() {
                count += 1;
            }
        }

        count
    }
}
