use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::repositories::RepositoryError;

pub const DEFAULT_CACHE_TTL_SECS: i64 = 24 * 60 * 60;

/// Raw string storage keyed by name, the device-local half of order persistence.
#[async_trait]
pub trait LocalCache: Send + Sync {
    async fn read(&self, key: &str) -> Result<Option<String>, RepositoryError>;
    async fn write(&self, key: &str, value: &str) -> Result<(), RepositoryError>;
    async fn remove(&self, key: &str) -> Result<(), RepositoryError>;
}

/// One JSON file per key inside `dir`.
#[derive(Clone, Debug)]
pub struct FileLocalCache {
    dir: PathBuf,
}

impl FileLocalCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|ch| {
                if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.') {
                    ch
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{file_name}.json"))
    }
}

#[async_trait]
impl LocalCache for FileLocalCache {
    async fn read(&self, key: &str) -> Result<Option<String>, RepositoryError> {
        match tokio::fs::read_to_string(self.path_for(key)).await {
            Ok(raw) => Ok(Some(raw)),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error.into()),
        }
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), RepositoryError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(key);
        let staging = path.with_extension("json.tmp");
        tokio::fs::write(&staging, value).await?;
        tokio::fs::rename(&staging, &path).await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), RepositoryError> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error.into()),
        }
    }
}

#[derive(Default)]
pub struct InMemoryLocalCache {
    entries: RwLock<HashMap<String, String>>,
}

#[async_trait]
impl LocalCache for InMemoryLocalCache {
    async fn read(&self, key: &str) -> Result<Option<String>, RepositoryError> {
        let entries = self.entries.read().await;
        Ok(entries.get(key).cloned())
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), RepositoryError> {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), RepositoryError> {
        let mut entries = self.entries.write().await;
        entries.remove(key);
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalEnvelope<T> {
    pub version: u32,
    pub timestamp: DateTime<Utc>,
    pub data: T,
}

/// Wraps every value in a [`LocalEnvelope`]. Entries written under another schema version
/// or older than the TTL read back as absent.
pub struct VersionedCache<C> {
    inner: C,
    version: u32,
    ttl: Duration,
}

impl<C: LocalCache> VersionedCache<C> {
    pub fn new(inner: C, version: u32) -> Self {
        Self { inner, version, ttl: Duration::seconds(DEFAULT_CACHE_TTL_SECS) }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    pub async fn save<T: Serialize + Sync>(&self, key: &str, data: &T) -> bool {
        self.save_at(key, data, Utc::now()).await
    }

    /// Never fails the caller; storage problems are logged and reported as `false`.
    pub async fn save_at<T: Serialize + Sync>(
        &self,
        key: &str,
        data: &T,
        now: DateTime<Utc>,
    ) -> bool {
        let envelope = LocalEnvelope { version: self.version, timestamp: now, data };
        let raw = match serde_json::to_string(&envelope) {
            Ok(raw) => raw,
            Err(error) => {
                warn!(
                    event_name = "cache.encode_failed",
                    key,
                    error = %error,
                    "could not encode cache entry"
                );
                return false;
            }
        };

        match self.inner.write(key, &raw).await {
            Ok(()) => true,
            Err(error) => {
                warn!(
                    event_name = "cache.write_failed",
                    key,
                    error = %error,
                    "local cache write failed"
                );
                false
            }
        }
    }

    pub async fn load<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.load_at(key, Utc::now()).await
    }

    pub async fn load_at<T: DeserializeOwned>(&self, key: &str, now: DateTime<Utc>) -> Option<T> {
        self.load_envelope_at(key, now).await.map(|envelope| envelope.data)
    }

    pub async fn load_envelope_at<T: DeserializeOwned>(
        &self,
        key: &str,
        now: DateTime<Utc>,
    ) -> Option<LocalEnvelope<T>> {
        let raw = match self.inner.read(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(error) => {
                warn!(
                    event_name = "cache.read_failed",
                    key,
                    error = %error,
                    "local cache read failed"
                );
                return None;
            }
        };

        let envelope = match serde_json::from_str::<LocalEnvelope<T>>(&raw) {
            Ok(envelope) => envelope,
            Err(error) => {
                warn!(
                    event_name = "cache.decode_failed",
                    key,
                    error = %error,
                    "discarding unreadable cache entry"
                );
                self.discard(key).await;
                return None;
            }
        };

        if envelope.version != self.version {
            debug!(
                event_name = "cache.version_mismatch",
                key,
                stored_version = envelope.version,
                running_version = self.version,
                "discarding cache entry from another schema version"
            );
            self.discard(key).await;
            return None;
        }

        if now - envelope.timestamp > self.ttl {
            debug!(
                event_name = "cache.expired",
                key,
                stored_at = %envelope.timestamp,
                "cache entry expired"
            );
            self.discard(key).await;
            return None;
        }

        Some(envelope)
    }

    pub async fn clear(&self, key: &str) {
        self.discard(key).await;
    }

    async fn discard(&self, key: &str) {
        if let Err(error) = self.inner.remove(key).await {
            warn!(
                event_name = "cache.remove_failed",
                key,
                error = %error,
                "could not remove cache entry"
            );
        }
    }
}
