//! Local crash-recovery backups.
//!
//! Entries live under `autosave_<save_key>` as `{data, timestamp, key}` JSON.

use crate::error::BackupError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// String key/value store for backups.
#[async_trait]
pub trait BackupStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, BackupError>;

    async fn put(&self, key: &str, value: String) -> Result<(), BackupError>;

    async fn remove(&self, key: &str) -> Result<(), BackupError>;
}

/// Storage key for a save key.
pub fn backup_key(save_key: &str) -> String {
    format!("autosave_{}", save_key)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupEntry<T> {
    pub data: T,
    pub timestamp: DateTime<Utc>,
    pub key: String,
}

pub async fn write_backup<T: Serialize + Sync>(
    store: &dyn BackupStore,
    save_key: &str,
    value: &T,
) -> Result<(), BackupError> {
    write_backup_at(store, save_key, value, Utc::now()).await
}

pub async fn write_backup_at<T: Serialize + Sync>(
    store: &dyn BackupStore,
    save_key: &str,
    value: &T,
    timestamp: DateTime<Utc>,
) -> Result<(), BackupError> {
    let entry = BackupEntry {
        data: value,
        timestamp,
        key: save_key.to_string(),
    };
    let json = serde_json::to_string(&entry)?;
    store.put(&backup_key(save_key), json).await
}

/// The backup for `save_key` if it is younger than `max_age`.
///
/// Expired or unreadable entries are removed and reported as absent.
pub async fn recover_backup<T: DeserializeOwned>(
    store: &dyn BackupStore,
    save_key: &str,
    max_age: Duration,
) -> Result<Option<BackupEntry<T>>, BackupError> {
    recover_backup_at(store, save_key, max_age, Utc::now()).await
}

pub async fn recover_backup_at<T: DeserializeOwned>(
    store: &dyn BackupStore,
    save_key: &str,
    max_age: Duration,
    now: DateTime<Utc>,
) -> Result<Option<BackupEntry<T>>, BackupError> {
    let key = backup_key(save_key);
    let Some(json) = store.get(&key).await? else {
        return Ok(None);
    };

    let entry: BackupEntry<T> = match serde_json::from_str(&json) {
        Ok(entry) => entry,
        Err(e) => {
            warn!(key = %key, error = %e, "Discarding unreadable backup");
            store.remove(&key).await?;
            return Ok(None);
        }
    };

    if entry.key != save_key {
        warn!(key = %key, stored_key = %entry.key, "Backup belongs to another document");
        return Ok(None);
    }

    // A timestamp in the future counts as fresh.
    let age = (now - entry.timestamp).to_std().unwrap_or_default();
    if age > max_age {
        debug!(key = %key, age_secs = age.as_secs(), "Backup expired");
        store.remove(&key).await?;
        return Ok(None);
    }

    Ok(Some(entry))
}

pub async fn clear_backup(store: &dyn BackupStore, save_key: &str) -> Result<(), BackupError> {
    store.remove(&backup_key(save_key)).await
}

/// One JSON file per key in a directory.
pub struct FileBackupStore {
    dir: PathBuf,
}

impl FileBackupStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{}.json", file))
    }
}

#[async_trait]
impl BackupStore for FileBackupStore {
    async fn get(&self, key: &str) -> Result<Option<String>, BackupError> {
        match tokio::fs::read_to_string(self.path_for(key)).await {
            Ok(json) => Ok(Some(json)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, key: &str, value: String) -> Result<(), BackupError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, value).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), BackupError> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Default)]
pub struct MemoryBackupStore {
    entries: DashMap<String, String>,
}

impl MemoryBackupStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl BackupStore for MemoryBackupStore {
    async fn get(&self, key: &str) -> Result<Option<String>, BackupError> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn put(&self, key: &str, value: String) -> Result<(), BackupError> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), BackupError> {
        self.entries.remove(key);
        Ok(())
    }
}
