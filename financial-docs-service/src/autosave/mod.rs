//! Debounced autosave with single-flight saves and local crash-recovery backups.
//!
//! Each controller is one tokio task. Edits arrive over a channel, the task
//! owns the debounce deadline, the in-flight save and the backup timer, and
//! publishes its state through a `watch` channel.

pub mod backup;
mod controller;
mod state;

pub use backup::{
    backup_key, clear_backup, recover_backup, recover_backup_at, write_backup, write_backup_at,
    BackupEntry, BackupStore, FileBackupStore, MemoryBackupStore,
};
pub use controller::{AutosaveController, AutosaveHandle, ErrorCallback};
pub use state::{AutosaveState, SavePhase};

use crate::config::AutosaveSettings;
use crate::error::StoreError;
use async_trait::async_trait;
use service_core::retry::{RetryConfig, Retryable};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct AutosaveConfig {
    pub enabled: bool,
    /// Quiet period after the last edit before a save starts.
    pub delay: Duration,
    /// Identifies the document in the backup store.
    pub save_key: String,
    /// Consecutive failures that raise the persistent error flag.
    pub failure_threshold: u32,
    pub backup_interval: Duration,
    pub backup_max_age: Duration,
    pub save_timeout: Duration,
    /// Backoff between automatic retries of transient failures.
    pub retry: RetryConfig,
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            delay: Duration::from_millis(2000),
            save_key: "document".to_string(),
            failure_threshold: 3,
            backup_interval: Duration::from_secs(30),
            backup_max_age: Duration::from_secs(24 * 3600),
            save_timeout: Duration::from_secs(30),
            retry: RetryConfig::background(),
        }
    }
}

impl AutosaveConfig {
    pub fn from_settings(settings: &AutosaveSettings, save_key: impl Into<String>) -> Self {
        Self {
            enabled: settings.enabled,
            delay: settings.delay(),
            save_key: save_key.into(),
            failure_threshold: settings.failure_threshold.max(1),
            backup_interval: settings.backup_interval(),
            backup_max_age: settings.backup_max_age(),
            save_timeout: settings.save_timeout(),
            retry: RetryConfig::background(),
        }
    }
}

/// Why a save did not complete.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SaveError {
    /// The value is not yet savable. Skipped, never retried, not an error.
    #[error("Not savable yet: {0}")]
    Validation(String),

    /// The target refused the value. Counted as a failure, not retried.
    #[error("Save rejected: {0}")]
    Rejected(String),

    /// Network, timeout or server failure. Retried with backoff.
    #[error("Save failed: {0}")]
    Transient(String),
}

impl Retryable for SaveError {
    fn is_retryable(&self) -> bool {
        matches!(self, SaveError::Transient(_))
    }
}

impl From<StoreError> for SaveError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Transient(msg) => SaveError::Transient(msg),
            other => SaveError::Rejected(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AutosaveError {
    #[error("Autosave controller has shut down")]
    Closed,

    #[error(transparent)]
    Save(#[from] SaveError),
}

/// Where the controller persists values.
#[async_trait]
pub trait SaveTarget<T>: Send + Sync {
    async fn save(&self, value: &T) -> Result<(), SaveError>;
}
