//! One document being edited, bound to its autosave controller.
//!
//! Edits apply to the document synchronously (totals included) and only then
//! reach the controller, so every save carries consistent totals.

use crate::autosave::{
    recover_backup, AutosaveConfig, AutosaveController, AutosaveError, AutosaveHandle,
    AutosaveState, BackupStore, FileBackupStore, MemoryBackupStore, SaveError, SaveTarget,
};
use crate::config::AutosaveSettings;
use crate::error::{BackupError, DocumentError, SessionError};
use crate::lifecycle::{StatusLifecycle, TransitionOutcome};
use crate::models::{DocumentStatus, FinancialDocument, TransitionMode};
use crate::services::DocumentStore;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// Saves documents to a [`DocumentStore`], refusing ones that are not complete.
pub struct StoreSaveTarget {
    store: Arc<dyn DocumentStore>,
}

impl StoreSaveTarget {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl SaveTarget<FinancialDocument> for StoreSaveTarget {
    async fn save(&self, document: &FinancialDocument) -> Result<(), SaveError> {
        document
            .validate_for_save()
            .map_err(|e| SaveError::Validation(e.to_string()))?;
        self.store.save(document).await?;
        Ok(())
    }
}

/// Opens editing sessions with the configured autosave settings, store and
/// backup location.
#[derive(Clone)]
pub struct SessionFactory {
    settings: AutosaveSettings,
    target: Arc<dyn SaveTarget<FinancialDocument>>,
    backups: Arc<dyn BackupStore>,
}

impl SessionFactory {
    /// Backups go to `settings.backup_dir` when set, otherwise to memory.
    pub fn new(settings: AutosaveSettings, store: Arc<dyn DocumentStore>) -> Self {
        let backups: Arc<dyn BackupStore> = match &settings.backup_dir {
            Some(dir) => {
                info!(backup_dir = %dir.display(), "Autosave backups on disk");
                Arc::new(FileBackupStore::new(dir.clone()))
            }
            None => Arc::new(MemoryBackupStore::new()),
        };
        Self {
            settings,
            target: Arc::new(StoreSaveTarget::new(store)),
            backups,
        }
    }

    pub fn backups(&self) -> &Arc<dyn BackupStore> {
        &self.backups
    }

    /// Start editing `document`; see [`EditingSession::start`].
    pub fn open(&self, document: FinancialDocument, persisted: bool) -> EditingSession {
        let config = AutosaveConfig::from_settings(&self.settings, document.id().to_string());
        EditingSession::start(
            document,
            persisted,
            Arc::clone(&self.target),
            config,
            Some(Arc::clone(&self.backups)),
        )
    }
}

pub struct EditingSession {
    document: FinancialDocument,
    autosave: AutosaveHandle<FinancialDocument>,
    backup: Option<Arc<dyn BackupStore>>,
    config: AutosaveConfig,
}

impl EditingSession {
    /// Start editing. `persisted` tells whether `document` is already stored
    /// as it is; a new document is saved on the first debounce.
    pub fn start(
        document: FinancialDocument,
        persisted: bool,
        target: Arc<dyn SaveTarget<FinancialDocument>>,
        mut config: AutosaveConfig,
        backup: Option<Arc<dyn BackupStore>>,
    ) -> Self {
        config.save_key = document.id().to_string();

        let mut controller = AutosaveController::new(config.clone(), target).on_error({
            let document_id = document.id();
            move |error: &SaveError| warn!(document_id = %document_id, error = %error, "Autosave error")
        });
        if persisted {
            controller = controller.with_baseline(document.clone());
        }
        if let Some(store) = &backup {
            controller = controller.with_backup_store(Arc::clone(store));
        }

        let autosave = controller.spawn();
        if !persisted {
            if let Err(e) = autosave.update(document.clone()) {
                warn!(error = %e, "Autosave unavailable");
            }
        }

        Self {
            document,
            autosave,
            backup,
            config,
        }
    }

    pub fn document(&self) -> &FinancialDocument {
        &self.document
    }

    /// Apply `change` and hand the result to autosave.
    pub fn edit<R>(
        &mut self,
        change: impl FnOnce(&mut FinancialDocument) -> Result<R, DocumentError>,
    ) -> Result<R, DocumentError> {
        let result = change(&mut self.document)?;
        self.observe();
        Ok(result)
    }

    /// Change status and save at once. The client hears about a `sent`
    /// transition only after the save lands; a failed save rolls the status
    /// back.
    pub async fn transition(
        &mut self,
        lifecycle: &StatusLifecycle,
        to: DocumentStatus,
        mode: TransitionMode,
    ) -> Result<TransitionOutcome, SessionError> {
        let mut next = self.document.clone();
        let applied = lifecycle.apply(&mut next, to, mode, Utc::now())?;
        if !applied.changed() {
            return Ok(lifecycle.announce(&self.document, applied).await);
        }

        let previous = std::mem::replace(&mut self.document, next);
        self.observe();
        if let Err(e) = self.autosave.save_now().await {
            warn!(
                document_id = %self.document.id(),
                to = to.as_str(),
                error = %e,
                "Transition not saved; status restored"
            );
            self.document = previous;
            self.observe();
            return Err(e.into());
        }

        Ok(lifecycle.announce(&self.document, applied).await)
    }

    pub fn reopen(&mut self, lifecycle: &StatusLifecycle) -> Result<DocumentStatus, DocumentError> {
        let from = lifecycle.reopen(&mut self.document, Utc::now())?;
        self.observe();
        Ok(from)
    }

    /// Replace the document with a fresh local backup, if one exists.
    pub async fn restore_backup(&mut self) -> Result<bool, BackupError> {
        let Some(store) = &self.backup else {
            return Ok(false);
        };
        let entry = recover_backup::<FinancialDocument>(
            store.as_ref(),
            &self.config.save_key,
            self.config.backup_max_age,
        )
        .await?;

        match entry {
            Some(entry) if entry.data.id() == self.document.id() && entry.data != self.document => {
                info!(
                    document_id = %self.document.id(),
                    backed_up_at = %entry.timestamp,
                    "Restored document from backup"
                );
                self.document = entry.data;
                self.observe();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub async fn save_now(&self) -> Result<(), AutosaveError> {
        self.autosave.save_now().await
    }

    pub fn autosave_state(&self) -> AutosaveState {
        self.autosave.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<AutosaveState> {
        self.autosave.subscribe()
    }

    /// Stop autosave; a save already in flight completes first.
    pub async fn close(self) -> FinancialDocument {
        self.autosave.shutdown().await;
        self.document
    }

    fn observe(&self) {
        if let Err(e) = self.autosave.update(self.document.clone()) {
            warn!(document_id = %self.document.id(), error = %e, "Autosave unavailable");
        }
    }
}
