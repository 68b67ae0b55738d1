use chrono::{DateTime, Utc};
use serde::Serialize;

/// Where the controller is in its save cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SavePhase {
    #[default]
    Idle,
    /// Waiting for the debounce deadline (or a retry backoff).
    PendingSave,
    Saving,
    /// The last save failed.
    Error,
}

/// Read-only view of an autosave controller.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutosaveState {
    pub phase: SavePhase,
    pub is_saving: bool,
    pub last_saved_at: Option<DateTime<Utc>>,
    pub has_unsaved_changes: bool,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
    /// Raised after repeated failures; cleared by the next successful save.
    pub persistent_error: bool,
}
