//! Error types for financial-docs-service.

use crate::models::{DocumentKind, DocumentStatus};
use service_core::error::AppError;
use service_core::retry::Retryable;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised while editing a document or moving it through its lifecycle.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition {
        from: DocumentStatus,
        to: DocumentStatus,
    },

    #[error("Status {status} does not apply to a {kind}")]
    StatusNotApplicable {
        kind: DocumentKind,
        status: DocumentStatus,
    },

    #[error("Document is {0}; reopen it before changing financial fields")]
    Locked(DocumentStatus),

    #[error("Section not found: {0}")]
    SectionNotFound(Uuid),

    #[error("Line item not found: {0}")]
    LineItemNotFound(Uuid),

    #[error("{0}")]
    Unsupported(String),
}

impl From<DocumentError> for AppError {
    fn from(err: DocumentError) -> Self {
        match err {
            DocumentError::Validation(errors) => AppError::ValidationError(errors),
            DocumentError::SectionNotFound(_) | DocumentError::LineItemNotFound(_) => {
                AppError::NotFound(anyhow::Error::new(err))
            }
            DocumentError::InvalidTransition { .. } | DocumentError::Locked(_) => {
                AppError::Conflict(anyhow::Error::new(err))
            }
            DocumentError::StatusNotApplicable { .. } | DocumentError::Unsupported(_) => {
                AppError::BadRequest(anyhow::Error::new(err))
            }
        }
    }
}

/// Errors from the persistence boundary.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Document not found: {0}")]
    NotFound(Uuid),

    /// The store understood the request and refused it; repeating it will not help.
    #[error("Document rejected by store: {0}")]
    Rejected(String),

    /// Network, timeout or server-side failure.
    #[error("Store unavailable: {0}")]
    Transient(String),
}

impl Retryable for StoreError {
    fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => AppError::NotFound(anyhow::Error::new(err)),
            StoreError::Rejected(_) => AppError::BadRequest(anyhow::Error::new(err)),
            StoreError::Transient(msg) => AppError::BadGateway(msg),
        }
    }
}

/// Errors from the local crash-recovery backup store.
#[derive(Debug, Error)]
pub enum BackupError {
    #[error("Backup I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Backup serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from PDF export.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("PDF rendering failed: {0}")]
    Pdf(String),

    #[error("Layout failed: {0}")]
    Layout(String),
}

impl From<ExportError> for AppError {
    fn from(err: ExportError) -> Self {
        AppError::InternalError(anyhow::Error::new(err))
    }
}

/// Errors from the send-to-client notification.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Notifier not configured: {0}")]
    Configuration(String),

    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error(transparent)]
    Export(#[from] ExportError),
}

/// Errors from an editing session step that has to be persisted.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Document(#[from] DocumentError),

    /// The change could not be saved and was rolled back.
    #[error("Change not saved: {0}")]
    NotSaved(#[from] crate::autosave::AutosaveError),
}
