//! Status lifecycle: applies transitions and fires the "sent" notification.

use crate::error::DocumentError;
use crate::models::{DocumentStatus, FinancialDocument, TransitionMode};
use crate::services::metrics::{NOTIFICATIONS_TOTAL, TRANSITIONS_TOTAL};
use crate::services::DocumentNotifier;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// What happened to the client notification during a transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "error", rename_all = "snake_case")]
pub enum NotificationOutcome {
    /// The transition did not enter `sent`.
    NotRequired,
    Delivered,
    /// Delivery failed; the transition still stands.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionOutcome {
    pub from: DocumentStatus,
    pub to: DocumentStatus,
    pub notification: NotificationOutcome,
}

/// A status change applied to a document but not yet announced.
///
/// The client is told about a `sent` transition only through
/// [`StatusLifecycle::announce`], once the changed document is stored.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppliedTransition {
    pub from: DocumentStatus,
    pub to: DocumentStatus,
}

impl AppliedTransition {
    pub fn changed(&self) -> bool {
        self.from != self.to
    }

    pub fn notifies_client(&self) -> bool {
        self.changed() && self.to == DocumentStatus::Sent
    }
}

pub struct StatusLifecycle {
    notifier: Arc<dyn DocumentNotifier>,
}

impl StatusLifecycle {
    pub fn new(notifier: Arc<dyn DocumentNotifier>) -> Self {
        Self { notifier }
    }

    /// Move `document` to `to` as of `now`, stamping first-entry timestamps.
    ///
    /// Staying in the same status is a no-op. Nothing is sent to the client
    /// here; persist the document, then pass the result to [`Self::announce`].
    #[instrument(
        skip(self, document),
        fields(document_id = %document.id(), from = document.status().as_str(), to = to.as_str())
    )]
    pub fn apply(
        &self,
        document: &mut FinancialDocument,
        to: DocumentStatus,
        mode: TransitionMode,
        now: DateTime<Utc>,
    ) -> Result<AppliedTransition, DocumentError> {
        let from = document.apply_status(to, mode, now)?;
        let applied = AppliedTransition { from, to };

        if applied.changed() {
            TRANSITIONS_TOTAL
                .with_label_values(&[document.kind().as_str(), to.as_str()])
                .inc();
            info!(
                document_number = %document.document_number(),
                override_mode = mode == TransitionMode::Override,
                "Status changed"
            );
        }

        Ok(applied)
    }

    /// Run the side effects of a stored transition. Entering `sent` notifies
    /// the client; a failed delivery is reported, the transition stands.
    pub async fn announce(
        &self,
        document: &FinancialDocument,
        applied: AppliedTransition,
    ) -> TransitionOutcome {
        let notification = if applied.notifies_client() {
            self.notify(document).await
        } else {
            NotificationOutcome::NotRequired
        };

        TransitionOutcome {
            from: applied.from,
            to: applied.to,
            notification,
        }
    }

    /// Return a closed document to `draft`.
    pub fn reopen(
        &self,
        document: &mut FinancialDocument,
        now: DateTime<Utc>,
    ) -> Result<DocumentStatus, DocumentError> {
        let from = document.reopen(now)?;
        TRANSITIONS_TOTAL
            .with_label_values(&[document.kind().as_str(), DocumentStatus::Draft.as_str()])
            .inc();
        info!(
            document_id = %document.id(),
            from = from.as_str(),
            "Document reopened"
        );
        Ok(from)
    }

    async fn notify(&self, document: &FinancialDocument) -> NotificationOutcome {
        match self.notifier.document_sent(document).await {
            Ok(()) => {
                NOTIFICATIONS_TOTAL.with_label_values(&["delivered"]).inc();
                NotificationOutcome::Delivered
            }
            Err(e) => {
                NOTIFICATIONS_TOTAL.with_label_values(&["failed"]).inc();
                warn!(
                    document_id = %document.id(),
                    error = %e,
                    "Client notification failed"
                );
                NotificationOutcome::Failed(e.to_string())
            }
        }
    }
}
