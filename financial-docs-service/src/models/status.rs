//! Document status and the transition graph.

use super::document::DocumentKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Document workflow status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Draft,
    Sent,
    Viewed,
    Paid,
    Accepted,
    Rejected,
    Expired,
    Revised,
    Cancelled,
}

/// How strictly a transition is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionMode {
    /// Only edges of the default graph.
    #[default]
    Forward,
    /// Any status that applies to the document kind, e.g. `draft -> paid`.
    Override,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Draft => "draft",
            DocumentStatus::Sent => "sent",
            DocumentStatus::Viewed => "viewed",
            DocumentStatus::Paid => "paid",
            DocumentStatus::Accepted => "accepted",
            DocumentStatus::Rejected => "rejected",
            DocumentStatus::Expired => "expired",
            DocumentStatus::Revised => "revised",
            DocumentStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(DocumentStatus::Draft),
            "sent" => Some(DocumentStatus::Sent),
            "viewed" => Some(DocumentStatus::Viewed),
            "paid" => Some(DocumentStatus::Paid),
            "accepted" => Some(DocumentStatus::Accepted),
            "rejected" => Some(DocumentStatus::Rejected),
            "expired" => Some(DocumentStatus::Expired),
            "revised" => Some(DocumentStatus::Revised),
            "cancelled" => Some(DocumentStatus::Cancelled),
            _ => None,
        }
    }

    /// Whether the status exists for this kind of document.
    pub fn applies_to(&self, kind: DocumentKind) -> bool {
        match self {
            DocumentStatus::Paid | DocumentStatus::Cancelled => kind == DocumentKind::Invoice,
            DocumentStatus::Accepted | DocumentStatus::Revised => kind == DocumentKind::Quotation,
            _ => true,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DocumentStatus::Paid
                | DocumentStatus::Rejected
                | DocumentStatus::Expired
                | DocumentStatus::Cancelled
        )
    }

    /// Financial fields are frozen in terminal statuses and on accepted quotations.
    pub fn locks_financials(&self) -> bool {
        self.is_terminal() || *self == DocumentStatus::Accepted
    }

    /// Edges of the default graph leaving this status.
    pub fn successors(&self, kind: DocumentKind) -> Vec<DocumentStatus> {
        use DocumentStatus::*;

        let mut next = match (kind, self) {
            (_, Draft) => vec![Sent],
            (DocumentKind::Invoice, Sent) => vec![Viewed],
            (DocumentKind::Quotation, Sent) => vec![Viewed, Revised],
            (DocumentKind::Invoice, Viewed) => vec![Paid, Rejected, Expired],
            (DocumentKind::Quotation, Viewed) => vec![Accepted, Rejected, Expired, Revised],
            (DocumentKind::Quotation, Revised) => vec![Sent],
            _ => Vec::new(),
        };

        if kind == DocumentKind::Invoice && !self.locks_financials() {
            next.push(Cancelled);
        }

        next
    }

    pub fn can_transition(&self, kind: DocumentKind, to: DocumentStatus) -> bool {
        self.successors(kind).contains(&to)
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
