//! Collaborators of the document engine.

pub mod metrics;
pub mod notifier;
pub mod numbering;
pub mod store;

pub use metrics::{get_metrics, init_metrics};
pub use notifier::{DocumentNotifier, LogNotifier, MockNotifier, SmtpNotifier};
pub use numbering::{format_document_number, DocumentNumberer, SequentialNumberer};
pub use store::{DocumentStore, HttpDocumentStore, InMemoryDocumentStore};
