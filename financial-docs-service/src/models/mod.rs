//! Domain models for financial-docs-service.

mod document;
mod line_item;
pub mod money;
mod section;
mod status;

pub use document::{
    DocumentHeader, DocumentKind, FinancialDocument, Pricing, StatusTimestamps, DEFAULT_CURRENCY,
};
pub use line_item::{LineItem, LineItemUpdate, NewLineItem};
pub use section::{NewSection, Section, SectionUpdate};
pub use status::{DocumentStatus, TransitionMode};
