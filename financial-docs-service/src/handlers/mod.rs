//! HTTP handlers for financial-docs-service.

pub mod documents;
pub mod health;

pub use health::{health_check, metrics_endpoint};
