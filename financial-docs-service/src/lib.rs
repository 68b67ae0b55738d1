//! Financial document engine: invoices and quotations with live totals,
//! debounced autosave, status lifecycle and PDF export.

pub mod autosave;
pub mod calculator;
pub mod config;
pub mod error;
pub mod export;
pub mod handlers;
pub mod lifecycle;
pub mod models;
pub mod services;
pub mod session;
pub mod startup;
