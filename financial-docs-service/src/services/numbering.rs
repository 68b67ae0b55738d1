//! Document number generation: `<PREFIX>-<year>-<sequence>`.

use crate::config::NumberingConfig;
use crate::models::DocumentKind;
use async_trait::async_trait;
use dashmap::DashMap;

/// Format a document number, e.g. `INV-2024-0001`.
pub fn format_document_number(prefix: &str, year: i32, sequence: u32) -> String {
    format!("{}-{}-{:04}", prefix, year, sequence)
}

#[async_trait]
pub trait DocumentNumberer: Send + Sync {
    /// Next unused number for `kind` in `year`.
    async fn next_number(&self, kind: DocumentKind, year: i32) -> String;
}

/// Per-kind, per-year counters held in memory.
///
/// Sequences start at 1 unless `continue_from` in the config resumes them.
pub struct SequentialNumberer {
    config: NumberingConfig,
    counters: DashMap<(DocumentKind, i32), u32>,
}

impl SequentialNumberer {
    pub fn new(config: NumberingConfig) -> Self {
        let numberer = Self {
            counters: DashMap::new(),
            config,
        };
        for seed in &numberer.config.continue_from {
            numberer.seed(seed.kind, seed.year, seed.last_sequence);
            tracing::info!(
                kind = seed.kind.as_str(),
                year = seed.year,
                last_sequence = seed.last_sequence,
                "Document numbering resumed"
            );
        }
        numberer
    }

    fn seed(&self, kind: DocumentKind, year: i32, last_sequence: u32) {
        let mut entry = self.counters.entry((kind, year)).or_insert(0);
        if *entry < last_sequence {
            *entry = last_sequence;
        }
    }

    fn prefix(&self, kind: DocumentKind) -> &str {
        match kind {
            DocumentKind::Invoice => &self.config.invoice_prefix,
            DocumentKind::Quotation => &self.config.quotation_prefix,
        }
    }
}

#[async_trait]
impl DocumentNumberer for SequentialNumberer {
    async fn next_number(&self, kind: DocumentKind, year: i32) -> String {
        let sequence = {
            let mut entry = self.counters.entry((kind, year)).or_insert(0);
            *entry += 1;
            *entry
        };
        format_document_number(self.prefix(kind), year, sequence)
    }
}
