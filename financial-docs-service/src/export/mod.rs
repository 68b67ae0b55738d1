//! PDF export of invoices and quotations.

pub mod layout;
pub mod pdf;

use crate::config::CompanyConfig;
use crate::error::ExportError;
use crate::models::FinancialDocument;
use crate::services::metrics::EXPORTS_TOTAL;
pub use layout::PageLayout;
use tracing::{info, warn};

/// Letterhead printed at the top of the first page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompanyProfile {
    pub name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

impl From<&CompanyConfig> for CompanyProfile {
    fn from(config: &CompanyConfig) -> Self {
        Self {
            name: config.name.clone(),
            address: config.address.clone(),
            phone: config.phone.clone(),
            email: config.email.clone(),
        }
    }
}

/// A rendered document ready for download or attachment.
#[derive(Debug, Clone)]
pub struct ExportedDocument {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// `<DocumentKind>_<documentNumber>.pdf`, e.g. `Invoice_INV-2024-0001.pdf`.
pub fn export_filename(document: &FinancialDocument) -> String {
    let number: String = document
        .document_number()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{}_{}.pdf", document.kind().display_name(), number)
}

/// Renders documents with a fixed letterhead and page layout.
#[derive(Debug, Clone)]
pub struct PdfExporter {
    company: CompanyProfile,
    layout: PageLayout,
}

impl PdfExporter {
    pub fn new(company: CompanyProfile) -> Self {
        Self {
            company,
            layout: PageLayout::default(),
        }
    }

    pub fn with_layout(mut self, layout: PageLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Render `document`. The document itself is never modified.
    pub fn export(&self, document: &FinancialDocument) -> Result<ExportedDocument, ExportError> {
        let kind = document.kind().as_str();
        match pdf::render_pdf(document, &self.company, &self.layout) {
            Ok(bytes) => {
                EXPORTS_TOTAL.with_label_values(&[kind, "success"]).inc();
                info!(
                    document_id = %document.id(),
                    document_number = %document.document_number(),
                    size = bytes.len(),
                    "Document exported"
                );
                Ok(ExportedDocument {
                    filename: export_filename(document),
                    bytes,
                })
            }
            Err(e) => {
                EXPORTS_TOTAL.with_label_values(&[kind, "failure"]).inc();
                warn!(document_id = %document.id(), error = %e, "Document export failed");
                Err(e)
            }
        }
    }
}
