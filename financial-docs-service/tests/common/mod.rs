//! Shared fixtures for financial-docs-service integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use financial_docs_service::error::StoreError;
use financial_docs_service::models::{
    DocumentHeader, DocumentKind, FinancialDocument, NewLineItem, NewSection, Pricing,
};
use financial_docs_service::services::{DocumentStore, InMemoryDocumentStore};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use uuid::Uuid;

pub fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).expect("valid decimal literal")
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

pub fn test_header() -> DocumentHeader {
    DocumentHeader {
        client_name: "Acme Builders".to_string(),
        client_email: "accounts@acme.example".to_string(),
        client_phone: Some("+254 700 000000".to_string()),
        client_address: Some("Mombasa Road, Nairobi".to_string()),
        project_name: Some("Warehouse extension".to_string()),
        issue_date: date(2024, 3, 1),
        due_date: date(2024, 3, 31),
        notes: None,
        terms: None,
    }
}

pub fn pricing(labour_rate: &str, tax_rate: &str) -> Pricing {
    Pricing {
        labour_rate: dec(labour_rate),
        tax_rate: dec(tax_rate),
        amount_paid: Decimal::ZERO,
    }
}

/// Empty draft with labour 36% and tax 16%.
pub fn draft(kind: DocumentKind) -> FinancialDocument {
    let number = match kind {
        DocumentKind::Invoice => "INV-2024-0001",
        DocumentKind::Quotation => "QT-2024-0001",
    };
    let now = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
    FinancialDocument::new(
        kind,
        number.to_string(),
        test_header(),
        pricing("36", "16"),
        "KES",
        now,
    )
    .expect("draft document")
}

/// Invoice with one section holding 50 bags of cement at 12,000.
pub fn cement_invoice() -> FinancialDocument {
    let mut doc = draft(DocumentKind::Invoice);
    let section = doc
        .add_section(NewSection::named("Foundation Work"))
        .expect("add section");
    doc.add_item(
        section,
        NewLineItem::material("Cement", dec("50"), "bags", dec("12000")),
    )
    .expect("add item");
    doc
}

/// Quotation with a labour row and a material row.
pub fn mixed_quotation() -> FinancialDocument {
    let mut doc = draft(DocumentKind::Quotation);
    let section = doc
        .add_section(NewSection::named("Roofing"))
        .expect("add section");
    doc.add_item(
        section,
        NewLineItem::labour("Fundi", dec("10"), "days", dec("500")),
    )
    .expect("add labour");
    doc.add_item(
        section,
        NewLineItem::material("Iron sheets", dec("2"), "pcs", dec("1000")),
    )
    .expect("add material");
    doc
}

/// In-memory store whose saves can be switched to fail as unavailable.
#[derive(Default)]
pub struct FlakyStore {
    inner: InMemoryDocumentStore,
    failing: AtomicBool,
    refused: AtomicU32,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_saves(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Saves refused while failing.
    pub fn refused(&self) -> u32 {
        self.refused.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentStore for FlakyStore {
    async fn save(&self, document: &FinancialDocument) -> Result<FinancialDocument, StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            self.refused.fetch_add(1, Ordering::SeqCst);
            return Err(StoreError::Transient("store offline".to_string()));
        }
        self.inner.save(document).await
    }

    async fn fetch(&self, id: Uuid) -> Result<FinancialDocument, StoreError> {
        self.inner.fetch(id).await
    }
}
