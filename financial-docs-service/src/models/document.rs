//! Financial document aggregate: an invoice or a quotation.

use super::line_item::{valid_amount, valid_rate, LineItem, LineItemUpdate, NewLineItem};
use super::money::minor_units_for;
use super::section::{NewSection, Section, SectionUpdate};
use super::status::{DocumentStatus, TransitionMode};
use crate::calculator::{finalize_totals, section_costs, DocumentTotals, PricingInputs};
use crate::error::DocumentError;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

/// Currency used when none is given.
pub const DEFAULT_CURRENCY: &str = "KES";

/// Which variant of the shared document shape this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Invoice,
    Quotation,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Invoice => "invoice",
            DocumentKind::Quotation => "quotation",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "invoice" => Some(DocumentKind::Invoice),
            "quotation" => Some(DocumentKind::Quotation),
            _ => None,
        }
    }

    /// Title-case name used on printed documents and export file names.
    pub fn display_name(&self) -> &'static str {
        match self {
            DocumentKind::Invoice => "Invoice",
            DocumentKind::Quotation => "Quotation",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn validate_dates(header: &DocumentHeader) -> Result<(), ValidationError> {
    if header.due_date < header.issue_date {
        let mut error = ValidationError::new("date_order");
        error.message = Some("due date must not be before the issue date".into());
        return Err(error);
    }
    Ok(())
}

/// Parties, dates and free text. None of these affect totals.
///
/// For quotations `issue_date` is the quote date and `due_date` the
/// valid-until date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_dates"))]
pub struct DocumentHeader {
    #[validate(length(min = 1, message = "client name is required"))]
    pub client_name: String,
    #[validate(email(message = "client email is invalid"))]
    pub client_email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terms: Option<String>,
}

/// Rate settings and payments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Pricing {
    /// Percent of material cost billed as labour (invoices).
    #[serde(default)]
    #[validate(custom(function = "valid_rate"))]
    pub labour_rate: Decimal,
    #[serde(default)]
    #[validate(custom(function = "valid_rate"))]
    pub tax_rate: Decimal,
    /// Always zero on quotations.
    #[serde(default)]
    #[validate(custom(function = "valid_amount"))]
    pub amount_paid: Decimal,
}

/// First-entry timestamps per status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusTimestamps {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accepted_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejected_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expired_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revised_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
    /// Last time a closed document was reopened for editing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reopened_at: Option<DateTime<Utc>>,
}

impl StatusTimestamps {
    /// When the document first entered `status`.
    pub fn entered_at(&self, status: DocumentStatus) -> Option<DateTime<Utc>> {
        match status {
            DocumentStatus::Draft => None,
            DocumentStatus::Sent => self.sent_at,
            DocumentStatus::Viewed => self.viewed_at,
            DocumentStatus::Paid => self.paid_at,
            DocumentStatus::Accepted => self.accepted_at,
            DocumentStatus::Rejected => self.rejected_at,
            DocumentStatus::Expired => self.expired_at,
            DocumentStatus::Revised => self.revised_at,
            DocumentStatus::Cancelled => self.cancelled_at,
        }
    }

    fn slot_mut(&mut self, status: DocumentStatus) -> Option<&mut Option<DateTime<Utc>>> {
        match status {
            DocumentStatus::Draft => None,
            DocumentStatus::Sent => Some(&mut self.sent_at),
            DocumentStatus::Viewed => Some(&mut self.viewed_at),
            DocumentStatus::Paid => Some(&mut self.paid_at),
            DocumentStatus::Accepted => Some(&mut self.accepted_at),
            DocumentStatus::Rejected => Some(&mut self.rejected_at),
            DocumentStatus::Expired => Some(&mut self.expired_at),
            DocumentStatus::Revised => Some(&mut self.revised_at),
            DocumentStatus::Cancelled => Some(&mut self.cancelled_at),
        }
    }

    /// Record the first entry into `status`. Returns false if already set.
    pub(crate) fn stamp(&mut self, status: DocumentStatus, now: DateTime<Utc>) -> bool {
        match self.slot_mut(status) {
            Some(slot) if slot.is_none() => {
                *slot = Some(now);
                true
            }
            _ => false,
        }
    }
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

fn default_status() -> DocumentStatus {
    DocumentStatus::Draft
}

/// An invoice or quotation with its sections and computed totals.
///
/// Every mutating method recomputes totals before returning, so `totals()`
/// never lags behind the sections or rates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "DocumentRecord")]
pub struct FinancialDocument {
    id: Uuid,
    kind: DocumentKind,
    document_number: String,
    #[serde(flatten)]
    header: DocumentHeader,
    currency: String,
    #[serde(flatten)]
    pricing: Pricing,
    status: DocumentStatus,
    #[serde(flatten)]
    timestamps: StatusTimestamps,
    sections: Vec<Section>,
    totals: DocumentTotals,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Wire shape of a document. Derived values (`totals`, section costs, item
/// totals) are ignored and recomputed.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DocumentRecord {
    id: Uuid,
    kind: DocumentKind,
    document_number: String,
    #[serde(flatten)]
    header: DocumentHeader,
    #[serde(default = "default_currency")]
    currency: String,
    #[serde(flatten)]
    pricing: Pricing,
    #[serde(default = "default_status")]
    status: DocumentStatus,
    #[serde(flatten)]
    timestamps: StatusTimestamps,
    #[serde(default)]
    sections: Vec<Section>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<DocumentRecord> for FinancialDocument {
    fn from(record: DocumentRecord) -> Self {
        let mut pricing = record.pricing;
        if record.kind == DocumentKind::Quotation {
            pricing.amount_paid = Decimal::ZERO;
        }

        let mut sections = record.sections;
        sections.sort_by_key(|s| s.order);

        let mut document = Self {
            id: record.id,
            kind: record.kind,
            document_number: record.document_number,
            header: record.header,
            currency: record.currency,
            pricing,
            status: record.status,
            timestamps: record.timestamps,
            sections,
            totals: DocumentTotals::default(),
            created_at: record.created_at,
            updated_at: record.updated_at,
        };
        document.recalculate();
        document
    }
}

fn single_error(field: &'static str, error: ValidationError) -> ValidationErrors {
    let mut errors = ValidationErrors::new();
    errors.add(field, error);
    errors
}

impl FinancialDocument {
    /// Create a draft document with no sections.
    pub fn new(
        kind: DocumentKind,
        document_number: String,
        header: DocumentHeader,
        pricing: Pricing,
        currency: &str,
        now: DateTime<Utc>,
    ) -> Result<Self, DocumentError> {
        pricing.validate()?;
        if kind == DocumentKind::Quotation && !pricing.amount_paid.is_zero() {
            return Err(DocumentError::Unsupported(
                "payments can only be recorded against invoices".to_string(),
            ));
        }

        let mut document = Self {
            id: Uuid::new_v4(),
            kind,
            document_number,
            header,
            currency: currency.to_ascii_uppercase(),
            pricing,
            status: DocumentStatus::Draft,
            timestamps: StatusTimestamps::default(),
            sections: Vec::new(),
            totals: DocumentTotals::default(),
            created_at: now,
            updated_at: now,
        };
        document.recalculate();
        Ok(document)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> DocumentKind {
        self.kind
    }

    pub fn document_number(&self) -> &str {
        &self.document_number
    }

    pub fn header(&self) -> &DocumentHeader {
        &self.header
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn minor_units(&self) -> u32 {
        minor_units_for(&self.currency)
    }

    pub fn pricing(&self) -> Pricing {
        self.pricing
    }

    pub fn status(&self) -> DocumentStatus {
        self.status
    }

    pub fn timestamps(&self) -> &StatusTimestamps {
        &self.timestamps
    }

    /// Sections in display order.
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn section(&self, section_id: Uuid) -> Option<&Section> {
        self.sections.iter().find(|s| s.id == section_id)
    }

    pub fn totals(&self) -> &DocumentTotals {
        &self.totals
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn pricing_inputs(&self) -> PricingInputs {
        PricingInputs {
            kind: self.kind,
            labour_rate: self.pricing.labour_rate,
            tax_rate: self.pricing.tax_rate,
            amount_paid: self.pricing.amount_paid,
        }
    }

    /// Full recompute of section costs and document totals. Idempotent.
    pub fn recalculate(&mut self) {
        let inputs = self.pricing_inputs();
        for section in &mut self.sections {
            let costs = section_costs(section.items(), &inputs);
            section.material_cost = costs.material_cost;
            section.labour_cost = costs.labour_cost;
        }
        self.totals = finalize_totals(&self.sections, &inputs, self.minor_units());
    }

    fn commit(&mut self) {
        self.recalculate();
        self.updated_at = Utc::now();
    }

    fn ensure_editable(&self) -> Result<(), DocumentError> {
        if self.status.locks_financials() {
            return Err(DocumentError::Locked(self.status));
        }
        Ok(())
    }

    fn section_mut(&mut self, section_id: Uuid) -> Result<&mut Section, DocumentError> {
        self.sections
            .iter_mut()
            .find(|s| s.id == section_id)
            .ok_or(DocumentError::SectionNotFound(section_id))
    }

    fn renumber_sections(&mut self) {
        for (index, section) in self.sections.iter_mut().enumerate() {
            section.order = index as i32 + 1;
        }
    }

    /// Change parties, dates or free text. Checked only when the document is saved.
    pub fn edit_header(&mut self, edit: impl FnOnce(&mut DocumentHeader)) {
        edit(&mut self.header);
        self.updated_at = Utc::now();
    }

    // -------------------------------------------------------------------------
    // Sections
    // -------------------------------------------------------------------------

    /// Append a section; returns its id.
    pub fn add_section(&mut self, input: NewSection) -> Result<Uuid, DocumentError> {
        self.ensure_editable()?;
        input.validate()?;

        let order = self.sections.iter().map(|s| s.order).max().unwrap_or(0) + 1;
        let section = Section::new(input, order);
        let section_id = section.id;
        self.sections.push(section);
        self.commit();
        Ok(section_id)
    }

    pub fn update_section(
        &mut self,
        section_id: Uuid,
        update: SectionUpdate,
    ) -> Result<(), DocumentError> {
        update.validate()?;
        let section = self.section_mut(section_id)?;
        if let Some(name) = update.name {
            section.name = name;
        }
        if let Some(description) = update.description {
            section.description = Some(description).filter(|d| !d.trim().is_empty());
        }
        self.commit();
        Ok(())
    }

    pub fn remove_section(&mut self, section_id: Uuid) -> Result<Section, DocumentError> {
        self.ensure_editable()?;
        let index = self
            .sections
            .iter()
            .position(|s| s.id == section_id)
            .ok_or(DocumentError::SectionNotFound(section_id))?;
        let removed = self.sections.remove(index);
        self.renumber_sections();
        self.commit();
        Ok(removed)
    }

    /// Move a section to `to_index` (clamped to the last position).
    pub fn move_section(&mut self, section_id: Uuid, to_index: usize) -> Result<(), DocumentError> {
        let from = self
            .sections
            .iter()
            .position(|s| s.id == section_id)
            .ok_or(DocumentError::SectionNotFound(section_id))?;
        let section = self.sections.remove(from);
        let to = to_index.min(self.sections.len());
        self.sections.insert(to, section);
        self.renumber_sections();
        self.commit();
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Line items
    // -------------------------------------------------------------------------

    /// Append a line item to a section; returns its id.
    pub fn add_item(&mut self, section_id: Uuid, input: NewLineItem) -> Result<Uuid, DocumentError> {
        self.ensure_editable()?;
        let item = LineItem::new(input)?;
        let item_id = item.id;
        self.section_mut(section_id)?.items.push(item);
        self.commit();
        Ok(item_id)
    }

    pub fn update_item(
        &mut self,
        section_id: Uuid,
        item_id: Uuid,
        update: LineItemUpdate,
    ) -> Result<(), DocumentError> {
        self.ensure_editable()?;
        self.section_mut(section_id)?
            .item_mut(item_id)
            .ok_or(DocumentError::LineItemNotFound(item_id))?
            .apply(update)?;
        self.commit();
        Ok(())
    }

    pub fn remove_item(&mut self, section_id: Uuid, item_id: Uuid) -> Result<LineItem, DocumentError> {
        self.ensure_editable()?;
        let section = self.section_mut(section_id)?;
        let index = section
            .items
            .iter()
            .position(|i| i.id == item_id)
            .ok_or(DocumentError::LineItemNotFound(item_id))?;
        let removed = section.items.remove(index);
        self.commit();
        Ok(removed)
    }

    /// Move a line item within its section.
    pub fn move_item(
        &mut self,
        section_id: Uuid,
        item_id: Uuid,
        to_index: usize,
    ) -> Result<(), DocumentError> {
        let section = self.section_mut(section_id)?;
        let from = section
            .items
            .iter()
            .position(|i| i.id == item_id)
            .ok_or(DocumentError::LineItemNotFound(item_id))?;
        let item = section.items.remove(from);
        let to = to_index.min(section.items.len());
        section.items.insert(to, item);
        self.commit();
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Rates and payments
    // -------------------------------------------------------------------------

    pub fn set_labour_rate(&mut self, labour_rate: Decimal) -> Result<(), DocumentError> {
        self.ensure_editable()?;
        valid_rate(&labour_rate).map_err(|e| single_error("labour_rate", e))?;
        self.pricing.labour_rate = labour_rate;
        self.commit();
        Ok(())
    }

    pub fn set_tax_rate(&mut self, tax_rate: Decimal) -> Result<(), DocumentError> {
        self.ensure_editable()?;
        valid_rate(&tax_rate).map_err(|e| single_error("tax_rate", e))?;
        self.pricing.tax_rate = tax_rate;
        self.commit();
        Ok(())
    }

    /// Overwrite the amount paid (invoices only).
    pub fn set_amount_paid(&mut self, amount_paid: Decimal) -> Result<(), DocumentError> {
        if self.kind != DocumentKind::Invoice {
            return Err(DocumentError::Unsupported(
                "payments can only be recorded against invoices".to_string(),
            ));
        }
        self.ensure_editable()?;
        valid_amount(&amount_paid).map_err(|e| single_error("amount_paid", e))?;
        self.pricing.amount_paid = amount_paid;
        self.commit();
        Ok(())
    }

    /// Add a payment to the amount paid (invoices only).
    pub fn record_payment(&mut self, amount: Decimal) -> Result<(), DocumentError> {
        if amount <= Decimal::ZERO {
            let mut error = ValidationError::new("positive");
            error.message = Some("payment must be greater than zero".into());
            return Err(single_error("amount", error).into());
        }
        valid_amount(&amount).map_err(|e| single_error("amount", e))?;
        let total = self.pricing.amount_paid.checked_add(amount).ok_or_else(|| {
            let mut error = ValidationError::new("too_large");
            error.message = Some("amount paid is out of range".into());
            DocumentError::from(single_error("amount", error))
        })?;
        self.set_amount_paid(total)
    }

    // -------------------------------------------------------------------------
    // Save checks and lifecycle
    // -------------------------------------------------------------------------

    /// Whether the document can be persisted. Failures block the save and are
    /// never sent to the store.
    pub fn validate_for_save(&self) -> Result<(), ValidationErrors> {
        let mut errors = self.content_errors();
        if self.document_number.trim().is_empty() {
            errors.add("document_number", ValidationError::new("required"));
        }
        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Every save check except the document number, for drafts that are
    /// numbered only once they are known to be complete.
    pub fn validate_contents(&self) -> Result<(), ValidationErrors> {
        let errors = self.content_errors();
        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Give an unnumbered draft its number. Numbers are never replaced.
    pub fn assign_number(&mut self, number: String) -> Result<(), DocumentError> {
        if !self.document_number.trim().is_empty() {
            return Err(DocumentError::Unsupported(format!(
                "document is already numbered {}",
                self.document_number
            )));
        }
        self.document_number = number;
        Ok(())
    }

    fn content_errors(&self) -> ValidationErrors {
        let mut errors = self.header.validate().err().unwrap_or_else(ValidationErrors::new);

        if self.sections.is_empty() {
            let mut error = ValidationError::new("empty");
            error.message = Some("at least one section is required".into());
            errors.add("sections", error);
        }

        for section in &self.sections {
            if section.name.trim().is_empty() {
                errors.add("sections", ValidationError::new("section_name_required"));
            }
            for item in section.items() {
                if let Err(error) = item.check() {
                    errors.add("items", error);
                }
            }
        }

        if let Err(pricing_errors) = self.pricing.validate() {
            for (field, field_errors) in pricing_errors.field_errors() {
                for error in field_errors {
                    errors.add(field, error.clone());
                }
            }
        }

        errors
    }

    /// Move to `to`, stamping its timestamp on first entry. Returns the
    /// previous status. A transition to the current status is a no-op.
    pub fn apply_status(
        &mut self,
        to: DocumentStatus,
        mode: TransitionMode,
        now: DateTime<Utc>,
    ) -> Result<DocumentStatus, DocumentError> {
        let from = self.status;

        if !to.applies_to(self.kind) {
            return Err(DocumentError::StatusNotApplicable {
                kind: self.kind,
                status: to,
            });
        }

        if from == to {
            return Ok(from);
        }

        match mode {
            TransitionMode::Forward if !from.can_transition(self.kind, to) => {
                return Err(DocumentError::InvalidTransition { from, to });
            }
            TransitionMode::Override if from.locks_financials() => {
                return Err(DocumentError::Locked(from));
            }
            _ => {}
        }

        self.status = to;
        self.timestamps.stamp(to, now);
        self.updated_at = now;
        Ok(from)
    }

    /// Return a closed document to `draft` so it can be edited again.
    pub fn reopen(&mut self, now: DateTime<Utc>) -> Result<DocumentStatus, DocumentError> {
        if !self.status.locks_financials() {
            return Err(DocumentError::Unsupported(format!(
                "a {} document is already editable",
                self.status
            )));
        }
        let from = self.status;
        self.status = DocumentStatus::Draft;
        self.timestamps.reopened_at = Some(now);
        self.updated_at = now;
        Ok(from)
    }

    /// Merge a client-side copy of this document into the stored one.
    ///
    /// Identity, status and timestamps stay as stored; status changes must go
    /// through transitions. Financial changes are refused while locked.
    pub fn accept_edit(&self, incoming: FinancialDocument) -> Result<FinancialDocument, DocumentError> {
        if incoming.id != self.id || incoming.kind != self.kind {
            return Err(DocumentError::Unsupported(
                "document identity cannot change".to_string(),
            ));
        }
        if incoming.status != self.status {
            return Err(DocumentError::InvalidTransition {
                from: self.status,
                to: incoming.status,
            });
        }
        if self.status.locks_financials()
            && (incoming.sections != self.sections
                || incoming.pricing != self.pricing
                || incoming.currency != self.currency)
        {
            return Err(DocumentError::Locked(self.status));
        }

        let mut merged = self.clone();
        merged.header = incoming.header;
        merged.currency = incoming.currency.to_ascii_uppercase();
        merged.pricing = incoming.pricing;
        merged.sections = incoming.sections;
        merged.renumber_sections();
        merged.commit();
        Ok(merged)
    }

    /// Whether [`convert_to_invoice`](Self::convert_to_invoice) would accept this document.
    pub fn ensure_convertible(&self) -> Result<(), DocumentError> {
        if self.kind != DocumentKind::Quotation {
            return Err(DocumentError::Unsupported(
                "only quotations can be converted to invoices".to_string(),
            ));
        }
        if self.status != DocumentStatus::Accepted {
            return Err(DocumentError::Unsupported(format!(
                "only accepted quotations can be converted (status is {})",
                self.status
            )));
        }
        Ok(())
    }

    /// Start a draft invoice from an accepted quotation.
    ///
    /// Sections and rows are copied as they are; the invoice labour rule then
    /// applies, so labour is imputed from `labour_rate`.
    pub fn convert_to_invoice(
        &self,
        document_number: String,
        labour_rate: Decimal,
        issue_date: NaiveDate,
        due_date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<FinancialDocument, DocumentError> {
        self.ensure_convertible()?;

        let header = DocumentHeader {
            issue_date,
            due_date,
            ..self.header.clone()
        };
        let pricing = Pricing {
            labour_rate,
            tax_rate: self.pricing.tax_rate,
            amount_paid: Decimal::ZERO,
        };

        let mut invoice = FinancialDocument::new(
            DocumentKind::Invoice,
            document_number,
            header,
            pricing,
            &self.currency,
            now,
        )?;
        invoice.sections = self
            .sections
            .iter()
            .map(|section| Section {
                id: Uuid::new_v4(),
                ..section.clone()
            })
            .collect();
        invoice.recalculate();
        Ok(invoice)
    }
}
