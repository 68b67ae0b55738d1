//! Editing, locking and conversion of documents.

mod common;

use chrono::Utc;
use common::{cement_invoice, date, dec, draft, mixed_quotation, pricing, test_header};
use financial_docs_service::error::DocumentError;
use financial_docs_service::models::{
    DocumentKind, DocumentStatus, FinancialDocument, NewLineItem, NewSection, Pricing,
    SectionUpdate, TransitionMode,
};
use rust_decimal::Decimal;

fn walk(doc: &mut FinancialDocument, path: &[DocumentStatus]) {
    for status in path {
        doc.apply_status(*status, TransitionMode::Forward, Utc::now())
            .unwrap_or_else(|e| panic!("transition to {} failed: {}", status, e));
    }
}

fn accepted_quotation() -> FinancialDocument {
    let mut doc = mixed_quotation();
    walk(
        &mut doc,
        &[
            DocumentStatus::Sent,
            DocumentStatus::Viewed,
            DocumentStatus::Accepted,
        ],
    );
    doc
}

#[test]
fn new_document_starts_as_draft() {
    let doc = draft(DocumentKind::Invoice);
    assert_eq!(doc.status(), DocumentStatus::Draft);
    assert_eq!(doc.currency(), "KES");
    assert_eq!(doc.minor_units(), 2);
    assert!(doc.sections().is_empty());
    assert_eq!(doc.timestamps().sent_at, None);
}

#[test]
fn quotation_cannot_carry_payments() {
    let result = FinancialDocument::new(
        DocumentKind::Quotation,
        "QT-2024-0009".to_string(),
        test_header(),
        Pricing {
            amount_paid: dec("10"),
            ..pricing("0", "16")
        },
        "KES",
        Utc::now(),
    );
    assert!(matches!(result, Err(DocumentError::Unsupported(_))));

    let mut quote = mixed_quotation();
    assert!(matches!(
        quote.record_payment(dec("100")),
        Err(DocumentError::Unsupported(_))
    ));
}

#[test]
fn negative_rates_are_rejected() {
    let mut doc = cement_invoice();
    assert!(matches!(
        doc.set_tax_rate(dec("-1")),
        Err(DocumentError::Validation(_))
    ));
    assert_eq!(doc.pricing().tax_rate, dec("16"));
}

#[test]
fn payment_must_be_positive() {
    let mut doc = cement_invoice();
    assert!(matches!(
        doc.record_payment(Decimal::ZERO),
        Err(DocumentError::Validation(_))
    ));
    doc.record_payment(dec("100000")).unwrap();
    doc.record_payment(dec("46560")).unwrap();
    assert_eq!(doc.pricing().amount_paid, dec("146560"));
    assert_eq!(doc.totals().balance_due, Some(dec("800000")));
}

#[test]
fn sections_keep_display_order() {
    let mut doc = draft(DocumentKind::Invoice);
    let a = doc.add_section(NewSection::named("Site clearing")).unwrap();
    let b = doc.add_section(NewSection::named("Foundation")).unwrap();
    let c = doc.add_section(NewSection::named("Walling")).unwrap();

    doc.move_section(c, 0).unwrap();
    let names: Vec<_> = doc.sections().iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, ["Walling", "Site clearing", "Foundation"]);
    let orders: Vec<_> = doc.sections().iter().map(|s| s.order).collect();
    assert_eq!(orders, [1, 2, 3]);

    doc.remove_section(a).unwrap();
    let orders: Vec<_> = doc.sections().iter().map(|s| s.order).collect();
    assert_eq!(orders, [1, 2]);

    doc.update_section(
        b,
        SectionUpdate {
            name: Some("Foundations".to_string()),
            description: Some("Strip footings".to_string()),
        },
    )
    .unwrap();
    let section = doc.section(b).unwrap();
    assert_eq!(section.name, "Foundations");
    assert_eq!(section.description.as_deref(), Some("Strip footings"));
}

#[test]
fn items_move_within_a_section() {
    let mut doc = mixed_quotation();
    let section_id = doc.sections()[0].id;
    let material_id = doc.sections()[0].items()[1].id;

    doc.move_item(section_id, material_id, 0).unwrap();
    assert_eq!(doc.sections()[0].items()[0].description, "Iron sheets");
    assert_eq!(doc.totals().subtotal, dec("7000"));
}

#[test]
fn unknown_ids_are_reported() {
    let mut doc = cement_invoice();
    let missing = uuid::Uuid::new_v4();
    assert!(matches!(
        doc.add_item(missing, NewLineItem::material("Sand", dec("1"), "t", dec("1"))),
        Err(DocumentError::SectionNotFound(id)) if id == missing
    ));
    let section_id = doc.sections()[0].id;
    assert!(matches!(
        doc.remove_item(section_id, missing),
        Err(DocumentError::LineItemNotFound(_))
    ));
}

#[test]
fn locked_document_refuses_financial_edits_until_reopened() {
    let mut doc = cement_invoice();
    walk(
        &mut doc,
        &[DocumentStatus::Sent, DocumentStatus::Viewed, DocumentStatus::Paid],
    );
    let section_id = doc.sections()[0].id;

    let result = doc.add_item(
        section_id,
        NewLineItem::material("Sand", dec("1"), "t", dec("3000")),
    );
    assert!(matches!(result, Err(DocumentError::Locked(DocumentStatus::Paid))));
    assert!(matches!(
        doc.set_labour_rate(dec("40")),
        Err(DocumentError::Locked(_))
    ));
    assert_eq!(doc.totals().total_material_cost, dec("600000"));

    // Free text stays editable.
    doc.edit_header(|h| h.notes = Some("Thanks for your business".to_string()));
    assert_eq!(doc.header().notes.as_deref(), Some("Thanks for your business"));

    let now = Utc::now();
    assert_eq!(doc.reopen(now).unwrap(), DocumentStatus::Paid);
    assert_eq!(doc.status(), DocumentStatus::Draft);
    assert_eq!(doc.timestamps().reopened_at, Some(now));
    assert!(doc.timestamps().paid_at.is_some());

    doc.add_item(
        section_id,
        NewLineItem::material("Sand", dec("1"), "t", dec("3000")),
    )
    .unwrap();
    assert_eq!(doc.totals().total_material_cost, dec("603000"));
}

#[test]
fn reopen_requires_a_locked_status() {
    let mut doc = cement_invoice();
    assert!(matches!(
        doc.reopen(Utc::now()),
        Err(DocumentError::Unsupported(_))
    ));
}

#[test]
fn accepted_quotation_is_locked() {
    let mut quote = accepted_quotation();
    assert!(matches!(
        quote.set_tax_rate(dec("8")),
        Err(DocumentError::Locked(DocumentStatus::Accepted))
    ));
}

#[test]
fn validate_for_save_reports_missing_fields() {
    let mut doc = draft(DocumentKind::Invoice);
    doc.edit_header(|h| {
        h.client_name.clear();
        h.client_email = "not-an-email".to_string();
        h.due_date = date(2024, 2, 1);
    });

    let errors = doc.validate_for_save().unwrap_err();
    let fields = errors.errors();
    assert!(fields.contains_key("client_name"));
    assert!(fields.contains_key("client_email"));
    assert!(fields.contains_key("sections"));
    assert!(fields.contains_key("__all__"));

    assert!(cement_invoice().validate_for_save().is_ok());
}

#[test]
fn accept_edit_merges_content_and_keeps_identity() {
    let stored = cement_invoice();
    let mut incoming = stored.clone();
    let section_id = incoming.sections()[0].id;
    incoming
        .add_item(
            section_id,
            NewLineItem::material("Ballast", dec("2"), "t", dec("5000")),
        )
        .unwrap();
    incoming.edit_header(|h| h.project_name = Some("Phase 2".to_string()));

    let merged = stored.accept_edit(incoming).unwrap();
    assert_eq!(merged.id(), stored.id());
    assert_eq!(merged.document_number(), stored.document_number());
    assert_eq!(merged.created_at(), stored.created_at());
    assert_eq!(merged.header().project_name.as_deref(), Some("Phase 2"));
    assert_eq!(merged.totals().total_material_cost, dec("610000"));
}

#[test]
fn accept_edit_refuses_status_changes_and_locked_edits() {
    let stored = cement_invoice();
    let mut incoming = stored.clone();
    walk(&mut incoming, &[DocumentStatus::Sent]);
    assert!(matches!(
        stored.accept_edit(incoming),
        Err(DocumentError::InvalidTransition { .. })
    ));

    let quote = accepted_quotation();
    let mut incoming = quote.clone();
    let section_id = incoming.sections()[0].id;
    incoming.reopen(Utc::now()).unwrap();
    incoming
        .add_item(
            section_id,
            NewLineItem::material("Nails", dec("1"), "kg", dec("300")),
        )
        .unwrap();
    walk(
        &mut incoming,
        &[
            DocumentStatus::Sent,
            DocumentStatus::Viewed,
            DocumentStatus::Accepted,
        ],
    );
    assert!(matches!(
        quote.accept_edit(incoming),
        Err(DocumentError::Locked(DocumentStatus::Accepted))
    ));
}

#[test]
fn accepted_quotation_converts_to_draft_invoice() {
    let quote = accepted_quotation();
    let invoice = quote
        .convert_to_invoice(
            "INV-2024-0042".to_string(),
            dec("36"),
            date(2024, 4, 1),
            date(2024, 5, 1),
            Utc::now(),
        )
        .unwrap();

    assert_eq!(invoice.kind(), DocumentKind::Invoice);
    assert_eq!(invoice.status(), DocumentStatus::Draft);
    assert_ne!(invoice.id(), quote.id());
    assert_eq!(invoice.document_number(), "INV-2024-0042");
    assert_eq!(invoice.header().client_name, quote.header().client_name);
    assert_eq!(invoice.header().issue_date, date(2024, 4, 1));
    assert_eq!(invoice.sections().len(), quote.sections().len());
    assert_ne!(invoice.sections()[0].id, quote.sections()[0].id);
    assert_eq!(invoice.sections()[0].items(), quote.sections()[0].items());

    // Invoice rule: 36% of the 2,000 material.
    assert_eq!(invoice.totals().total_material_cost, dec("2000"));
    assert_eq!(invoice.totals().total_labour_cost, dec("720"));
    assert_eq!(invoice.totals().amount_paid, Some(Decimal::ZERO));

    // The quotation is untouched.
    assert_eq!(quote.status(), DocumentStatus::Accepted);
    assert_eq!(quote.totals().total_labour_cost, dec("5000"));
}

#[test]
fn only_accepted_quotations_convert() {
    let quote = mixed_quotation();
    let result = quote.convert_to_invoice(
        "INV-2024-0043".to_string(),
        dec("36"),
        date(2024, 4, 1),
        date(2024, 5, 1),
        Utc::now(),
    );
    assert!(matches!(result, Err(DocumentError::Unsupported(_))));

    let invoice = cement_invoice();
    let result = invoice.convert_to_invoice(
        "INV-2024-0044".to_string(),
        dec("36"),
        date(2024, 4, 1),
        date(2024, 5, 1),
        Utc::now(),
    );
    assert!(matches!(result, Err(DocumentError::Unsupported(_))));
}

#[test]
fn oversized_line_items_leave_the_document_untouched() {
    let mut doc = cement_invoice();
    let section_id = doc.sections()[0].id;
    let before = doc.clone();

    let result = doc.add_item(
        section_id,
        NewLineItem::material("Steel", dec("100000000000000000"), "t", dec("100000000000000000")),
    );

    assert!(matches!(result, Err(DocumentError::Validation(_))));
    assert_eq!(doc, before);
}

#[test]
fn oversized_payment_is_rejected() {
    let mut doc = cement_invoice();
    let before = doc.clone();

    let result = doc.record_payment(dec("100000000000000000"));

    assert!(matches!(result, Err(DocumentError::Validation(_))));
    assert_eq!(doc, before);
}
