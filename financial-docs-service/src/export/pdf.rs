//! PDF rendering with printpdf.
//!
//! Draws the pages produced by [`paginate`]. Figures are printed from
//! `document.totals()` as they are; nothing is recomputed here.

use super::layout::{paginate, table_rows, totals_rows, Page, PageLayout, PageRow, MAX_TEXT_LINES};
use super::CompanyProfile;
use crate::error::ExportError;
use crate::models::money::{format_decimal, format_money};
use crate::models::{DocumentKind, FinancialDocument};
use printpdf::{
    BuiltinFont, IndirectFontRef, Line, Mm, PdfDocument, PdfDocumentReference,
    PdfLayerReference, Point,
};
use std::io::BufWriter;

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN_LEFT: f32 = 15.0;
const MARGIN_RIGHT: f32 = 195.0;
const ROW_HEIGHT: f32 = 5.5;
/// Top of the table on the first page, below the header block.
const FIRST_TABLE_TOP: f32 = 205.0;
const TABLE_TOP: f32 = 275.0;

const X_DESCRIPTION: f32 = 15.0;
const X_QUANTITY: f32 = 112.0;
const X_UNIT: f32 = 127.0;
const X_UNIT_PRICE: f32 = 145.0;
const X_TOTAL: f32 = 172.0;
const X_TOTALS_LABEL: f32 = 130.0;

const DESCRIPTION_CHARS: usize = 52;

struct Fonts {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
}

fn text(layer: &PdfLayerReference, font: &IndirectFontRef, value: &str, size: f32, x: f32, y: f32) {
    layer.use_text(value, size, Mm(x), Mm(y), font);
}

fn rule(layer: &PdfLayerReference, y: f32) {
    layer.add_line(Line {
        points: vec![
            (Point::new(Mm(MARGIN_LEFT), Mm(y)), false),
            (Point::new(Mm(MARGIN_RIGHT), Mm(y)), false),
        ],
        is_closed: false,
    });
}

fn truncate(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        value.to_string()
    } else {
        let mut short: String = value.chars().take(max_chars.saturating_sub(3)).collect();
        short.push_str("...");
        short
    }
}

/// Render `document` to PDF bytes.
pub fn render_pdf(
    document: &FinancialDocument,
    company: &CompanyProfile,
    layout: &PageLayout,
) -> Result<Vec<u8>, ExportError> {
    let pages = paginate(table_rows(document), layout, totals_rows(document))?;
    let title = format!(
        "{} {}",
        document.kind().display_name(),
        document.document_number()
    );

    let (doc, first_page, first_layer) =
        PdfDocument::new(&title, Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
    let fonts = Fonts {
        regular: doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| ExportError::Pdf(e.to_string()))?,
        bold: doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|e| ExportError::Pdf(e.to_string()))?,
    };

    let page_count = pages.len();
    for (index, page) in pages.iter().enumerate() {
        let layer = if index == 0 {
            doc.get_page(first_page).get_layer(first_layer)
        } else {
            let (page_ref, layer_ref) =
                doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), format!("Layer {}", index + 1));
            doc.get_page(page_ref).get_layer(layer_ref)
        };

        let top = if index == 0 {
            draw_header_block(&layer, &fonts, document, company);
            FIRST_TABLE_TOP
        } else {
            TABLE_TOP
        };

        let y = draw_rows(&layer, &fonts, document, page, top);
        if page.totals {
            draw_totals(&layer, &fonts, document, y);
        }

        text(
            &layer,
            &fonts.regular,
            &format!("{} - page {} of {}", title, index + 1, page_count),
            8.0,
            MARGIN_LEFT,
            10.0,
        );
    }

    save(doc)
}

fn save(doc: PdfDocumentReference) -> Result<Vec<u8>, ExportError> {
    let mut writer = BufWriter::new(Vec::<u8>::new());
    doc.save(&mut writer)
        .map_err(|e| ExportError::Pdf(e.to_string()))?;
    writer
        .into_inner()
        .map_err(|e| ExportError::Pdf(e.to_string()))
}

fn draw_header_block(
    layer: &PdfLayerReference,
    fonts: &Fonts,
    document: &FinancialDocument,
    company: &CompanyProfile,
) {
    let header = document.header();

    // Company (left)
    let mut y = 282.0;
    text(layer, &fonts.bold, &company.name, 16.0, MARGIN_LEFT, y);
    for line in [&company.address, &company.phone, &company.email]
        .into_iter()
        .flatten()
    {
        y -= 5.0;
        text(layer, &fonts.regular, line, 9.0, MARGIN_LEFT, y);
    }

    // Title (right)
    text(
        layer,
        &fonts.bold,
        &document.kind().display_name().to_uppercase(),
        22.0,
        140.0,
        282.0,
    );
    text(layer, &fonts.bold, document.document_number(), 11.0, 140.0, 274.0);
    text(
        layer,
        &fonts.regular,
        &format!("Status: {}", document.status()),
        9.0,
        140.0,
        268.0,
    );

    rule(layer, 258.0);

    // Client (left) and dates (right)
    let mut y = 250.0;
    text(layer, &fonts.bold, "Bill to:", 11.0, MARGIN_LEFT, y);
    let (issued, due) = match document.kind() {
        DocumentKind::Invoice => ("Issue date", "Due date"),
        DocumentKind::Quotation => ("Quote date", "Valid until"),
    };
    text(
        layer,
        &fonts.regular,
        &format!("{}: {}", issued, header.issue_date),
        9.0,
        130.0,
        y,
    );

    y -= 6.0;
    text(layer, &fonts.regular, &header.client_name, 10.0, MARGIN_LEFT, y);
    text(
        layer,
        &fonts.regular,
        &format!("{}: {}", due, header.due_date),
        9.0,
        130.0,
        y,
    );

    y -= 5.0;
    text(layer, &fonts.regular, &header.client_email, 9.0, MARGIN_LEFT, y);
    text(
        layer,
        &fonts.regular,
        &format!("Currency: {}", document.currency()),
        9.0,
        130.0,
        y,
    );

    for line in [&header.client_phone, &header.client_address]
        .into_iter()
        .flatten()
    {
        y -= 5.0;
        text(layer, &fonts.regular, line, 9.0, MARGIN_LEFT, y);
    }

    if let Some(project) = &header.project_name {
        text(
            layer,
            &fonts.regular,
            &format!("Project: {}", truncate(project, 40)),
            9.0,
            130.0,
            y - 5.0,
        );
    }
}

/// Draw a page's table rows; returns the y below the last row.
fn draw_rows(
    layer: &PdfLayerReference,
    fonts: &Fonts,
    document: &FinancialDocument,
    page: &Page,
    top: f32,
) -> f32 {
    let minor_units = document.minor_units();
    let mut y = top;

    for row in &page.rows {
        match row {
            PageRow::ColumnHeader => {
                text(layer, &fonts.bold, "Description", 9.0, X_DESCRIPTION, y);
                text(layer, &fonts.bold, "Qty", 9.0, X_QUANTITY, y);
                text(layer, &fonts.bold, "Unit", 9.0, X_UNIT, y);
                text(layer, &fonts.bold, "Unit price", 9.0, X_UNIT_PRICE, y);
                text(layer, &fonts.bold, "Total", 9.0, X_TOTAL, y);
                rule(layer, y - 1.8);
            }
            PageRow::Section {
                name,
                material_cost,
                labour_cost,
            } => {
                text(layer, &fonts.bold, &truncate(name, DESCRIPTION_CHARS), 9.5, X_DESCRIPTION, y);
                text(
                    layer,
                    &fonts.bold,
                    &format_money(material_cost.saturating_add(*labour_cost), minor_units),
                    9.0,
                    X_TOTAL,
                    y,
                );
            }
            PageRow::Item {
                description,
                quantity,
                unit,
                unit_price,
                total_price,
                is_material,
            } => {
                let label = if *is_material || document.kind() == DocumentKind::Invoice {
                    truncate(description, DESCRIPTION_CHARS)
                } else {
                    truncate(&format!("{} (labour)", description), DESCRIPTION_CHARS)
                };
                text(layer, &fonts.regular, &format!("  {}", label), 9.0, X_DESCRIPTION, y);
                text(layer, &fonts.regular, &format_decimal(quantity), 9.0, X_QUANTITY, y);
                text(layer, &fonts.regular, &truncate(unit, 8), 9.0, X_UNIT, y);
                text(layer, &fonts.regular, &format_money(*unit_price, minor_units), 9.0, X_UNIT_PRICE, y);
                text(layer, &fonts.regular, &format_money(*total_price, minor_units), 9.0, X_TOTAL, y);
            }
        }
        y -= ROW_HEIGHT;
    }

    y
}

fn draw_totals(layer: &PdfLayerReference, fonts: &Fonts, document: &FinancialDocument, top: f32) {
    let totals = document.totals();
    let minor_units = document.minor_units();
    let money = |amount| format!("{} {}", document.currency(), format_money(amount, minor_units));

    rule(layer, top + 2.0);
    let mut y = top - ROW_HEIGHT;

    let tax_label = format!("Tax ({}%)", format_decimal(&totals.tax_rate));
    let mut figures = vec![
        ("Materials", money(totals.total_material_cost), false),
        ("Labour", money(totals.total_labour_cost), false),
        ("Subtotal", money(totals.subtotal), false),
        (tax_label.as_str(), money(totals.tax_amount), false),
        ("Total", money(totals.total_amount), true),
    ];
    if let (Some(paid), Some(balance)) = (totals.amount_paid, totals.balance_due) {
        figures.push(("Amount paid", money(paid), false));
        figures.push(("Balance due", money(balance), true));
    }

    for (label, value, emphasised) in figures {
        let font = if emphasised { &fonts.bold } else { &fonts.regular };
        text(layer, font, label, 9.5, X_TOTALS_LABEL, y);
        text(layer, font, &value, 9.5, X_TOTAL - 10.0, y);
        y -= ROW_HEIGHT;
    }

    let header = document.header();
    for (heading, body) in [("Notes", &header.notes), ("Terms", &header.terms)] {
        if let Some(body) = body {
            text(layer, &fonts.bold, heading, 9.0, MARGIN_LEFT, y);
            y -= ROW_HEIGHT;
            for line in body.lines().take(MAX_TEXT_LINES) {
                text(layer, &fonts.regular, &truncate(line, 100), 8.5, MARGIN_LEFT, y);
                y -= ROW_HEIGHT;
            }
        }
    }
}
