use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::error::DocumentError;
use crate::lifecycle::TransitionOutcome;
use crate::models::{
    DocumentHeader, DocumentKind, DocumentStatus, FinancialDocument, NewLineItem, NewSection,
    Pricing, TransitionMode,
};
use crate::startup::AppState;
use service_core::error::AppError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSectionRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub items: Vec<NewLineItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDocumentRequest {
    pub kind: DocumentKind,
    #[serde(flatten)]
    pub header: DocumentHeader,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub labour_rate: Option<Decimal>,
    #[serde(default)]
    pub tax_rate: Option<Decimal>,
    #[serde(default)]
    pub sections: Vec<NewSectionRequest>,
}

#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub status: DocumentStatus,
    /// Allow jumps outside the default graph.
    #[serde(default, rename = "override")]
    pub override_mode: bool,
}

#[derive(Debug, Serialize)]
pub struct TransitionResponse {
    pub document: FinancialDocument,
    pub transition: TransitionOutcome,
}

#[derive(Debug, Deserialize)]
pub struct PaymentRequest {
    pub amount: Decimal,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertRequest {
    #[serde(default)]
    pub issue_date: Option<NaiveDate>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub labour_rate: Option<Decimal>,
}

/// Store `document` if it is complete. Every write goes through here.
async fn persist(
    state: &AppState,
    document: &FinancialDocument,
) -> Result<FinancialDocument, AppError> {
    document
        .validate_for_save()
        .map_err(DocumentError::Validation)?;
    Ok(state.store.save(document).await?)
}

/// Create a draft invoice or quotation with a fresh number.
#[tracing::instrument(skip(state, request), fields(kind = request.kind.as_str()))]
pub async fn create_document(
    State(state): State<AppState>,
    Json(request): Json<CreateDocumentRequest>,
) -> Result<(StatusCode, Json<FinancialDocument>), AppError> {
    request.header.validate()?;

    let defaults = &state.config.pricing;
    let pricing = Pricing {
        labour_rate: request.labour_rate.unwrap_or(defaults.labour_rate),
        tax_rate: request.tax_rate.unwrap_or(defaults.tax_rate),
        amount_paid: Decimal::ZERO,
    };
    pricing.validate()?;
    let currency = request
        .currency
        .unwrap_or_else(|| state.config.currency.code.clone());

    let mut document = FinancialDocument::new(
        request.kind,
        String::new(),
        request.header,
        pricing,
        &currency,
        Utc::now(),
    )?;

    for section in request.sections {
        let section_id = document.add_section(NewSection {
            name: section.name,
            description: section.description,
        })?;
        for item in section.items {
            document.add_item(section_id, item)?;
        }
    }

    // Incomplete requests never use up a number.
    document
        .validate_contents()
        .map_err(DocumentError::Validation)?;
    let number = state
        .numberer
        .next_number(document.kind(), document.header().issue_date.year())
        .await;
    document.assign_number(number)?;

    let saved = persist(&state, &document).await?;

    tracing::info!(
        document_id = %saved.id(),
        document_number = %saved.document_number(),
        "Document created"
    );

    Ok((StatusCode::CREATED, Json(saved)))
}

pub async fn get_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<FinancialDocument>, AppError> {
    let document = state.store.fetch(id).await?;
    Ok(Json(document))
}

/// Save an edited document. Totals are recomputed here, whatever the client sent.
#[tracing::instrument(skip(state, incoming), fields(document_id = %id))]
pub async fn save_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(incoming): Json<FinancialDocument>,
) -> Result<Json<FinancialDocument>, AppError> {
    if incoming.id() != id {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Document id in body does not match the path"
        )));
    }

    let stored = state.store.fetch(id).await?;
    let merged = stored.accept_edit(incoming)?;
    let saved = persist(&state, &merged).await?;
    Ok(Json(saved))
}

/// Totals for a posted document without storing it.
pub async fn calculate(Json(document): Json<FinancialDocument>) -> Json<FinancialDocument> {
    // Deserializing already recomputed every derived figure.
    Json(document)
}

#[tracing::instrument(skip(state, request), fields(document_id = %id, to = request.status.as_str()))]
pub async fn transition_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<TransitionRequest>,
) -> Result<Json<TransitionResponse>, AppError> {
    let mut document = state.store.fetch(id).await?;
    let mode = if request.override_mode {
        TransitionMode::Override
    } else {
        TransitionMode::Forward
    };

    let applied = state
        .lifecycle
        .apply(&mut document, request.status, mode, Utc::now())?;
    if applied.changed() {
        document = persist(&state, &document).await?;
    }
    let transition = state.lifecycle.announce(&document, applied).await;

    Ok(Json(TransitionResponse {
        document,
        transition,
    }))
}

pub async fn reopen_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<FinancialDocument>, AppError> {
    let mut document = state.store.fetch(id).await?;
    state.lifecycle.reopen(&mut document, Utc::now())?;
    let saved = persist(&state, &document).await?;
    Ok(Json(saved))
}

#[tracing::instrument(skip(state, request), fields(document_id = %id))]
pub async fn record_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<PaymentRequest>,
) -> Result<Json<FinancialDocument>, AppError> {
    let mut document = state.store.fetch(id).await?;
    document.record_payment(request.amount)?;
    let saved = persist(&state, &document).await?;

    tracing::info!(
        amount = %request.amount,
        balance_due = ?saved.totals().balance_due,
        "Payment recorded"
    );

    Ok(Json(saved))
}

/// Turn an accepted quotation into a new draft invoice.
#[tracing::instrument(skip(state, request), fields(quotation_id = %id))]
pub async fn convert_to_invoice(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    request: Option<Json<ConvertRequest>>,
) -> Result<(StatusCode, Json<FinancialDocument>), AppError> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    let quotation = state.store.fetch(id).await?;
    quotation.ensure_convertible()?;

    let today = Utc::now().date_naive();
    let issue_date = request.issue_date.unwrap_or(today);
    let due_date = request
        .due_date
        .unwrap_or(issue_date + chrono::Duration::days(30));
    let labour_rate = request
        .labour_rate
        .unwrap_or(state.config.pricing.labour_rate);

    let number = state
        .numberer
        .next_number(DocumentKind::Invoice, issue_date.year())
        .await;
    let invoice =
        quotation.convert_to_invoice(number, labour_rate, issue_date, due_date, Utc::now())?;
    let saved = persist(&state, &invoice).await?;

    tracing::info!(
        invoice_id = %saved.id(),
        invoice_number = %saved.document_number(),
        "Quotation converted"
    );

    Ok((StatusCode::CREATED, Json(saved)))
}

pub async fn download_pdf(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let document = state.store.fetch(id).await?;
    let exported = state.exporter.export(&document)?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", exported.filename),
            ),
        ],
        exported.bytes,
    ))
}
