//! Document totals calculator.
//!
//! Pure functions of a document's sections and pricing settings. Every edit
//! runs a full recompute; there is no incremental update path. Sums saturate
//! at the decimal range rather than overflow.

use crate::models::money::{percent_of, round_minor};
use crate::models::{DocumentKind, LineItem, Section};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Rates and payments that feed the calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricingInputs {
    pub kind: DocumentKind,
    /// Percent of material cost imputed as labour (invoices only).
    pub labour_rate: Decimal,
    /// Percent applied to the subtotal.
    pub tax_rate: Decimal,
    /// Payments received (invoices only).
    pub amount_paid: Decimal,
}

/// Cost split for one section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SectionCosts {
    pub material_cost: Decimal,
    pub labour_cost: Decimal,
}

/// Computed totals of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentTotals {
    pub total_material_cost: Decimal,
    pub total_labour_cost: Decimal,
    pub subtotal: Decimal,
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_paid: Option<Decimal>,
    /// Negative when the client overpaid; never clamped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance_due: Option<Decimal>,
}

impl DocumentKind {
    /// Labour cost of one section under this kind's rule.
    ///
    /// Invoices impute labour as a percentage of material cost; quotations sum
    /// the rows explicitly marked as labour.
    pub fn labour_cost(self, items: &[LineItem], material_cost: Decimal, labour_rate: Decimal) -> Decimal {
        match self {
            DocumentKind::Invoice => percent_of(material_cost, labour_rate),
            DocumentKind::Quotation => sum(
                items
                    .iter()
                    .filter(|item| !item.is_material)
                    .map(|item| item.total_price()),
            ),
        }
    }
}

fn sum(amounts: impl Iterator<Item = Decimal>) -> Decimal {
    amounts.fold(Decimal::ZERO, Decimal::saturating_add)
}

/// Material and labour cost of one section.
pub fn section_costs(items: &[LineItem], inputs: &PricingInputs) -> SectionCosts {
    let material_cost = sum(
        items
            .iter()
            .filter(|item| item.is_material)
            .map(|item| item.total_price()),
    );
    let labour_cost = inputs
        .kind
        .labour_cost(items, material_cost, inputs.labour_rate);

    SectionCosts {
        material_cost,
        labour_cost,
    }
}

/// Exact (unrounded) totals.
pub fn calculate_totals(sections: &[Section], inputs: &PricingInputs) -> DocumentTotals {
    let (total_material_cost, total_labour_cost) = sections
        .iter()
        .map(|section| section_costs(section.items(), inputs))
        .fold((Decimal::ZERO, Decimal::ZERO), |(material, labour), costs| {
            (
                material.saturating_add(costs.material_cost),
                labour.saturating_add(costs.labour_cost),
            )
        });

    let subtotal = total_material_cost.saturating_add(total_labour_cost);
    let tax_amount = percent_of(subtotal, inputs.tax_rate);
    let total_amount = subtotal.saturating_add(tax_amount);

    let (amount_paid, balance_due) = match inputs.kind {
        DocumentKind::Invoice => (
            Some(inputs.amount_paid),
            Some(total_amount.saturating_sub(inputs.amount_paid)),
        ),
        DocumentKind::Quotation => (None, None),
    };

    DocumentTotals {
        total_material_cost,
        total_labour_cost,
        subtotal,
        tax_rate: inputs.tax_rate,
        tax_amount,
        total_amount,
        amount_paid,
        balance_due,
    }
}

/// Totals as stored and printed: rounded half-up to the minor unit.
///
/// Material and labour are rounded, the subtotal is their sum, tax is taken on
/// that subtotal and rounded, and the total is the sum of the two. The printed
/// identities `subtotal = material + labour` and `total = subtotal + tax` hold
/// exactly on the rounded figures.
pub fn finalize_totals(sections: &[Section], inputs: &PricingInputs, minor_units: u32) -> DocumentTotals {
    let exact = calculate_totals(sections, inputs);

    let total_material_cost = round_minor(exact.total_material_cost, minor_units);
    let total_labour_cost = round_minor(exact.total_labour_cost, minor_units);
    let subtotal = total_material_cost.saturating_add(total_labour_cost);
    let tax_amount = round_minor(percent_of(subtotal, inputs.tax_rate), minor_units);
    let total_amount = subtotal.saturating_add(tax_amount);

    let amount_paid = exact.amount_paid.map(|paid| round_minor(paid, minor_units));
    let balance_due = amount_paid.map(|paid| total_amount.saturating_sub(paid));

    DocumentTotals {
        total_material_cost,
        total_labour_cost,
        subtotal,
        tax_rate: inputs.tax_rate,
        tax_amount,
        total_amount,
        amount_paid,
        balance_due,
    }
}
