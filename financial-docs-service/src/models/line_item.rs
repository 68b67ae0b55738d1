//! Line item model.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Validator for quantities, prices and rates.
pub(crate) fn non_negative(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() && !value.is_zero() {
        let mut error = ValidationError::new("non_negative");
        error.message = Some("must not be negative".into());
        return Err(error);
    }
    Ok(())
}

/// Largest accepted quantity.
pub const MAX_QUANTITY: u64 = 1_000_000_000;
/// Largest accepted unit price or payment, in major units.
pub const MAX_AMOUNT: u64 = 1_000_000_000_000_000;
/// Largest accepted rate, in percent.
pub const MAX_RATE: u64 = 1_000;

fn within(value: &Decimal, limit: u64) -> Result<(), ValidationError> {
    if value.abs() > Decimal::from(limit) {
        let mut error = ValidationError::new("too_large");
        error.message = Some(format!("must not exceed {}", limit).into());
        return Err(error);
    }
    Ok(())
}

pub(crate) fn valid_quantity(value: &Decimal) -> Result<(), ValidationError> {
    non_negative(value)?;
    within(value, MAX_QUANTITY)
}

pub(crate) fn valid_amount(value: &Decimal) -> Result<(), ValidationError> {
    non_negative(value)?;
    within(value, MAX_AMOUNT)
}

pub(crate) fn valid_rate(value: &Decimal) -> Result<(), ValidationError> {
    non_negative(value)?;
    within(value, MAX_RATE)
}

/// `quantity * unit_price` for values inside the accepted limits.
fn line_total(quantity: Decimal, unit_price: Decimal) -> Result<Decimal, String> {
    within(&quantity, MAX_QUANTITY).map_err(|_| format!("quantity must not exceed {}", MAX_QUANTITY))?;
    within(&unit_price, MAX_AMOUNT).map_err(|_| format!("unitPrice must not exceed {}", MAX_AMOUNT))?;
    quantity
        .checked_mul(unit_price)
        .ok_or_else(|| "line total is out of range".to_string())
}

fn default_true() -> bool {
    true
}

/// A billable row inside a section.
///
/// `total_price` is always `quantity * unit_price`; it is recomputed by every
/// constructor and setter, and on deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "LineItemRecord")]
pub struct LineItem {
    pub id: Uuid,
    pub description: String,
    quantity: Decimal,
    pub unit: String,
    unit_price: Decimal,
    total_price: Decimal,
    pub is_material: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// Wire shape of a line item; any stored `totalPrice` is ignored and values
/// beyond the accepted limits fail deserialization.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LineItemRecord {
    id: Uuid,
    #[serde(default)]
    description: String,
    quantity: Decimal,
    #[serde(default)]
    unit: String,
    unit_price: Decimal,
    #[serde(default = "default_true")]
    is_material: bool,
    #[serde(default)]
    category: Option<String>,
}

impl TryFrom<LineItemRecord> for LineItem {
    type Error = String;

    fn try_from(record: LineItemRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: record.id,
            description: record.description,
            quantity: record.quantity,
            unit: record.unit,
            unit_price: record.unit_price,
            total_price: line_total(record.quantity, record.unit_price)?,
            is_material: record.is_material,
            category: record.category,
        })
    }
}

impl LineItem {
    /// Create a line item from validated input.
    pub fn new(input: NewLineItem) -> Result<Self, validator::ValidationErrors> {
        input.validate()?;
        let total_price = input.quantity * input.unit_price;
        Ok(Self {
            id: Uuid::new_v4(),
            description: input.description,
            quantity: input.quantity,
            unit: input.unit,
            unit_price: input.unit_price,
            total_price,
            is_material: input.is_material,
            category: input.category,
        })
    }

    pub fn quantity(&self) -> Decimal {
        self.quantity
    }

    pub fn unit_price(&self) -> Decimal {
        self.unit_price
    }

    pub fn total_price(&self) -> Decimal {
        self.total_price
    }

    /// Apply a partial update. Nothing changes if validation fails.
    pub fn apply(&mut self, update: LineItemUpdate) -> Result<(), validator::ValidationErrors> {
        update.validate()?;

        if let Some(description) = update.description {
            self.description = description;
        }
        if let Some(quantity) = update.quantity {
            self.quantity = quantity;
        }
        if let Some(unit) = update.unit {
            self.unit = unit;
        }
        if let Some(unit_price) = update.unit_price {
            self.unit_price = unit_price;
        }
        if let Some(is_material) = update.is_material {
            self.is_material = is_material;
        }
        if let Some(category) = update.category {
            self.category = Some(category).filter(|c| !c.trim().is_empty());
        }

        self.total_price = self.quantity * self.unit_price;
        Ok(())
    }

    /// Field checks for documents that arrived over the wire.
    pub(crate) fn check(&self) -> Result<(), ValidationError> {
        valid_quantity(&self.quantity)?;
        valid_amount(&self.unit_price)
    }
}

/// Input for adding a line item.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewLineItem {
    #[validate(length(min = 1, message = "description is required"))]
    pub description: String,
    #[validate(custom(function = "valid_quantity"))]
    pub quantity: Decimal,
    #[serde(default)]
    pub unit: String,
    #[validate(custom(function = "valid_amount"))]
    pub unit_price: Decimal,
    #[serde(default = "default_true")]
    pub is_material: bool,
    #[serde(default)]
    pub category: Option<String>,
}

impl NewLineItem {
    /// Material row with the given quantity and unit price.
    pub fn material(description: &str, quantity: Decimal, unit: &str, unit_price: Decimal) -> Self {
        Self {
            description: description.to_string(),
            quantity,
            unit: unit.to_string(),
            unit_price,
            is_material: true,
            category: None,
        }
    }

    /// Labour row with the given quantity and unit price.
    pub fn labour(description: &str, quantity: Decimal, unit: &str, unit_price: Decimal) -> Self {
        Self {
            is_material: false,
            ..Self::material(description, quantity, unit, unit_price)
        }
    }
}

/// Input for updating a line item.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LineItemUpdate {
    #[validate(length(min = 1, message = "description is required"))]
    pub description: Option<String>,
    #[validate(custom(function = "valid_quantity"))]
    pub quantity: Option<Decimal>,
    pub unit: Option<String>,
    #[validate(custom(function = "valid_amount"))]
    pub unit_price: Option<Decimal>,
    pub is_material: Option<bool>,
    pub category: Option<String>,
}
