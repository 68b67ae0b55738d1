//! Section model: a named, ordered group of line items.

use super::line_item::LineItem;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// A named grouping of line items (e.g. "Foundation Work").
///
/// `material_cost` and `labour_cost` are derived by the totals calculator and
/// refreshed by the owning document after every mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub id: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub order: i32,
    #[serde(default)]
    pub(crate) items: Vec<LineItem>,
    #[serde(default)]
    pub(crate) material_cost: Decimal,
    #[serde(default)]
    pub(crate) labour_cost: Decimal,
}

impl Section {
    pub(crate) fn new(input: NewSection, order: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: input.name,
            description: input.description.filter(|d| !d.trim().is_empty()),
            order,
            items: Vec::new(),
            material_cost: Decimal::ZERO,
            labour_cost: Decimal::ZERO,
        }
    }

    /// Items in display order.
    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    pub fn item(&self, item_id: Uuid) -> Option<&LineItem> {
        self.items.iter().find(|i| i.id == item_id)
    }

    pub fn material_cost(&self) -> Decimal {
        self.material_cost
    }

    pub fn labour_cost(&self) -> Decimal {
        self.labour_cost
    }

    pub(crate) fn item_mut(&mut self, item_id: Uuid) -> Option<&mut LineItem> {
        self.items.iter_mut().find(|i| i.id == item_id)
    }
}

/// Input for adding a section.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewSection {
    #[validate(length(min = 1, message = "section name is required"))]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl NewSection {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            description: None,
        }
    }
}

/// Input for renaming or re-describing a section.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SectionUpdate {
    #[validate(length(min = 1, message = "section name is required"))]
    pub name: Option<String>,
    pub description: Option<String>,
}
