//! Pagination of the line-item table.
//!
//! Pure: takes table rows and page capacities, returns pages. The renderer
//! draws exactly what this produces.

use crate::error::ExportError;
use crate::models::{DocumentKind, FinancialDocument};
use rust_decimal::Decimal;

/// Page capacities, counted in table rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLayout {
    /// Rows on the first page, below the document header block.
    pub first_page_rows: usize,
    /// Rows on every following page.
    pub page_rows: usize,
}

impl Default for PageLayout {
    fn default() -> Self {
        Self {
            first_page_rows: 32,
            page_rows: 40,
        }
    }
}

/// One printable row of the line-item table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageRow {
    /// Column titles; starts every page that carries table rows.
    ColumnHeader,
    Section {
        name: String,
        material_cost: Decimal,
        labour_cost: Decimal,
    },
    Item {
        description: String,
        quantity: Decimal,
        unit: String,
        unit_price: Decimal,
        total_price: Decimal,
        is_material: bool,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    pub rows: Vec<PageRow>,
    /// Whether the totals block is printed below this page's rows.
    pub totals: bool,
}

/// Section and item rows in display order.
pub fn table_rows(document: &FinancialDocument) -> Vec<PageRow> {
    let mut rows = Vec::new();
    for section in document.sections() {
        rows.push(PageRow::Section {
            name: section.name.clone(),
            material_cost: section.material_cost(),
            labour_cost: section.labour_cost(),
        });
        for item in section.items() {
            rows.push(PageRow::Item {
                description: item.description.clone(),
                quantity: item.quantity(),
                unit: item.unit.clone(),
                unit_price: item.unit_price(),
                total_price: item.total_price(),
                is_material: item.is_material,
            });
        }
    }
    rows
}

/// Height of the totals block in rows, including notes and terms.
pub fn totals_rows(document: &FinancialDocument) -> usize {
    let figures = match document.kind() {
        DocumentKind::Invoice => 7,
        DocumentKind::Quotation => 5,
    };
    let header = document.header();
    let text_lines = |text: &Option<String>| {
        text.as_deref()
            .map(|t| t.lines().take(MAX_TEXT_LINES).count() + 1)
            .unwrap_or(0)
    };
    // one spacer row above the block
    1 + figures + text_lines(&header.notes) + text_lines(&header.terms)
}

/// Lines of notes or terms printed under the totals.
pub const MAX_TEXT_LINES: usize = 4;

/// Split `rows` into pages.
///
/// Each page with table rows starts with a [`PageRow::ColumnHeader`]. A
/// section row is never left alone at the bottom of a page. The totals block
/// follows the last row and moves to a page of its own when it does not fit.
pub fn paginate(
    rows: Vec<PageRow>,
    layout: &PageLayout,
    totals_rows: usize,
) -> Result<Vec<Page>, ExportError> {
    if layout.first_page_rows < 3 || layout.page_rows < 3 {
        return Err(ExportError::Layout(
            "a page must hold a header, a section and an item row".to_string(),
        ));
    }
    if totals_rows > layout.page_rows {
        return Err(ExportError::Layout(format!(
            "totals block needs {} rows but a page holds {}",
            totals_rows, layout.page_rows
        )));
    }

    let mut pages = Vec::new();
    let mut current = Page::default();
    let mut capacity = layout.first_page_rows;

    for (index, row) in rows.iter().enumerate() {
        let mut needed = if current.rows.is_empty() { 2 } else { 1 };
        if matches!(row, PageRow::Section { .. })
            && matches!(rows.get(index + 1), Some(PageRow::Item { .. }))
        {
            needed += 1;
        }

        if !current.rows.is_empty() && current.rows.len() + needed > capacity {
            pages.push(std::mem::take(&mut current));
            capacity = layout.page_rows;
        }
        if current.rows.is_empty() {
            current.rows.push(PageRow::ColumnHeader);
        }
        current.rows.push(row.clone());
    }

    // An empty table keeps its header row only beside the totals.
    if rows.is_empty() && 1 + totals_rows <= capacity {
        current.rows.push(PageRow::ColumnHeader);
    }
    if current.rows.len() + totals_rows > capacity {
        pages.push(std::mem::take(&mut current));
    }
    current.totals = true;
    pages.push(current);

    Ok(pages)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(name: &str) -> PageRow {
        PageRow::Section {
            name: name.to_string(),
            material_cost: Decimal::ZERO,
            labour_cost: Decimal::ZERO,
        }
    }

    fn item(n: usize) -> PageRow {
        PageRow::Item {
            description: format!("Item {}", n),
            quantity: Decimal::ONE,
            unit: "pcs".to_string(),
            unit_price: Decimal::ONE,
            total_price: Decimal::ONE,
            is_material: true,
        }
    }

    fn small() -> PageLayout {
        PageLayout {
            first_page_rows: 5,
            page_rows: 6,
        }
    }

    #[test]
    fn test_everything_fits_on_one_page() {
        let rows = vec![section("Walls"), item(1), item(2)];
        let pages = paginate(rows, &PageLayout::default(), 8).unwrap();

        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].rows[0], PageRow::ColumnHeader);
        assert_eq!(pages[0].rows.len(), 4);
        assert!(pages[0].totals);
    }

    #[test]
    fn test_header_repeats_on_every_page_with_rows() {
        let mut rows = vec![section("Foundation")];
        rows.extend((1..=12).map(item));
        let pages = paginate(rows, &small(), 2).unwrap();

        assert!(pages.len() > 2);
        for page in pages.iter().filter(|p| !p.rows.is_empty()) {
            assert_eq!(page.rows[0], PageRow::ColumnHeader);
            assert_eq!(
                page.rows.iter().filter(|r| **r == PageRow::ColumnHeader).count(),
                1
            );
        }
        assert!(pages[0].rows.len() <= 5);
        assert!(pages.iter().skip(1).all(|p| p.rows.len() <= 6));
    }

    #[test]
    fn test_totals_once_after_last_row() {
        let mut rows = vec![section("Roof")];
        rows.extend((1..=20).map(item));
        let pages = paginate(rows, &small(), 3).unwrap();

        assert_eq!(pages.iter().filter(|p| p.totals).count(), 1);
        assert!(pages.last().unwrap().totals);

        let printed: usize = pages
            .iter()
            .flat_map(|p| p.rows.iter())
            .filter(|r| matches!(r, PageRow::Item { .. }))
            .count();
        assert_eq!(printed, 20);
    }

    #[test]
    fn test_totals_move_to_new_page_when_full() {
        // header + section + 3 items fill the first page exactly
        let rows = vec![section("Plumbing"), item(1), item(2), item(3)];
        let pages = paginate(rows, &small(), 4).unwrap();

        assert_eq!(pages.len(), 2);
        assert!(!pages[0].totals);
        assert!(pages[1].totals);
        assert!(pages[1].rows.is_empty());
    }

    #[test]
    fn test_section_row_is_not_orphaned() {
        let rows = vec![
            section("A"),
            item(1),
            item(2),
            section("B"),
            item(3),
        ];
        let pages = paginate(rows, &small(), 1).unwrap();

        let last_of_first = pages[0].rows.last().unwrap();
        assert!(matches!(last_of_first, PageRow::Item { .. }));
        assert!(matches!(pages[1].rows[1], PageRow::Section { .. }));
    }

    #[test]
    fn test_empty_document_has_one_page() {
        let pages = paginate(Vec::new(), &PageLayout::default(), 6).unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].rows, vec![PageRow::ColumnHeader]);
        assert!(pages[0].totals);
    }

    #[test]
    fn test_empty_document_never_prints_a_lone_header() {
        let layout = PageLayout {
            first_page_rows: 4,
            page_rows: 8,
        };
        let pages = paginate(Vec::new(), &layout, 6).unwrap();

        assert_eq!(pages.len(), 2);
        assert!(pages[0].rows.is_empty());
        assert!(!pages[0].totals);
        assert!(pages[1].rows.is_empty());
        assert!(pages[1].totals);
    }

    #[test]
    fn test_oversized_totals_block_is_rejected() {
        let result = paginate(vec![item(1)], &small(), 7);
        assert!(matches!(result, Err(ExportError::Layout(_))));
    }
}
