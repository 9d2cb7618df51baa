use std::collections::BTreeMap;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::{NewCategory, DEFAULT_CATEGORY_COLOR};
use crate::store::ExpenseStore;
use crate::workbook::{Cell, Sheet};

pub const CATEGORIES_SHEET: &str = "Categories";
const HEADER_SCAN_ROWS: usize = 10;

/// Category ids found in the file → ids in the store. Lives for one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LegacyIdMap {
    ids: BTreeMap<String, Uuid>,
}

impl LegacyIdMap {
    pub fn insert(&mut self, legacy_id: &str, id: Uuid) {
        self.ids.insert(legacy_id.trim().to_string(), id);
    }

    pub fn get(&self, legacy_id: &str) -> Option<Uuid> {
        self.ids.get(legacy_id.trim()).copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct BootstrapOutcome {
    pub legacy_ids: LegacyIdMap,
    pub created: usize,
    pub warnings: Vec<String>,
}

#[derive(Debug, Default)]
struct SheetColumns {
    id: Option<usize>,
    name: Option<usize>,
    icon: Option<usize>,
    color: Option<usize>,
    is_default: Option<usize>,
}

fn find_header(sheet: &Sheet) -> Option<(usize, SheetColumns)> {
    let last = HEADER_SCAN_ROWS.min(sheet.height());
    (0..last).find_map(|row_idx| {
        let headers: Vec<String> = sheet
            .row(row_idx)
            .iter()
            .map(|c| c.as_text().to_lowercase())
            .collect();
        if !headers.iter().any(|h| h == "name" || h == "id") {
            return None;
        }
        let mut cols = SheetColumns::default();
        for (idx, header) in headers.iter().enumerate() {
            let slot = match header.as_str() {
                "id" => &mut cols.id,
                "name" => &mut cols.name,
                "icon" => &mut cols.icon,
                "color" | "colour" => &mut cols.color,
                "is default" | "is_default" | "default" => &mut cols.is_default,
                _ => continue,
            };
            slot.get_or_insert(idx);
        }
        Some((row_idx, cols))
    })
}

fn text_at(sheet: &Sheet, row: usize, col: Option<usize>) -> Option<String> {
    col.map(|c| sheet.cell(row, c).as_text())
        .filter(|s| !s.is_empty())
}

fn truthy(cell: &Cell) -> bool {
    match cell {
        Cell::Bool(b) => *b,
        Cell::Int(i) => *i == 1,
        Cell::Float(f) => *f == 1.0,
        other => matches!(other.as_text().to_lowercase().as_str(), "yes" | "true" | "1"),
    }
}

/// Creates the categories listed in `sheet` that the store lacks, inside one
/// transaction. Problems with individual rows become warnings.
pub fn bootstrap_categories<S: ExpenseStore + ?Sized>(store: &mut S, sheet: &Sheet) -> BootstrapOutcome {
    let mut outcome = BootstrapOutcome::default();

    let Some((header_row, cols)) = find_header(sheet) else {
        outcome
            .warnings
            .push("Categories sheet has no header row with 'name' or 'id'; skipped".to_string());
        return outcome;
    };
    if cols.name.is_none() {
        outcome
            .warnings
            .push("Categories sheet has no 'name' column; skipped".to_string());
        return outcome;
    }

    if let Err(e) = store.begin() {
        warn!(error = %e, "could not start category bootstrap");
        outcome.warnings.push(format!("Categories sheet skipped: {e}"));
        return outcome;
    }

    let mut legacy_ids = LegacyIdMap::default();
    let mut created = 0;
    for row_idx in header_row + 1..sheet.height() {
        let row = row_idx + 1;
        let legacy_id = text_at(sheet, row_idx, cols.id);
        let Some(name) = text_at(sheet, row_idx, cols.name) else {
            if legacy_id.is_some() {
                outcome
                    .warnings
                    .push(format!("Categories row {row}: missing name"));
            }
            continue;
        };

        let resolved = match store.find_category_by_name(&name) {
            Ok(Some(existing)) => Ok(existing.id),
            Ok(None) => {
                let new_category = NewCategory {
                    name: name.clone(),
                    icon: text_at(sheet, row_idx, cols.icon),
                    color: text_at(sheet, row_idx, cols.color)
                        .unwrap_or_else(|| DEFAULT_CATEGORY_COLOR.to_string()),
                    is_default: cols
                        .is_default
                        .map_or(false, |c| truthy(sheet.cell(row_idx, c))),
                };
                store.upsert_category(&new_category).map(|(category, was_created)| {
                    if was_created {
                        debug!(name = %category.name, "created category");
                        created += 1;
                    }
                    category.id
                })
            }
            Err(e) => Err(e),
        };

        match resolved {
            Ok(id) => {
                if let Some(legacy) = legacy_id {
                    legacy_ids.insert(&legacy, id);
                }
            }
            Err(e) => {
                warn!(row, name = %name, error = %e, "category row failed");
                outcome
                    .warnings
                    .push(format!("Categories row {row}: {e}"));
            }
        }
    }

    if let Err(e) = store.commit() {
        warn!(error = %e, "category bootstrap commit failed");
        let _ = store.rollback();
        outcome
            .warnings
            .push(format!("Categories sheet could not be saved: {e}"));
        return outcome;
    }

    info!(created, mapped = legacy_ids.len(), "category bootstrap complete");
    outcome.legacy_ids = legacy_ids;
    outcome.created = created;
    outcome
}
