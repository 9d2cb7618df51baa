use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub icon: Option<String>,
    pub color: String,
    pub is_default: bool,
}

/// Category row as read from a `Categories` sheet, before it exists in the store.
#[derive(Debug, Clone)]
pub struct NewCategory {
    pub name: String,
    pub icon: Option<String>,
    pub color: String,
    pub is_default: bool,
}

pub const DEFAULT_CATEGORY_COLOR: &str = "#4CAF50";

impl NewCategory {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            icon: None,
            color: DEFAULT_CATEGORY_COLOR.to_string(),
            is_default: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Expense {
    pub id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub description: String,
    pub category_id: Option<Uuid>,
    pub date: NaiveDate,
    pub tags: Vec<String>,
    pub location: Option<String>,
    pub notes: Option<String>,
    /// Identifier the row carried in the file it was imported from.
    pub external_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewExpense {
    pub amount: Decimal,
    pub currency: String,
    pub description: String,
    pub category_id: Option<Uuid>,
    pub date: NaiveDate,
    pub tags: Vec<String>,
    pub location: Option<String>,
    pub notes: Option<String>,
    pub external_id: Option<String>,
}

/// Validated, typed representation of one transaction row.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRow {
    /// 1-based spreadsheet row number.
    pub row: usize,
    pub date: NaiveDate,
    pub amount: Decimal,
    pub currency: String,
    pub description: String,
    pub tags: Vec<String>,
    pub location: Option<String>,
    pub notes: Option<String>,
    pub category_hint: Option<String>,
    pub source_id: Option<String>,
    pub legacy_category_id: Option<String>,
}

impl ParsedRow {
    pub fn into_new_expense(self, category_id: Option<Uuid>) -> NewExpense {
        NewExpense {
            amount: self.amount,
            currency: self.currency,
            description: self.description,
            category_id,
            date: self.date,
            tags: self.tags,
            location: self.location,
            notes: self.notes,
            external_id: self.source_id,
        }
    }
}

/// One line of the import log.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportRecord {
    pub filename: String,
    pub checksum: String,
    pub total_rows: usize,
    pub imported: usize,
    pub failed: usize,
    pub skipped: usize,
    pub date_range: Option<(NaiveDate, NaiveDate)>,
}
