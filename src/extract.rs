use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::columns::{ColumnMap, Field};
use crate::workbook::{Cell, Sheet};

/// Unparsed cell values of one spreadsheet row, keyed by field.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    /// 1-based spreadsheet row number.
    pub row: usize,
    values: BTreeMap<Field, Cell>,
}

impl RawRow {
    pub fn new(row: usize) -> Self {
        Self {
            row,
            values: BTreeMap::new(),
        }
    }

    pub fn with(mut self, field: Field, cell: Cell) -> Self {
        self.set(field, cell);
        self
    }

    pub fn set(&mut self, field: Field, cell: Cell) {
        if cell.is_empty() {
            self.values.remove(&field);
        } else {
            self.values.insert(field, cell);
        }
    }

    pub fn get(&self, field: Field) -> Option<&Cell> {
        self.values.get(&field)
    }

    /// Trimmed text of a field, `None` when absent or blank.
    pub fn text(&self, field: Field) -> Option<String> {
        self.get(field)
            .map(Cell::as_text)
            .filter(|s| !s.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// JSON object of the raw values, for failed-row diagnostics.
    pub fn to_json(&self) -> Value {
        let mut obj = Map::new();
        for (field, cell) in &self.values {
            let value = match cell {
                Cell::Int(i) => Value::from(*i),
                Cell::Float(f) => serde_json::Number::from_f64(*f)
                    .map(Value::Number)
                    .unwrap_or_else(|| Value::String(cell.as_text())),
                Cell::Bool(b) => Value::Bool(*b),
                _ => Value::String(cell.as_text()),
            };
            obj.insert(field.key().to_string(), value);
        }
        Value::Object(obj)
    }
}

/// Reads every mapped column of `row_idx` (0-based). Returns `None` for rows
/// with no non-empty mapped cell.
pub fn extract_row(sheet: &Sheet, columns: &ColumnMap, row_idx: usize) -> Option<RawRow> {
    let mut raw = RawRow::new(row_idx + 1);
    for (field, col) in columns.iter() {
        raw.set(field, sheet.cell(row_idx, col).clone());
    }
    if raw.is_empty() {
        return None;
    }
    synthesize_description(&mut raw);
    Some(raw)
}

/// Name beats free text as the description; differing free text moves to
/// notes. A `who` value is appended to notes.
fn synthesize_description(raw: &mut RawRow) {
    let name = raw.text(Field::Name);
    let free_text = raw.text(Field::FreeText);

    match (name, free_text) {
        (Some(name), Some(free_text)) => {
            if free_text != name {
                raw.set(Field::Notes, Cell::Text(free_text));
            }
            raw.set(Field::Description, Cell::Text(name));
        }
        (Some(only), None) | (None, Some(only)) => {
            raw.set(Field::Description, Cell::Text(only));
        }
        (None, None) => {}
    }

    if let Some(who) = raw.text(Field::Who) {
        let notes = match raw.text(Field::Notes) {
            Some(existing) => format!("{existing} (by {who})"),
            None => format!("by {who}"),
        };
        raw.set(Field::Notes, Cell::Text(notes));
    }
}
