use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info};

use crate::error::{Result, SpendsheetError};
use crate::workbook::Sheet;

/// Semantic transaction fields. Declaration order is matching priority: when
/// one header is an alias of several fields, the first unmapped one wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Id,
    Date,
    Amount,
    Description,
    Name,
    FreeText,
    Category,
    CategoryId,
    Location,
    Notes,
    Who,
    Currency,
    Tags,
}

impl Field {
    pub const ALL: [Field; 13] = [
        Field::Id,
        Field::Date,
        Field::Amount,
        Field::Description,
        Field::Name,
        Field::FreeText,
        Field::Category,
        Field::CategoryId,
        Field::Location,
        Field::Notes,
        Field::Who,
        Field::Currency,
        Field::Tags,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Date => "date",
            Self::Amount => "amount",
            Self::Description => "description",
            Self::Name => "name",
            Self::FreeText => "rawtext",
            Self::Category => "category",
            Self::CategoryId => "category_id",
            Self::Location => "location",
            Self::Notes => "notes",
            Self::Who => "who",
            Self::Currency => "currency",
            Self::Tags => "tags",
        }
    }
}

const DEFAULT_ALIASES: &[(Field, &[&str])] = &[
    (Field::Id, &["id", "uuid", "expense_id", "expense id"]),
    (Field::Date, &["date", "tanggal", "transaction date", "expense date", "timestamp"]),
    (Field::Amount, &["amount", "jumlah", "total", "price", "harga", "value"]),
    (
        Field::Description,
        &["description", "deskripsi", "note", "notes", "detail", "item", "merchant", "store"],
    ),
    (Field::Name, &["name"]),
    (Field::FreeText, &["rawtext", "raw text"]),
    (Field::Category, &["category", "kategori", "type", "jenis"]),
    (Field::CategoryId, &["category id", "category_id", "kategori id"]),
    (Field::Location, &["location", "lokasi", "place", "tempat"]),
    (Field::Notes, &["notes", "note", "catatan", "remarks", "keterangan"]),
    (Field::Who, &["who"]),
    (Field::Currency, &["currency", "mata uang", "matauang"]),
    (Field::Tags, &["tags", "tag", "label"]),
];

/// Header aliases per field, lowercased and trimmed.
#[derive(Debug, Clone)]
pub struct AliasTable {
    aliases: BTreeMap<Field, Vec<String>>,
}

impl AliasTable {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (Field, Vec<S>)>,
        S: AsRef<str>,
    {
        let mut aliases: BTreeMap<Field, Vec<String>> = BTreeMap::new();
        for (field, names) in entries {
            aliases
                .entry(field)
                .or_default()
                .extend(names.iter().map(|n| n.as_ref().trim().to_lowercase()));
        }
        Self { aliases }
    }

    /// First field (in declaration order) not yet in `taken` that lists `header`.
    fn field_for(&self, header: &str, taken: &BTreeMap<Field, usize>) -> Option<Field> {
        self.aliases
            .iter()
            .filter(|(field, _)| !taken.contains_key(field))
            .find(|(_, names)| names.iter().any(|n| n == header))
            .map(|(field, _)| *field)
    }
}

impl Default for AliasTable {
    fn default() -> Self {
        Self::new(
            DEFAULT_ALIASES
                .iter()
                .map(|(field, names)| (*field, names.to_vec())),
        )
    }
}

/// Field → 0-based column index for one worksheet.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMap {
    columns: BTreeMap<Field, usize>,
    header_row: usize,
}

impl ColumnMap {
    pub fn get(&self, field: Field) -> Option<usize> {
        self.columns.get(&field).copied()
    }

    pub fn contains(&self, field: Field) -> bool {
        self.columns.contains_key(&field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Field, usize)> + '_ {
        self.columns.iter().map(|(f, c)| (*f, *c))
    }

    /// 0-based index of the last header row scanned; data starts below it.
    pub fn header_row(&self) -> usize {
        self.header_row
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

fn has_minimum(columns: &BTreeMap<Field, usize>) -> bool {
    columns.contains_key(&Field::Date)
        && columns.contains_key(&Field::Amount)
        && [Field::Description, Field::Name, Field::FreeText]
            .iter()
            .any(|f| columns.contains_key(f))
}

pub const DEFAULT_HEADER_SCAN_ROWS: usize = 3;

pub struct ColumnDetector {
    aliases: AliasTable,
    scan_rows: usize,
}

impl ColumnDetector {
    pub fn new(aliases: AliasTable, scan_rows: usize) -> Self {
        Self {
            aliases,
            scan_rows: scan_rows.max(1),
        }
    }

    pub fn detect(&self, sheet: &Sheet) -> Result<ColumnMap> {
        let mut columns = BTreeMap::new();
        let last = self.scan_rows.min(sheet.height());

        for row_idx in 0..last {
            for (col_idx, cell) in sheet.row(row_idx).iter().enumerate() {
                if cell.is_empty() {
                    continue;
                }
                let header = cell.as_text().to_lowercase();
                if let Some(field) = self.aliases.field_for(&header, &columns) {
                    debug!(row = row_idx + 1, col = col_idx + 1, header = %header, field = field.key(), "mapped column");
                    columns.insert(field, col_idx);
                }
            }
            if has_minimum(&columns) {
                info!(header_row = row_idx + 1, mapped = columns.len(), "column detection complete");
                return Ok(ColumnMap {
                    columns,
                    header_row: row_idx,
                });
            }
        }

        Err(SpendsheetError::Structural(
            "Could not detect required columns. Please ensure your file has columns for Date, Amount, and Description."
                .to_string(),
        ))
    }
}

impl Default for ColumnDetector {
    fn default() -> Self {
        Self::new(AliasTable::default(), DEFAULT_HEADER_SCAN_ROWS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detect(rows: &[&[&str]]) -> Result<ColumnMap> {
        ColumnDetector::default().detect(&Sheet::from_text_rows("Sheet1", rows))
    }

    #[test]
    fn test_detects_english_headers() {
        let map = detect(&[&["Date", "Amount", "Description"]]).unwrap();
        assert_eq!(map.get(Field::Date), Some(0));
        assert_eq!(map.get(Field::Amount), Some(1));
        assert_eq!(map.get(Field::Description), Some(2));
        assert_eq!(map.header_row(), 0);
    }

    #[test]
    fn test_detects_indonesian_headers_any_case() {
        let map = detect(&[&["  TANGGAL ", "Deskripsi", "jumlah", "Kategori"]]).unwrap();
        assert_eq!(map.get(Field::Date), Some(0));
        assert_eq!(map.get(Field::Description), Some(1));
        assert_eq!(map.get(Field::Amount), Some(2));
        assert_eq!(map.get(Field::Category), Some(3));
    }

    #[test]
    fn test_name_satisfies_description_requirement() {
        let map = detect(&[&["Timestamp", "Name", "Price", "RawText", "Who"]]).unwrap();
        assert_eq!(map.get(Field::Name), Some(1));
        assert_eq!(map.get(Field::FreeText), Some(3));
        assert_eq!(map.get(Field::Who), Some(4));
        assert!(!map.contains(Field::Description));
    }

    #[test]
    fn test_first_match_wins_and_shared_alias_falls_through() {
        // "Notes" is a description alias; once description is taken it maps to notes.
        let map = detect(&[&["Date", "Description", "Notes", "Amount", "Total"]]).unwrap();
        assert_eq!(map.get(Field::Description), Some(1));
        assert_eq!(map.get(Field::Notes), Some(2));
        assert_eq!(map.get(Field::Amount), Some(3));
    }

    #[test]
    fn test_scans_past_title_rows() {
        let map = detect(&[
            &["My expenses 2026"],
            &[""],
            &["Date", "Item", "Amount"],
        ])
        .unwrap();
        assert_eq!(map.header_row(), 2);
        assert_eq!(map.get(Field::Description), Some(1));
    }

    #[test]
    fn test_stops_once_minimum_found() {
        let map = detect(&[&["Date", "Amount", "Item"], &["Currency", "", ""]]).unwrap();
        assert_eq!(map.header_row(), 0);
        assert!(!map.contains(Field::Currency));
    }

    #[test]
    fn test_fails_outside_scan_window() {
        let err = detect(&[&["a"], &["b"], &["c"], &["Date", "Amount", "Description"]]).unwrap_err();
        assert!(err.is_structural());
    }

    #[test]
    fn test_fails_without_amount() {
        assert!(detect(&[&["Date", "Description"]]).is_err());
    }

    #[test]
    fn test_custom_alias_table() {
        let aliases = AliasTable::new(vec![
            (Field::Date, vec!["Datum"]),
            (Field::Amount, vec!["Betrag"]),
            (Field::Description, vec!["Beschreibung"]),
        ]);
        let detector = ColumnDetector::new(aliases, 1);
        let sheet = Sheet::from_text_rows("S", &[&["Betrag", "Datum", "Beschreibung"]]);
        let map = detector.detect(&sheet).unwrap();
        assert_eq!(map.get(Field::Amount), Some(0));
        assert_eq!(map.len(), 3);
    }
}
