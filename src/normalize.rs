use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use regex::Regex;
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::columns::Field;
use crate::extract::RawRow;
use crate::models::ParsedRow;
use crate::workbook::{excel_serial_to_datetime, Cell};

pub const DEFAULT_CURRENCY: &str = "IDR";
pub const MAX_DESCRIPTION_CHARS: usize = 500;
pub const MAX_LOCATION_CHARS: usize = 200;
pub const MAX_NOTES_CHARS: usize = 2000;

// Order matters: month-first wins for ambiguous values such as 1/2/2026.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H.%M.%S",
    "%m/%d/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%d/%m/%Y %H:%M",
    "%Y-%m-%d %H:%M",
    "%m-%d-%Y %H:%M:%S",
    "%d-%m-%Y %H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%m/%d/%Y",
    "%d/%m/%Y",
    "%d-%m-%Y",
    "%Y/%m/%d",
    "%d.%m.%Y",
    "%m-%d-%Y",
    "%m.%d.%Y",
    "%d/%m/%y",
    "%m/%d/%y",
];

const EMBEDDED_DATE_PATTERNS: &[&str] = &[
    r"(\d{1,2}[/-]\d{1,2}[/-]\d{4})",
    r"(\d{4}[/-]\d{1,2}[/-]\d{1,2})",
    r"(\d{1,2}[/-]\d{1,2}[/-]\d{2})",
];

// English and Indonesian month names and abbreviations.
const MONTH_NAMES: &[(&str, u32)] = &[
    ("january", 1), ("jan", 1), ("januari", 1),
    ("february", 2), ("feb", 2), ("februari", 2), ("peb", 2), ("pebruari", 2),
    ("march", 3), ("mar", 3), ("maret", 3),
    ("april", 4), ("apr", 4),
    ("may", 5), ("mei", 5),
    ("june", 6), ("jun", 6), ("juni", 6),
    ("july", 7), ("jul", 7), ("juli", 7),
    ("august", 8), ("aug", 8), ("agustus", 8), ("agu", 8), ("agt", 8),
    ("september", 9), ("sep", 9), ("sept", 9),
    ("october", 10), ("oct", 10), ("oktober", 10), ("okt", 10),
    ("november", 11), ("nov", 11), ("nop", 11), ("nopember", 11),
    ("december", 12), ("dec", 12), ("desember", 12), ("des", 12),
];

fn embedded_date_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        EMBEDDED_DATE_PATTERNS
            .iter()
            .filter_map(|p| Regex::new(p).ok())
            .collect()
    })
}

fn currency_symbols() -> Option<&'static Regex> {
    static SYMBOLS: OnceLock<Option<Regex>> = OnceLock::new();
    SYMBOLS
        .get_or_init(|| Regex::new(r"(?i)rp\.?|[$€£¥\s]").ok())
        .as_ref()
}

// `%Y` accepts short years ("26"); four-digit years only.
fn plausible(date: NaiveDate) -> Option<NaiveDate> {
    (date.year() >= 1000).then_some(date)
}

fn parse_with_date_formats(s: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok().and_then(plausible))
}

fn month_number(word: &str) -> Option<u32> {
    let word = word.trim_end_matches('.').to_lowercase();
    MONTH_NAMES
        .iter()
        .find(|(name, _)| *name == word)
        .map(|(_, n)| *n)
}

fn day_number(word: &str) -> Option<u32> {
    let digits = word
        .trim_end_matches(|c: char| c.is_ascii_alphabetic())
        .trim_end_matches('.');
    digits.parse().ok().filter(|d| (1..=31).contains(d))
}

fn year_number(word: &str) -> Option<i32> {
    if word.len() == 4 && word.chars().all(|c| c.is_ascii_digit()) {
        word.parse().ok()
    } else {
        None
    }
}

/// Last-resort parsing: RFC 3339/2822 timestamps, or a "day month year" /
/// "month day year" run of words anywhere in the text.
fn parse_permissive(s: &str) -> Option<NaiveDate> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.date_naive());
    }

    let cleaned = s.replace([',', '-', '/'], " ");
    let words: Vec<&str> = cleaned.split_whitespace().collect();
    words.windows(3).find_map(|w| {
        let (day, month) = match (day_number(w[0]), month_number(w[1])) {
            (Some(d), Some(m)) => (d, m),
            _ => (day_number(w[1])?, month_number(w[0])?),
        };
        NaiveDate::from_ymd_opt(year_number(w[2])?, month, day)
    })
}

fn days_in_month(year: i32, month: u32) -> Option<u32> {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    Some(NaiveDate::from_ymd_opt(next_year, next_month, 1)?.pred_opt()?.day())
}

/// Date from text that names only some of its parts, the rest taken from
/// `today`: "1 Mar" gets the current year, "March 2026" the current day of
/// month (clamped to the month's length).
pub fn parse_partial_date(raw: &str, today: NaiveDate) -> Option<NaiveDate> {
    let cleaned = raw.replace([',', '-', '/'], " ");
    let words: Vec<&str> = cleaned.split_whitespace().collect();

    let day_month = words.windows(2).find_map(|w| {
        match (day_number(w[0]), month_number(w[1])) {
            (Some(d), Some(m)) => Some((d, m)),
            _ => Some((day_number(w[1])?, month_number(w[0])?)),
        }
    });
    if let Some((day, month)) = day_month {
        return NaiveDate::from_ymd_opt(today.year(), month, day);
    }

    words.windows(2).find_map(|w| {
        let month = month_number(w[0])?;
        let year = year_number(w[1])?;
        let day = today.day().min(days_in_month(year, month)?);
        NaiveDate::from_ymd_opt(year, month, day)
    })
}

/// Date from free text: explicit datetime formats, date-only formats, a
/// date-shaped substring, then permissive parsing.
pub fn parse_date_text(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Some(date) = DATETIME_FORMATS.iter().find_map(|fmt| {
        NaiveDateTime::parse_from_str(s, fmt)
            .ok()
            .and_then(|dt| plausible(dt.date()))
    }) {
        return Some(date);
    }

    if let Some(date) = parse_with_date_formats(s) {
        return Some(date);
    }

    for pattern in embedded_date_patterns() {
        if let Some(m) = pattern.captures(s).and_then(|c| c.get(1)) {
            debug!(value = s, extracted = m.as_str(), "extracted date part");
            if let Some(date) = parse_with_date_formats(m.as_str()) {
                return Some(date);
            }
        }
    }

    parse_permissive(s)
}

/// Date of a cell. Native dates are taken as-is, never re-parsed from text.
pub fn resolve_date(cell: &Cell) -> Option<NaiveDate> {
    match cell {
        Cell::Date(d) => Some(*d),
        Cell::DateTime(dt) => Some(dt.date()),
        Cell::Float(f) => excel_serial_to_datetime(*f).map(|dt| dt.date()),
        Cell::Int(i) => excel_serial_to_datetime(*i as f64).map(|dt| dt.date()),
        Cell::Text(s) => parse_date_text(s),
        Cell::Empty | Cell::Bool(_) => None,
    }
}

/// Parses a formatted amount such as `Rp 50.000`, `1.234,56` or `(12.50)`.
///
/// Periods: several means thousands separators; a single one followed by
/// more than two digits is a thousands separator; otherwise it is the decimal
/// point. Commas are thousands separators unless no decimal point survives and
/// a single comma is followed by one or two digits.
pub fn parse_amount_text(raw: &str) -> Option<Decimal> {
    let s = raw.trim();
    let (negative, s) = match s.strip_prefix('(').and_then(|v| v.strip_suffix(')')) {
        Some(inner) => (true, inner),
        None => (false, s),
    };

    let mut value = match currency_symbols() {
        Some(re) => re.replace_all(s, "").into_owned(),
        None => s.split_whitespace().collect(),
    };

    match value.matches('.').count() {
        0 => {}
        1 => {
            let frac_len = value
                .split('.')
                .nth(1)
                .map(|f| f.chars().count())
                .unwrap_or(0);
            if frac_len > 2 {
                value = value.replace('.', "");
            }
        }
        _ => value = value.replace('.', ""),
    }

    if value.contains(',') {
        let decimal_comma = !value.contains('.')
            && value.matches(',').count() == 1
            && value
                .split(',')
                .nth(1)
                .map_or(false, |f| (1..=2).contains(&f.len()) && f.chars().all(|c| c.is_ascii_digit()));
        value = if decimal_comma {
            value.replace(',', ".")
        } else {
            value.replace(',', "")
        };
    }

    if value.is_empty() {
        return None;
    }
    let amount = Decimal::from_str(&value).ok()?;
    Some(if negative { -amount.abs() } else { amount })
}

pub fn resolve_amount(cell: &Cell) -> Option<Decimal> {
    match cell {
        Cell::Int(i) => Some(Decimal::from(*i)),
        Cell::Float(f) => Decimal::try_from(*f).ok().map(|d| d.normalize()),
        Cell::Text(s) => parse_amount_text(s),
        _ => None,
    }
}

/// Comma-separated when any comma is present, whitespace-separated otherwise.
pub fn parse_tags(raw: &str) -> Vec<String> {
    let raw = raw.trim();
    let parts: Vec<&str> = if raw.contains(',') {
        raw.split(',').collect()
    } else {
        raw.split_whitespace().collect()
    };
    parts
        .into_iter()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// All rule violations of one row, reported as a single message.
#[derive(Debug, Clone, PartialEq)]
pub struct RowValidationError {
    pub row: usize,
    pub problems: Vec<String>,
}

impl fmt::Display for RowValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.problems.join("; "))
    }
}

impl std::error::Error for RowValidationError {}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRow {
    pub row: ParsedRow,
    /// Set when the date was missing or unreadable and today's date was used.
    pub date_warning: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Normalizer {
    default_currency: String,
    today: NaiveDate,
}

impl Normalizer {
    pub fn new(default_currency: &str, today: NaiveDate) -> Self {
        Self {
            default_currency: default_currency.trim().to_uppercase(),
            today,
        }
    }

    pub fn validate(&self, raw: &RawRow) -> Result<ValidatedRow, RowValidationError> {
        let mut problems = Vec::new();

        let (date, date_warning) = match raw.get(Field::Date) {
            None => (
                self.today,
                Some(format!("Row {}: no date given, using {}", raw.row, self.today)),
            ),
            Some(cell) => match resolve_date(cell).or_else(|| match cell {
                Cell::Text(s) => parse_partial_date(s, self.today),
                _ => None,
            }) {
                Some(date) => (date, None),
                None => {
                    warn!(row = raw.row, value = %cell.as_text(), "unparseable date, using today");
                    (
                        self.today,
                        Some(format!(
                            "Row {}: could not parse date '{}', using {}",
                            raw.row,
                            cell.as_text(),
                            self.today
                        )),
                    )
                }
            },
        };

        let amount = match raw.get(Field::Amount) {
            None => {
                problems.push("Amount is required".to_string());
                None
            }
            Some(cell) => {
                let parsed = resolve_amount(cell);
                if parsed.is_none() {
                    problems.push(format!("Invalid amount: {}", cell.as_text()));
                }
                parsed
            }
        };

        let description = raw.text(Field::Description).unwrap_or_default();
        if description.is_empty() {
            problems.push("Description is required".to_string());
        } else if description.chars().count() > MAX_DESCRIPTION_CHARS {
            problems.push(format!(
                "Description too long (max {MAX_DESCRIPTION_CHARS} characters)"
            ));
        }

        let amount = match amount {
            Some(amount) if problems.is_empty() => amount,
            _ => {
                return Err(RowValidationError {
                    row: raw.row,
                    problems,
                })
            }
        };

        let currency = raw
            .text(Field::Currency)
            .map(|c| c.to_uppercase())
            .filter(|c| c.chars().count() == 3)
            .unwrap_or_else(|| self.default_currency.clone());

        Ok(ValidatedRow {
            row: ParsedRow {
                row: raw.row,
                date,
                amount,
                currency,
                description,
                tags: raw.text(Field::Tags).map(|t| parse_tags(&t)).unwrap_or_default(),
                location: raw
                    .text(Field::Location)
                    .map(|l| truncate_chars(&l, MAX_LOCATION_CHARS)),
                notes: raw
                    .text(Field::Notes)
                    .map(|n| truncate_chars(&n, MAX_NOTES_CHARS)),
                category_hint: raw.text(Field::Category),
                source_id: raw.text(Field::Id),
                legacy_category_id: raw.text(Field::CategoryId),
            },
            date_warning,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn normalizer() -> Normalizer {
        Normalizer::new("idr", d(2026, 10, 16))
    }

    #[test]
    fn test_parse_amount_separators() {
        assert_eq!(parse_amount_text("1.000.000"), Some(dec("1000000")));
        assert_eq!(parse_amount_text("1.234,56"), Some(dec("1234.56")));
        assert_eq!(parse_amount_text("1.5"), Some(dec("1.5")));
        assert_eq!(parse_amount_text("Rp 50.000"), Some(dec("50000")));
        assert_eq!(parse_amount_text("1,234.56"), Some(dec("1234.56")));
        assert_eq!(parse_amount_text("50,000"), Some(dec("50000")));
        assert_eq!(parse_amount_text("12,5"), Some(dec("12.5")));
        assert_eq!(parse_amount_text("12.345.678,90"), Some(dec("12345678.90")));
    }

    #[test]
    fn test_parse_amount_symbols_and_signs() {
        assert_eq!(parse_amount_text("$ 12.50"), Some(dec("12.50")));
        assert_eq!(parse_amount_text("€7"), Some(dec("7")));
        assert_eq!(parse_amount_text("Rp. 15.000"), Some(dec("15000")));
        assert_eq!(parse_amount_text("(500.00)"), Some(dec("-500")));
        assert_eq!(parse_amount_text("-42.50"), Some(dec("-42.5")));
        assert_eq!(parse_amount_text("0"), Some(Decimal::ZERO));
    }

    #[test]
    fn test_parse_amount_rejects_garbage() {
        assert_eq!(parse_amount_text("abc"), None);
        assert_eq!(parse_amount_text(""), None);
        assert_eq!(parse_amount_text("Rp"), None);
        assert_eq!(parse_amount_text("12 apples"), None);
    }

    #[test]
    fn test_numeric_cells_used_directly() {
        assert_eq!(resolve_amount(&Cell::Float(50000.0)), Some(dec("50000")));
        assert_eq!(resolve_amount(&Cell::Float(12.25)), Some(dec("12.25")));
        assert_eq!(resolve_amount(&Cell::Int(7)), Some(dec("7")));
        assert_eq!(resolve_amount(&Cell::Bool(true)), None);
    }

    #[test]
    fn test_parse_date_with_time() {
        assert_eq!(parse_date_text("1/1/2026 20:55:47"), Some(d(2026, 1, 1)));
        assert_eq!(parse_date_text("2022-07-09 12.00.00"), Some(d(2022, 7, 9)));
        assert_eq!(parse_date_text("2026/03/05 08:15"), Some(d(2026, 3, 5)));
    }

    #[test]
    fn test_parse_date_only_prefers_month_first() {
        assert_eq!(parse_date_text("2026-01-15"), Some(d(2026, 1, 15)));
        assert_eq!(parse_date_text("1/2/2026"), Some(d(2026, 1, 2)));
        assert_eq!(parse_date_text("25/12/2025"), Some(d(2025, 12, 25)));
        assert_eq!(parse_date_text("25.12.2025"), Some(d(2025, 12, 25)));
        assert_eq!(parse_date_text("3/4/26"), Some(d(2026, 4, 3)));
    }

    #[test]
    fn test_parse_date_extracts_embedded_date() {
        assert_eq!(parse_date_text("paid on 12/25/2025 at the mall"), Some(d(2025, 12, 25)));
        assert_eq!(parse_date_text("ref 2026-2-3 #55"), Some(d(2026, 2, 3)));
    }

    #[test]
    fn test_parse_date_permissive() {
        assert_eq!(parse_date_text("5 Januari 2026"), Some(d(2026, 1, 5)));
        assert_eq!(parse_date_text("March 3rd, 2026"), Some(d(2026, 3, 3)));
        assert_eq!(parse_date_text("Sat, 07 Feb 2026 10:00:00 +0700"), Some(d(2026, 2, 7)));
        assert_eq!(parse_date_text("2026-02-07T10:00:00+07:00"), Some(d(2026, 2, 7)));
        assert_eq!(parse_date_text("17 Agustus 1945"), Some(d(1945, 8, 17)));
    }

    #[test]
    fn test_partial_date_defaults_from_today() {
        let today = d(2026, 10, 16);
        assert_eq!(parse_partial_date("1 Mar", today), Some(d(2026, 3, 1)));
        assert_eq!(parse_partial_date("Mar 1st", today), Some(d(2026, 3, 1)));
        assert_eq!(parse_partial_date("March 2026", today), Some(d(2026, 3, 16)));
        assert_eq!(parse_partial_date("Feb 2026", d(2026, 10, 31)), Some(d(2026, 2, 28)));
        assert_eq!(parse_partial_date("31 Feb", today), None);
        assert_eq!(parse_partial_date("yesterday-ish", today), None);
    }

    #[test]
    fn test_validate_partial_date_is_not_a_warning() {
        let raw = RawRow::new(2)
            .with(Field::Date, Cell::text("5 Mei"))
            .with(Field::Amount, Cell::text("10"))
            .with(Field::Description, Cell::text("Tea"));
        let v = normalizer().validate(&raw).unwrap();
        assert_eq!(v.row.date, d(2026, 5, 5));
        assert_eq!(v.date_warning, None);
    }

    #[test]
    fn test_parse_date_gives_up() {
        assert_eq!(parse_date_text("yesterday-ish"), None);
        assert_eq!(parse_date_text(""), None);
    }

    #[test]
    fn test_native_date_cell_is_exact() {
        let date = d(2026, 3, 1);
        assert_eq!(resolve_date(&Cell::Date(date)), Some(date));
        let dt = date.and_hms_opt(23, 59, 59).unwrap();
        assert_eq!(resolve_date(&Cell::DateTime(dt)), Some(date));
        assert_eq!(resolve_date(&Cell::Float(45667.0)), Some(d(2025, 1, 10)));
    }

    #[test]
    fn test_parse_tags() {
        assert_eq!(parse_tags("work, travel,,  bali "), vec!["work", "travel", "bali"]);
        assert_eq!(parse_tags("work  travel"), vec!["work", "travel"]);
        assert!(parse_tags("   ").is_empty());
    }

    #[test]
    fn test_validate_full_row() {
        let raw = RawRow::new(2)
            .with(Field::Date, Cell::text("1/1/2026 20:55:47"))
            .with(Field::Amount, Cell::text("Rp 50.000"))
            .with(Field::Description, Cell::text("  Lunch at restaurant "))
            .with(Field::Currency, Cell::text("usd"))
            .with(Field::Tags, Cell::text("work lunch"))
            .with(Field::Location, Cell::text(" Jakarta "));
        let v = normalizer().validate(&raw).unwrap();
        assert_eq!(v.row.date, d(2026, 1, 1));
        assert_eq!(v.row.amount, dec("50000"));
        assert_eq!(v.row.currency, "USD");
        assert_eq!(v.row.description, "Lunch at restaurant");
        assert_eq!(v.row.tags, vec!["work", "lunch"]);
        assert_eq!(v.row.location.as_deref(), Some("Jakarta"));
        assert_eq!(v.row.notes, None);
        assert!(v.date_warning.is_none());
    }

    #[test]
    fn test_validate_defaults_bad_currency() {
        let raw = RawRow::new(2)
            .with(Field::Date, Cell::text("2026-01-01"))
            .with(Field::Amount, Cell::Float(10.0))
            .with(Field::Description, Cell::text("Tea"))
            .with(Field::Currency, Cell::text("Rupiah"));
        assert_eq!(normalizer().validate(&raw).unwrap().row.currency, "IDR");
    }

    #[test]
    fn test_validate_unparseable_date_never_rejects() {
        let raw = RawRow::new(7)
            .with(Field::Date, Cell::text("someday"))
            .with(Field::Amount, Cell::text("10"))
            .with(Field::Description, Cell::text("Tea"));
        let v = normalizer().validate(&raw).unwrap();
        assert_eq!(v.row.date, d(2026, 10, 16));
        assert!(v.date_warning.unwrap().starts_with("Row 7:"));
    }

    #[test]
    fn test_validate_collects_every_problem() {
        let raw = RawRow::new(5)
            .with(Field::Date, Cell::text("2026-01-01"))
            .with(Field::Amount, Cell::text("lots"));
        let err = normalizer().validate(&raw).unwrap_err();
        assert_eq!(err.row, 5);
        assert_eq!(err.to_string(), "Invalid amount: lots; Description is required");
    }

    #[test]
    fn test_validate_description_length() {
        let raw = RawRow::new(3)
            .with(Field::Amount, Cell::text("10"))
            .with(Field::Description, Cell::Text("x".repeat(501)));
        let err = normalizer().validate(&raw).unwrap_err();
        assert_eq!(err.to_string(), "Description too long (max 500 characters)");

        let raw = RawRow::new(3)
            .with(Field::Amount, Cell::text("10"))
            .with(Field::Description, Cell::Text("é".repeat(500)));
        assert!(normalizer().validate(&raw).is_ok());
    }

    #[test]
    fn test_validate_caps_notes() {
        let raw = RawRow::new(4)
            .with(Field::Amount, Cell::text("10"))
            .with(Field::Description, Cell::text("Tea"))
            .with(Field::Notes, Cell::Text("catatan ".repeat(300)));
        let v = normalizer().validate(&raw).unwrap();
        assert_eq!(v.row.notes.unwrap().chars().count(), MAX_NOTES_CHARS);
    }

    #[test]
    fn test_validate_caps_location() {
        let raw = RawRow::new(3)
            .with(Field::Amount, Cell::text("10"))
            .with(Field::Description, Cell::text("Tea"))
            .with(Field::Location, Cell::Text("a".repeat(300)));
        let v = normalizer().validate(&raw).unwrap();
        assert_eq!(v.row.location.unwrap().len(), MAX_LOCATION_CHARS);
    }
}
