use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::error::{Result, SpendsheetError};

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

static EMPTY: Cell = Cell::Empty;

impl Cell {
    pub fn text(s: &str) -> Self {
        Cell::Text(s.to_string())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Display form of the cell, trimmed. Integral floats lose their `.0`.
    pub fn as_text(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Text(s) => s.trim().to_string(),
            Cell::Int(i) => i.to_string(),
            Cell::Float(f) => {
                if f.fract() == 0.0 && f.abs() < 1e15 {
                    format!("{}", *f as i64)
                } else {
                    f.to_string()
                }
            }
            Cell::Bool(b) => b.to_string(),
            Cell::Date(d) => d.format("%Y-%m-%d").to_string(),
            Cell::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Sheet {
    pub name: String,
    rows: Vec<Vec<Cell>>,
}

impl Sheet {
    pub fn new(name: &str, rows: Vec<Vec<Cell>>) -> Self {
        Self {
            name: name.to_string(),
            rows,
        }
    }

    /// Builds a sheet where every non-blank value is a text cell.
    pub fn from_text_rows(name: &str, rows: &[&[&str]]) -> Self {
        let rows = rows
            .iter()
            .map(|r| {
                r.iter()
                    .map(|v| if v.is_empty() { Cell::Empty } else { Cell::text(v) })
                    .collect()
            })
            .collect();
        Self::new(name, rows)
    }

    /// Number of rows, including blank trailing ones.
    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn row(&self, idx: usize) -> &[Cell] {
        self.rows.get(idx).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn cell(&self, row: usize, col: usize) -> &Cell {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&EMPTY)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Workbook {
    sheets: Vec<Sheet>,
}

impl Workbook {
    pub fn from_sheets(sheets: Vec<Sheet>) -> Self {
        Self { sheets }
    }

    /// Opens a file from disk, choosing the reader by extension.
    pub fn open(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::load(path, &bytes)
    }

    /// Parses `bytes` already read from `path`; the path only picks the reader.
    pub fn load(path: &Path, bytes: &[u8]) -> Result<Self> {
        let is_csv = path
            .extension()
            .map_or(false, |e| e.eq_ignore_ascii_case("csv"));
        if is_csv {
            let name = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("Sheet1");
            Self::from_csv_bytes(name, bytes)
        } else {
            Self::from_bytes(bytes)
        }
    }

    /// Parses binary spreadsheet content (xlsx, xlsm, xlsb, xls, ods).
    #[cfg(feature = "xlsx")]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        use calamine::{open_workbook_auto_from_rs, Reader};

        let cursor = std::io::Cursor::new(bytes.to_vec());
        let mut workbook = open_workbook_auto_from_rs(cursor)
            .map_err(|e| SpendsheetError::Workbook(e.to_string()))?;

        let mut sheets = Vec::new();
        for name in workbook.sheet_names().to_vec() {
            let range = workbook
                .worksheet_range(&name)
                .map_err(|e| SpendsheetError::Workbook(format!("sheet '{name}': {e}")))?;
            // Ranges start at the first used cell; pad so indices match the sheet.
            let (row_offset, col_offset) = range
                .start()
                .map(|(r, c)| (r as usize, c as usize))
                .unwrap_or((0, 0));
            let mut rows: Vec<Vec<Cell>> = vec![Vec::new(); row_offset];
            for data_row in range.rows() {
                let mut row = vec![Cell::Empty; col_offset];
                row.extend(data_row.iter().map(cell_from_calamine));
                rows.push(row);
            }
            sheets.push(Sheet::new(&name, rows));
        }
        Ok(Self { sheets })
    }

    #[cfg(not(feature = "xlsx"))]
    pub fn from_bytes(_bytes: &[u8]) -> Result<Self> {
        Err(SpendsheetError::Workbook(
            "spreadsheet support not compiled in (enable the `xlsx` feature)".to_string(),
        ))
    }

    /// Parses CSV content. Invalid UTF-8 inside a field is replaced with
    /// U+FFFD rather than failing the file.
    pub fn from_csv_bytes(sheet_name: &str, bytes: &[u8]) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(bytes);
        let mut rows = Vec::new();
        for record in rdr.byte_records() {
            let record = record?;
            rows.push(
                record
                    .iter()
                    .map(|raw| {
                        let v = String::from_utf8_lossy(raw);
                        if v.trim().is_empty() {
                            Cell::Empty
                        } else {
                            Cell::text(&v)
                        }
                    })
                    .collect(),
            );
        }
        Ok(Self {
            sheets: vec![Sheet::new(sheet_name, rows)],
        })
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn sheets(&self) -> &[Sheet] {
        &self.sheets
    }

    pub fn first(&self) -> Option<&Sheet> {
        self.sheets.first()
    }

    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name == name)
    }
}

/// Converts an Excel serial (1900 date system) to a date and time.
pub fn excel_serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    // Serial 2958465 is 9999-12-31.
    if !(serial > 0.0 && serial < 2_958_466.0) {
        return None;
    }
    // Excel epoch is 1899-12-30 (accounting for the 1900 leap year bug)
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let millis = (serial * 86_400_000.0).round() as i64;
    base.checked_add_signed(chrono::Duration::milliseconds(millis))
}

#[cfg(feature = "xlsx")]
fn cell_from_calamine(data: &calamine::Data) -> Cell {
    use calamine::Data;

    match data {
        Data::Empty | Data::Error(_) => Cell::Empty,
        Data::String(s) => Cell::Text(s.clone()),
        Data::Int(i) => Cell::Int(*i),
        Data::Float(f) => Cell::Float(*f),
        Data::Bool(b) => Cell::Bool(*b),
        Data::DateTime(dt) if dt.is_duration() => Cell::Float(dt.as_f64()),
        // as_datetime honours the workbook's 1904 date system.
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(value) if value.time() == NaiveTime::MIN => Cell::Date(value.date()),
            Some(value) => Cell::DateTime(value),
            None => Cell::Float(dt.as_f64()),
        },
        Data::DateTimeIso(s) => NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
            .map(Cell::DateTime)
            .or_else(|_| NaiveDate::parse_from_str(s, "%Y-%m-%d").map(Cell::Date))
            .unwrap_or_else(|_| Cell::Text(s.clone())),
        Data::DurationIso(s) => Cell::Text(s.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_excel_serial_to_datetime() {
        let dt = excel_serial_to_datetime(45667.0).unwrap();
        assert_eq!(dt.date(), NaiveDate::from_ymd_opt(2025, 1, 10).unwrap());
        let dt = excel_serial_to_datetime(46023.5).unwrap();
        assert_eq!(dt.format("%Y-%m-%d %H:%M").to_string(), "2026-01-01 12:00");
    }

    #[test]
    fn test_excel_serial_out_of_range() {
        assert_eq!(excel_serial_to_datetime(0.0), None);
        assert_eq!(excel_serial_to_datetime(-3.0), None);
        assert_eq!(excel_serial_to_datetime(1e9), None);
    }

    #[test]
    fn test_cell_as_text() {
        assert_eq!(Cell::Float(50000.0).as_text(), "50000");
        assert_eq!(Cell::Float(12.5).as_text(), "12.5");
        assert_eq!(Cell::text("  Lunch ").as_text(), "Lunch");
        assert!(Cell::text("   ").is_empty());
        assert!(!Cell::Int(0).is_empty());
    }

    #[test]
    fn test_csv_bytes_keep_blank_cells_empty() {
        let wb = Workbook::from_csv_bytes("Sheet1", b"Date,Amount,Description\n2026-01-01,,Lunch\n").unwrap();
        let sheet = wb.first().unwrap();
        assert_eq!(sheet.height(), 2);
        assert_eq!(sheet.cell(1, 1), &Cell::Empty);
        assert_eq!(sheet.cell(1, 2), &Cell::text("Lunch"));
        assert_eq!(sheet.cell(9, 9), &Cell::Empty);
    }

    #[test]
    fn test_open_dispatches_csv_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("expenses.csv");
        std::fs::write(&path, "Date,Amount\n").unwrap();
        let wb = Workbook::open(&path).unwrap();
        assert_eq!(wb.sheet_names(), vec!["expenses"]);
    }

    #[test]
    fn test_garbage_bytes_are_a_workbook_error() {
        let err = Workbook::from_bytes(b"definitely not a spreadsheet").unwrap_err();
        assert!(err.is_structural());
    }

    #[cfg(feature = "xlsx")]
    #[test]
    fn test_xlsx_native_date_cell() {
        use rust_xlsxwriter::{ExcelDateTime, Format, Workbook as XlsxWorkbook};

        let mut book = XlsxWorkbook::new();
        let sheet = book.add_worksheet();
        let date_format = Format::new().set_num_format("yyyy-mm-dd");
        sheet.write_string(0, 0, "Date").unwrap();
        sheet.write_string(0, 1, "Amount").unwrap();
        let date = ExcelDateTime::from_ymd(2026, 3, 1).unwrap();
        sheet.write_datetime_with_format(1, 0, &date, &date_format).unwrap();
        sheet.write_number(1, 1, 125.5).unwrap();
        let bytes = book.save_to_buffer().unwrap();

        let wb = Workbook::from_bytes(&bytes).unwrap();
        let sheet = wb.first().unwrap();
        assert_eq!(sheet.cell(0, 0), &Cell::text("Date"));
        assert_eq!(
            sheet.cell(1, 0),
            &Cell::Date(NaiveDate::from_ymd_opt(2026, 3, 1).unwrap())
        );
        assert_eq!(sheet.cell(1, 1), &Cell::Float(125.5));
    }

    #[test]
    fn test_csv_bytes_with_invalid_utf8_keep_every_row() {
        let bytes = b"Date,Amount,Description\n2026-01-01,10000,Caf\xE9\n2026-01-02,5000,Tea\n";
        let wb = Workbook::from_csv_bytes("Sheet1", bytes).unwrap();
        let sheet = wb.first().unwrap();
        assert_eq!(sheet.height(), 3);
        assert_eq!(sheet.cell(1, 2), &Cell::text("Caf\u{FFFD}"));
        assert_eq!(sheet.cell(2, 2), &Cell::text("Tea"));
    }

    /// Rewrites `xl/workbook.xml` inside an xlsx so it uses the 1904 date system.
    #[cfg(feature = "xlsx")]
    fn with_date1904(bytes: &[u8]) -> Vec<u8> {
        use std::io::{Cursor, Read, Write};
        use zip::write::SimpleFileOptions;

        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i).unwrap();
            let name = entry.name().to_string();
            let mut content = Vec::new();
            entry.read_to_end(&mut content).unwrap();
            if name == "xl/workbook.xml" {
                let xml = String::from_utf8(content).unwrap();
                content = xml
                    .replacen("<workbookPr ", "<workbookPr date1904=\"1\" ", 1)
                    .into_bytes();
            }
            writer.start_file(name, SimpleFileOptions::default()).unwrap();
            writer.write_all(&content).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[cfg(feature = "xlsx")]
    #[test]
    fn test_xlsx_1904_date_system() {
        use rust_xlsxwriter::{Format, Workbook as XlsxWorkbook};

        let mut book = XlsxWorkbook::new();
        let sheet = book.add_worksheet();
        let date_format = Format::new().set_num_format("yyyy-mm-dd");
        let datetime_format = Format::new().set_num_format("yyyy-mm-dd hh:mm");
        sheet.write_string(0, 0, "Date").unwrap();
        sheet.write_number_with_format(1, 0, 45351.0, &date_format).unwrap();
        sheet.write_number_with_format(2, 0, 45351.5, &datetime_format).unwrap();
        let bytes = with_date1904(&book.save_to_buffer().unwrap());

        let wb = Workbook::from_bytes(&bytes).unwrap();
        let sheet = wb.first().unwrap();
        assert_eq!(
            sheet.cell(1, 0),
            &Cell::Date(NaiveDate::from_ymd_opt(2028, 3, 1).unwrap())
        );
        assert_eq!(
            sheet.cell(2, 0),
            &Cell::DateTime(
                NaiveDate::from_ymd_opt(2028, 3, 1)
                    .unwrap()
                    .and_hms_opt(12, 0, 0)
                    .unwrap()
            )
        );
    }
}
