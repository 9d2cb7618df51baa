use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::bootstrap::{bootstrap_categories, LegacyIdMap, CATEGORIES_SHEET};
use crate::categorizer::{Classifier, Lexicon};
use crate::columns::{AliasTable, ColumnDetector, DEFAULT_HEADER_SCAN_ROWS};
use crate::error::{Result, SpendsheetError};
use crate::extract::extract_row;
use crate::models::{ImportRecord, ParsedRow};
use crate::normalize::{Normalizer, DEFAULT_CURRENCY};
use crate::store::ExpenseStore;
use crate::workbook::{Sheet, Workbook};

pub const DEFAULT_BATCH_SIZE: usize = 200;
/// Failed rows echoed back with their raw data.
pub const MAX_FAILED_ROW_SAMPLES: usize = 10;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// How inserts are grouped into store transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitMode {
    /// One transaction per row.
    PerRow,
    /// One transaction per chunk of this many rows.
    Chunked(usize),
}

impl Default for CommitMode {
    fn default() -> Self {
        Self::Chunked(DEFAULT_BATCH_SIZE)
    }
}

#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Skip rows whose id is already known to the store.
    pub skip_existing: bool,
    pub commit_mode: CommitMode,
    pub default_currency: String,
    pub header_scan_rows: usize,
    /// Date used for rows without a readable date.
    pub today: NaiveDate,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            skip_existing: false,
            commit_mode: CommitMode::default(),
            default_currency: DEFAULT_CURRENCY.to_string(),
            header_scan_rows: DEFAULT_HEADER_SCAN_ROWS,
            today: chrono::Local::now().date_naive(),
        }
    }
}

// ---------------------------------------------------------------------------
// Result
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportSummary {
    pub total_rows: usize,
    pub imported: usize,
    pub failed: usize,
    pub uncategorized: usize,
    pub skipped: usize,
    pub categories_imported: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedRow {
    pub row: usize,
    pub error: String,
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportResult {
    pub success: bool,
    pub summary: ImportSummary,
    /// Category name → rows imported into it.
    pub category_matches: BTreeMap<String, usize>,
    pub errors: Vec<String>,
    pub failed_rows: Vec<FailedRow>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

// ---------------------------------------------------------------------------
// Run state
// ---------------------------------------------------------------------------

/// A validated row waiting to be written.
struct PendingRow {
    row: ParsedRow,
    category: Option<(Uuid, String)>,
    data: serde_json::Value,
}

#[derive(Default)]
struct Tally {
    imported: usize,
    uncategorized: usize,
    matches: BTreeMap<String, usize>,
    dates: Option<(NaiveDate, NaiveDate)>,
}

impl Tally {
    fn count(&mut self, pending: &PendingRow) {
        self.imported += 1;
        match &pending.category {
            Some((_, name)) => *self.matches.entry(name.clone()).or_default() += 1,
            None => self.uncategorized += 1,
        }
        let date = pending.row.date;
        self.dates = Some(match self.dates {
            Some((start, end)) => (start.min(date), end.max(date)),
            None => (date, date),
        });
    }

    fn merge(&mut self, other: Tally) {
        self.imported += other.imported;
        self.uncategorized += other.uncategorized;
        for (name, n) in other.matches {
            *self.matches.entry(name).or_default() += n;
        }
        if let Some((start, end)) = other.dates {
            self.dates = Some(match self.dates {
                Some((s, e)) => (s.min(start), e.max(end)),
                None => (start, end),
            });
        }
    }
}

#[derive(Default)]
struct Failures {
    validation: Vec<String>,
    persistence: Vec<String>,
    samples: Vec<FailedRow>,
    count: usize,
}

impl Failures {
    fn validation(&mut self, row: usize, error: String, data: serde_json::Value) {
        self.validation.push(format!("Row {row}: {error}"));
        self.sample(row, error, data);
    }

    fn persistence(&mut self, row: usize, error: String, data: serde_json::Value) {
        self.persistence.push(format!("Row {row}: {error}"));
        self.sample(row, error, data);
    }

    fn sample(&mut self, row: usize, error: String, data: serde_json::Value) {
        self.count += 1;
        if self.samples.len() < MAX_FAILED_ROW_SAMPLES {
            self.samples.push(FailedRow { row, error, data });
        }
    }
}

fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// The sheet holding transactions: the first one that is not the category list.
fn transactions_sheet(workbook: &Workbook) -> Result<&Sheet> {
    workbook
        .sheets()
        .iter()
        .find(|s| s.name != CATEGORIES_SHEET)
        .ok_or_else(|| {
            SpendsheetError::Structural("The file contains no expense worksheet".to_string())
        })
}

// ---------------------------------------------------------------------------
// Importer
// ---------------------------------------------------------------------------

pub struct Importer {
    options: ImportOptions,
    aliases: AliasTable,
    lexicon: Lexicon,
}

impl Importer {
    pub fn new(options: ImportOptions) -> Self {
        Self {
            options,
            aliases: AliasTable::default(),
            lexicon: Lexicon::default(),
        }
    }

    pub fn with_aliases(mut self, aliases: AliasTable) -> Self {
        self.aliases = aliases;
        self
    }

    pub fn with_lexicon(mut self, lexicon: Lexicon) -> Self {
        self.lexicon = lexicon;
        self
    }

    /// Reads, imports and logs a file from disk.
    pub fn import_file<S: ExpenseStore + ?Sized>(&self, store: &mut S, path: &Path) -> Result<ImportResult> {
        let bytes = std::fs::read(path)?;
        let workbook = Workbook::load(path, &bytes)?;
        let (mut result, date_range) = self.run(store, &workbook)?;

        let record = ImportRecord {
            filename: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            checksum: compute_checksum(&bytes),
            total_rows: result.summary.total_rows,
            imported: result.summary.imported,
            failed: result.summary.failed,
            skipped: result.summary.skipped,
            date_range,
        };
        if let Err(e) = store.record_import(&record) {
            warn!(error = %e, "could not record import");
            result.warnings.push(format!("Import log not written: {e}"));
        }
        Ok(result)
    }

    /// Runs the full pipeline over an in-memory workbook.
    ///
    /// Returns `Err` only when the workbook cannot be interpreted at all; row
    /// problems are reported in the result.
    pub fn import_workbook<S: ExpenseStore + ?Sized>(
        &self,
        store: &mut S,
        workbook: &Workbook,
    ) -> Result<ImportResult> {
        self.run(store, workbook).map(|(result, _)| result)
    }

    /// Import plus the date span of the rows written.
    fn run<S: ExpenseStore + ?Sized>(
        &self,
        store: &mut S,
        workbook: &Workbook,
    ) -> Result<(ImportResult, Option<(NaiveDate, NaiveDate)>)> {
        let sheet = transactions_sheet(workbook)?;
        info!(sheet = %sheet.name, rows = sheet.height(), "starting import");

        let mut result = ImportResult::default();

        let legacy_ids = match workbook.sheet(CATEGORIES_SHEET) {
            Some(categories) => {
                let outcome = bootstrap_categories(&mut *store, categories);
                result.summary.categories_imported = outcome.created;
                result.warnings.extend(outcome.warnings);
                outcome.legacy_ids
            }
            None => LegacyIdMap::default(),
        };

        let detector = ColumnDetector::new(self.aliases.clone(), self.options.header_scan_rows);
        let columns = detector.detect(sheet)?;
        let classifier = Classifier::build(&*store, self.lexicon.clone())?;
        let normalizer = Normalizer::new(&self.options.default_currency, self.options.today);

        let mut failures = Failures::default();
        let mut pending = Vec::new();
        let mut seen_ids = BTreeSet::new();

        for row_idx in columns.header_row() + 1..sheet.height() {
            let Some(raw) = extract_row(sheet, &columns, row_idx) else {
                continue;
            };
            result.summary.total_rows += 1;

            let validated = match normalizer.validate(&raw) {
                Ok(v) => v,
                Err(e) => {
                    warn!(row = raw.row, error = %e, "row rejected");
                    failures.validation(raw.row, e.to_string(), raw.to_json());
                    continue;
                }
            };
            if let Some(warning) = validated.date_warning {
                result.warnings.push(warning);
            }
            let row = validated.row;

            if row.amount <= Decimal::ZERO {
                debug!(row = row.row, amount = %row.amount, "skipping non-positive amount");
                result.summary.skipped += 1;
                continue;
            }

            if self.options.skip_existing {
                if let Some(source_id) = &row.source_id {
                    let known = match store.find_expense(source_id) {
                        Ok(found) => found.is_some(),
                        Err(e) => {
                            failures.persistence(row.row, e.to_string(), raw.to_json());
                            continue;
                        }
                    };
                    if known || !seen_ids.insert(source_id.clone()) {
                        debug!(row = row.row, id = %source_id, "skipping existing expense");
                        result.summary.skipped += 1;
                        continue;
                    }
                }
            }

            let category = self
                .resolve_legacy_category(&*store, &classifier, &legacy_ids, &row)
                .or_else(|| {
                    classifier
                        .classify(row.category_hint.as_deref(), &row.description)
                        .map(|c| c.id)
                })
                .and_then(|id| classifier.get(id))
                .map(|c| (c.id, c.name.clone()));

            pending.push(PendingRow {
                row,
                category,
                data: raw.to_json(),
            });
        }

        let tally = match self.options.commit_mode {
            CommitMode::PerRow => persist_per_row(store, pending, &mut failures),
            CommitMode::Chunked(size) => persist_chunked(store, pending, size.max(1), &mut failures),
        };

        result.success = true;
        result.summary.imported = tally.imported;
        result.summary.uncategorized = tally.uncategorized;
        result.summary.failed = failures.count;
        result.category_matches = tally.matches;
        result.errors = failures.validation;
        result.errors.extend(failures.persistence);
        result.failed_rows = failures.samples;

        info!(
            total = result.summary.total_rows,
            imported = result.summary.imported,
            failed = result.summary.failed,
            skipped = result.summary.skipped,
            uncategorized = result.summary.uncategorized,
            "import complete"
        );
        Ok((result, tally.dates))
    }

    /// Category carried by the row itself: an explicit legacy id, or the
    /// category of the stored expense the row's id points at.
    fn resolve_legacy_category<S: ExpenseStore + ?Sized>(
        &self,
        store: &S,
        classifier: &Classifier,
        legacy_ids: &LegacyIdMap,
        row: &ParsedRow,
    ) -> Option<Uuid> {
        let reference = row.legacy_category_id.clone().or_else(|| {
            let source_id = row.source_id.as_deref()?;
            match store.find_expense(source_id) {
                Ok(found) => found?.category_id.map(|id| id.to_string()),
                Err(e) => {
                    warn!(row = row.row, error = %e, "could not look up referenced expense");
                    None
                }
            }
        })?;

        legacy_ids.get(&reference).or_else(|| {
            Uuid::parse_str(reference.trim())
                .ok()
                .filter(|id| classifier.get(*id).is_some())
        })
    }
}

fn persist_per_row<S: ExpenseStore + ?Sized>(
    store: &mut S,
    pending: Vec<PendingRow>,
    failures: &mut Failures,
) -> Tally {
    let mut tally = Tally::default();
    for item in pending {
        let outcome = store.begin().and_then(|_| {
            let expense = item.row.clone().into_new_expense(item.category.as_ref().map(|(id, _)| *id));
            store.create_expense(&expense)?;
            store.commit()
        });
        match outcome {
            Ok(()) => tally.count(&item),
            Err(e) => {
                warn!(row = item.row.row, error = %e, "could not save row");
                let _ = store.rollback();
                failures.persistence(item.row.row, e.to_string(), item.data);
            }
        }
    }
    tally
}

fn persist_chunked<S: ExpenseStore + ?Sized>(
    store: &mut S,
    pending: Vec<PendingRow>,
    chunk_size: usize,
    failures: &mut Failures,
) -> Tally {
    let mut tally = Tally::default();
    let mut rows = pending.into_iter().peekable();

    while rows.peek().is_some() {
        let chunk: Vec<PendingRow> = rows.by_ref().take(chunk_size).collect();

        if let Err(e) = store.begin() {
            warn!(error = %e, rows = chunk.len(), "could not start chunk");
            for item in chunk {
                failures.persistence(item.row.row, e.to_string(), item.data);
            }
            continue;
        }

        let mut written = Vec::new();
        for item in chunk {
            let expense = item
                .row
                .clone()
                .into_new_expense(item.category.as_ref().map(|(id, _)| *id));
            match store.create_expense(&expense) {
                Ok(_) => written.push(item),
                Err(e) => {
                    warn!(row = item.row.row, error = %e, "could not save row");
                    failures.persistence(item.row.row, e.to_string(), item.data);
                }
            }
        }

        match store.commit() {
            Ok(()) => {
                let mut local = Tally::default();
                for item in &written {
                    local.count(item);
                }
                tally.merge(local);
            }
            Err(e) => {
                warn!(error = %e, rows = written.len(), "chunk commit failed");
                let _ = store.rollback();
                for item in written {
                    failures.persistence(item.row.row, format!("Batch commit failed: {e}"), item.data);
                }
            }
        }
    }
    tally
}
