use std::path::Path;
use std::str::FromStr;

use chrono::NaiveDate;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::{Result, SpendsheetError};
use crate::models::{Category, Expense, ImportRecord, NewCategory, NewExpense};
use crate::store::ExpenseStore;

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS categories (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE COLLATE NOCASE,
    icon TEXT,
    color TEXT NOT NULL DEFAULT '#4CAF50',
    is_default INTEGER NOT NULL DEFAULT 0,
    created_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS imports (
    id INTEGER PRIMARY KEY,
    filename TEXT NOT NULL,
    import_date TEXT DEFAULT (datetime('now')),
    total_rows INTEGER,
    imported_count INTEGER,
    failed_count INTEGER,
    skipped_count INTEGER,
    date_range_start TEXT,
    date_range_end TEXT,
    checksum TEXT
);

CREATE TABLE IF NOT EXISTS expenses (
    id TEXT PRIMARY KEY,
    amount TEXT NOT NULL,
    currency TEXT NOT NULL DEFAULT 'IDR',
    description TEXT NOT NULL,
    category_id TEXT,
    date TEXT NOT NULL,
    tags TEXT NOT NULL DEFAULT '[]',
    location TEXT,
    notes TEXT,
    external_id TEXT,
    created_at TEXT DEFAULT (datetime('now')),
    FOREIGN KEY (category_id) REFERENCES categories(id)
);

CREATE INDEX IF NOT EXISTS idx_expenses_external_id ON expenses(external_id);
CREATE INDEX IF NOT EXISTS idx_expenses_category_id ON expenses(category_id);
";

// (name, icon, color)
const DEFAULT_CATEGORIES: &[(&str, &str, &str)] = &[
    ("Food & Dining", "🍽️", "#FF6B6B"),
    ("Transportation", "🚗", "#4ECDC4"),
    ("Shopping", "🛍️", "#FFE66D"),
    ("Bills & Utilities", "💡", "#95E1D3"),
    ("Entertainment", "🎬", "#F38181"),
    ("Healthcare", "🏥", "#AA96DA"),
    ("Education", "📚", "#FCBAD3"),
    ("Personal Care", "💅", "#FFD3A5"),
    ("Travel", "✈️", "#A8E6CF"),
    ("Gifts & Donations", "🎁", "#FFAAA5"),
    ("Subscriptions", "📱", "#FFD93D"),
    ("Other", "📦", "#6C757D"),
];

const CATEGORY_COLUMNS: &str = "id, name, icon, color, is_default";
const EXPENSE_COLUMNS: &str =
    "id, amount, currency, description, category_id, date, tags, location, notes, external_id";

pub fn get_connection(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;

    let count: i64 = conn.query_row("SELECT count(*) FROM categories", [], |row| row.get(0))?;
    if count == 0 {
        for (name, icon, color) in DEFAULT_CATEGORIES {
            conn.execute(
                "INSERT INTO categories (id, name, icon, color, is_default) VALUES (?1, ?2, ?3, ?4, 1)",
                params![Uuid::new_v4().to_string(), name, icon, color],
            )?;
        }
    }
    Ok(())
}

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn uuid_at(row: &Row, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw).map_err(|e| conversion_error(idx, e))
}

fn category_from_row(row: &Row) -> rusqlite::Result<Category> {
    Ok(Category {
        id: uuid_at(row, 0)?,
        name: row.get(1)?,
        icon: row.get(2)?,
        color: row.get(3)?,
        is_default: row.get(4)?,
    })
}

fn expense_from_row(row: &Row) -> rusqlite::Result<Expense> {
    let amount: String = row.get(1)?;
    let category_id: Option<String> = row.get(4)?;
    let date: String = row.get(5)?;
    let tags: String = row.get(6)?;
    Ok(Expense {
        id: uuid_at(row, 0)?,
        amount: Decimal::from_str(&amount).map_err(|e| conversion_error(1, e))?,
        currency: row.get(2)?,
        description: row.get(3)?,
        category_id: category_id
            .map(|id| Uuid::parse_str(&id).map_err(|e| conversion_error(4, e)))
            .transpose()?,
        date: NaiveDate::parse_from_str(&date, "%Y-%m-%d").map_err(|e| conversion_error(5, e))?,
        tags: serde_json::from_str(&tags).map_err(|e| conversion_error(6, e))?,
        location: row.get(7)?,
        notes: row.get(8)?,
        external_id: row.get(9)?,
    })
}

/// [`ExpenseStore`] over a SQLite connection.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Opens (creating if needed) the database at `db_path` and applies the schema.
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = get_connection(db_path)?;
        init_db(&conn)?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Categories in name order with the number of expenses filed under each.
    pub fn category_counts(&self) -> Result<Vec<(Category, i64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT c.id, c.name, c.icon, c.color, c.is_default, count(e.id) \
             FROM categories c LEFT JOIN expenses e ON e.category_id = c.id \
             GROUP BY c.id ORDER BY c.name COLLATE NOCASE",
        )?;
        let rows = stmt
            .query_map([], |row| Ok((category_from_row(row)?, row.get(5)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn uncategorized_count(&self) -> Result<i64> {
        Ok(self.conn.query_row(
            "SELECT count(*) FROM expenses WHERE category_id IS NULL",
            [],
            |r| r.get(0),
        )?)
    }
}

impl ExpenseStore for SqliteStore {
    fn begin(&mut self) -> Result<()> {
        self.conn.execute_batch("BEGIN")?;
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("ROLLBACK")?;
        }
        Ok(())
    }

    fn create_expense(&mut self, expense: &NewExpense) -> Result<Expense> {
        let id = Uuid::new_v4();
        let tags = serde_json::to_string(&expense.tags)?;
        self.conn.execute(
            &format!("INSERT INTO expenses ({EXPENSE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"),
            params![
                id.to_string(),
                expense.amount.to_string(),
                expense.currency,
                expense.description,
                expense.category_id.map(|c| c.to_string()),
                expense.date.format("%Y-%m-%d").to_string(),
                tags,
                expense.location,
                expense.notes,
                expense.external_id,
            ],
        )?;
        Ok(Expense {
            id,
            amount: expense.amount,
            currency: expense.currency.clone(),
            description: expense.description.clone(),
            category_id: expense.category_id,
            date: expense.date,
            tags: expense.tags.clone(),
            location: expense.location.clone(),
            notes: expense.notes.clone(),
            external_id: expense.external_id.clone(),
        })
    }

    fn find_expense(&self, id: &str) -> Result<Option<Expense>> {
        let expense = self
            .conn
            .query_row(
                &format!("SELECT {EXPENSE_COLUMNS} FROM expenses WHERE id = ?1 OR external_id = ?1 LIMIT 1"),
                [id],
                expense_from_row,
            )
            .optional()?;
        Ok(expense)
    }

    fn expense_descriptions(&self, category_id: Uuid, limit: usize) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT description FROM expenses WHERE category_id = ?1 ORDER BY created_at DESC, rowid DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![category_id.to_string(), limit as i64], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(rows)
    }

    fn upsert_category(&mut self, category: &NewCategory) -> Result<(Category, bool)> {
        let inserted = self.conn.execute(
            "INSERT INTO categories (id, name, icon, color, is_default) VALUES (?1, ?2, ?3, ?4, ?5) \
             ON CONFLICT(name) DO NOTHING",
            params![
                Uuid::new_v4().to_string(),
                category.name,
                category.icon,
                category.color,
                category.is_default,
            ],
        )?;
        let stored = self.find_category_by_name(&category.name)?.ok_or_else(|| {
            SpendsheetError::UnknownCategory(category.name.clone())
        })?;
        Ok((stored, inserted == 1))
    }

    fn find_category(&self, id: Uuid) -> Result<Option<Category>> {
        let category = self
            .conn
            .query_row(
                &format!("SELECT {CATEGORY_COLUMNS} FROM categories WHERE id = ?1"),
                [id.to_string()],
                category_from_row,
            )
            .optional()?;
        Ok(category)
    }

    fn find_category_by_name(&self, name: &str) -> Result<Option<Category>> {
        let category = self
            .conn
            .query_row(
                &format!("SELECT {CATEGORY_COLUMNS} FROM categories WHERE name = ?1 COLLATE NOCASE"),
                [name.trim()],
                category_from_row,
            )
            .optional()?;
        Ok(category)
    }

    fn list_categories(&self) -> Result<Vec<Category>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM categories ORDER BY name COLLATE NOCASE"
        ))?;
        let rows = stmt
            .query_map([], category_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn record_import(&mut self, record: &ImportRecord) -> Result<()> {
        let (start, end) = match record.date_range {
            Some((start, end)) => (
                Some(start.format("%Y-%m-%d").to_string()),
                Some(end.format("%Y-%m-%d").to_string()),
            ),
            None => (None, None),
        };
        self.conn.execute(
            "INSERT INTO imports (filename, total_rows, imported_count, failed_count, skipped_count, \
             date_range_start, date_range_end, checksum) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.filename,
                record.total_rows as i64,
                record.imported as i64,
                record.failed as i64,
                record.skipped as i64,
                start,
                end,
                record.checksum,
            ],
        )?;
        Ok(())
    }
}
