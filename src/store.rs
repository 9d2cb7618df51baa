use uuid::Uuid;

use crate::error::Result;
use crate::models::{Category, Expense, ImportRecord, NewCategory, NewExpense};

/// Storage operations the importer needs. [`crate::db::SqliteStore`] is the
/// shipped implementation; tests substitute in-memory or failing stores.
pub trait ExpenseStore {
    // === Transactions ===

    fn begin(&mut self) -> Result<()>;

    fn commit(&mut self) -> Result<()>;

    fn rollback(&mut self) -> Result<()>;

    // === Expenses ===

    fn create_expense(&mut self, expense: &NewExpense) -> Result<Expense>;

    /// Looks an expense up by its store id or by the identifier it was
    /// imported with.
    fn find_expense(&self, id: &str) -> Result<Option<Expense>>;

    /// Descriptions of up to `limit` expenses in a category, used for
    /// keyword learning.
    fn expense_descriptions(&self, category_id: Uuid, limit: usize) -> Result<Vec<String>>;

    // === Categories ===

    /// Inserts the category unless one with the same name exists. Returns
    /// the stored category and whether it was created.
    fn upsert_category(&mut self, category: &NewCategory) -> Result<(Category, bool)>;

    fn find_category(&self, id: Uuid) -> Result<Option<Category>>;

    /// Case-insensitive lookup.
    fn find_category_by_name(&self, name: &str) -> Result<Option<Category>>;

    fn list_categories(&self) -> Result<Vec<Category>>;

    // === Import log ===

    fn record_import(&mut self, record: &ImportRecord) -> Result<()>;
}
