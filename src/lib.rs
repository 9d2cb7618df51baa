//! Import spreadsheet exports of transactions as categorized expenses.

pub mod bootstrap;
pub mod categorizer;
pub mod columns;
pub mod db;
pub mod error;
pub mod extract;
pub mod importer;
pub mod logging;
pub mod models;
pub mod normalize;
pub mod settings;
pub mod store;
pub mod workbook;

pub use error::{Result, SpendsheetError};
pub use importer::{CommitMode, ImportOptions, ImportResult, Importer};
