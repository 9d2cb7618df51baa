use std::path::PathBuf;

use spendsheet::db::SqliteStore;
use spendsheet::error::Result;
use spendsheet::settings::{load_settings, save_settings, shellexpand_path};
use spendsheet::store::ExpenseStore;

pub fn run(data_dir: Option<String>) -> Result<()> {
    let mut settings = load_settings();
    if let Some(dir) = data_dir {
        settings.data_dir = shellexpand_path(&dir);
    }
    let dir = PathBuf::from(&settings.data_dir);
    std::fs::create_dir_all(&dir)?;

    let store = SqliteStore::open(&settings.db_path())?;
    save_settings(&settings)?;

    let categories = store.list_categories()?.len();
    println!("Initialized spendsheet in {}", dir.display());
    println!("{categories} categories ready.");
    Ok(())
}
