use colored::Colorize;
use comfy_table::{Cell, Table};

use spendsheet::db::SqliteStore;
use spendsheet::error::Result;
use spendsheet::settings::load_settings;

pub fn list() -> Result<()> {
    let store = SqliteStore::open(&load_settings().db_path())?;
    let rows = store.category_counts()?;

    let mut table = Table::new();
    table.set_header(vec!["Name", "Icon", "Color", "Default", "Expenses"]);
    for (category, count) in rows {
        table.add_row(vec![
            Cell::new(category.name),
            Cell::new(category.icon.unwrap_or_default()),
            Cell::new(category.color),
            Cell::new(if category.is_default { "yes" } else { "" }),
            Cell::new(count),
        ]);
    }
    println!("Categories\n{table}");

    let uncategorized = store.uncategorized_count()?;
    if uncategorized > 0 {
        println!("{} uncategorized expenses", uncategorized.to_string().yellow());
    }
    Ok(())
}
