use std::path::PathBuf;

use colored::Colorize;
use comfy_table::{Cell, Table};

use spendsheet::db::SqliteStore;
use spendsheet::error::{Result, SpendsheetError};
use spendsheet::importer::{CommitMode, ImportResult, Importer};
use spendsheet::settings::load_settings;

pub fn run(
    file: &str,
    skip_existing: bool,
    batch_size: Option<usize>,
    currency: Option<String>,
    json: bool,
) -> Result<()> {
    let settings = load_settings();
    let db_path = settings.db_path();
    if !db_path.exists() {
        return Err(SpendsheetError::Settings(format!(
            "No database found at {}\nRun `spendsheet init` to set up.",
            db_path.display()
        )));
    }

    let mut options = settings.import_options();
    options.skip_existing |= skip_existing;
    if let Some(size) = batch_size {
        options.commit_mode = if size <= 1 {
            CommitMode::PerRow
        } else {
            CommitMode::Chunked(size)
        };
    }
    if let Some(code) = currency {
        options.default_currency = code.trim().to_uppercase();
    }

    let mut store = SqliteStore::open(&db_path)?;
    let result = Importer::new(options).import_file(&mut store, &PathBuf::from(file))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_summary(&result);
    }
    Ok(())
}

fn print_summary(result: &ImportResult) {
    let s = &result.summary;
    println!(
        "{} of {} rows imported ({} failed, {} skipped, {} uncategorized)",
        s.imported.to_string().green().bold(),
        s.total_rows,
        s.failed,
        s.skipped,
        s.uncategorized
    );
    if s.categories_imported > 0 {
        println!("{} categories created from the Categories sheet", s.categories_imported);
    }

    if !result.category_matches.is_empty() {
        let mut table = Table::new();
        table.set_header(vec!["Category", "Rows"]);
        for (name, count) in &result.category_matches {
            table.add_row(vec![Cell::new(name), Cell::new(count)]);
        }
        println!("{table}");
    }

    if !result.errors.is_empty() {
        println!("{}", "Errors".red().bold());
        for error in &result.errors {
            println!("  {error}");
        }
    }
    if !result.warnings.is_empty() {
        println!("{}", "Warnings".yellow().bold());
        for warning in &result.warnings {
            println!("  {warning}");
        }
    }
}
