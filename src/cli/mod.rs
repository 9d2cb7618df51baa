pub mod categories;
pub mod import;
pub mod init;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "spendsheet",
    version,
    about = "Import spreadsheet exports of transactions as categorized expenses."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Choose a data directory and initialize the database.
    Init {
        /// Path for spendsheet data (default: ~/Documents/spendsheet)
        #[arg(long = "data-dir")]
        data_dir: Option<String>,
    },
    /// Import an XLSX/XLS/ODS/CSV file of transactions.
    Import {
        /// Path to the spreadsheet to import
        file: String,
        /// Skip rows whose id already exists in the database
        #[arg(long)]
        skip_existing: bool,
        /// Rows per database transaction (1 = commit each row)
        #[arg(long)]
        batch_size: Option<usize>,
        /// Currency for rows without a valid currency code
        #[arg(long)]
        currency: Option<String>,
        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },
    /// List categories with their expense counts.
    Categories,
}
