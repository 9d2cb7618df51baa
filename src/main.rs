mod cli;

use clap::Parser;

use cli::{Cli, Commands};
use spendsheet::settings::load_settings;

fn main() {
    let cli = Cli::parse();
    spendsheet::logging::init(&load_settings().log_level);

    let result = match cli.command {
        Commands::Init { data_dir } => cli::init::run(data_dir),
        Commands::Import {
            file,
            skip_existing,
            batch_size,
            currency,
            json,
        } => cli::import::run(&file, skip_existing, batch_size, currency, json),
        Commands::Categories => cli::categories::list(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
