use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::columns::DEFAULT_HEADER_SCAN_ROWS;
use crate::error::{Result, SpendsheetError};
use crate::importer::{CommitMode, ImportOptions, DEFAULT_BATCH_SIZE};
use crate::normalize::DEFAULT_CURRENCY;

pub const DB_FILE: &str = "spendsheet.db";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_data_dir_string")]
    pub data_dir: String,
    #[serde(default = "default_currency")]
    pub default_currency: String,
    #[serde(default = "default_header_scan_rows")]
    pub header_scan_rows: usize,
    /// Rows per transaction; 0 or 1 commits every row on its own.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub skip_existing: bool,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

fn default_header_scan_rows() -> usize {
    DEFAULT_HEADER_SCAN_ROWS
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_data_dir_string() -> String {
    default_data_dir().to_string_lossy().to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir_string(),
            default_currency: default_currency(),
            header_scan_rows: default_header_scan_rows(),
            batch_size: default_batch_size(),
            skip_existing: false,
            log_level: default_log_level(),
        }
    }
}

impl Settings {
    pub fn db_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join(DB_FILE)
    }

    pub fn commit_mode(&self) -> CommitMode {
        if self.batch_size <= 1 {
            CommitMode::PerRow
        } else {
            CommitMode::Chunked(self.batch_size)
        }
    }

    pub fn import_options(&self) -> ImportOptions {
        ImportOptions {
            skip_existing: self.skip_existing,
            commit_mode: self.commit_mode(),
            default_currency: self.default_currency.clone(),
            header_scan_rows: self.header_scan_rows,
            ..ImportOptions::default()
        }
    }
}

fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("spendsheet")
}

fn settings_path() -> PathBuf {
    config_dir().join("settings.json")
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Documents")
        .join("spendsheet")
}

pub fn load_settings() -> Settings {
    let path = settings_path();
    if path.exists() {
        let content = std::fs::read_to_string(&path).unwrap_or_default();
        serde_json::from_str(&content).unwrap_or_default()
    } else {
        Settings::default()
    }
}

pub fn save_settings(settings: &Settings) -> Result<()> {
    let dir = config_dir();
    std::fs::create_dir_all(&dir)?;
    let json = serde_json::to_string_pretty(settings)
        .map_err(|e| SpendsheetError::Settings(e.to_string()))?;
    std::fs::write(settings_path(), format!("{json}\n"))?;
    Ok(())
}

pub fn shellexpand_path(path: &str) -> String {
    if path.starts_with('~') {
        if let Some(home) = dirs::home_dir() {
            return path.replacen('~', &home.to_string_lossy(), 1);
        }
    }
    std::fs::canonicalize(path)
        .unwrap_or_else(|_| PathBuf::from(path))
        .to_string_lossy()
        .to_string()
}
