use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpendsheetError {
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Error parsing spreadsheet: {0}")]
    Workbook(String),

    /// The file was readable but its layout could not be understood.
    #[error("{0}")]
    Structural(String),

    #[error("Unknown category: {0}")]
    UnknownCategory(String),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("{0}")]
    Other(String),
}

impl SpendsheetError {
    /// True for failures that abort a whole import run.
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::Workbook(_) | Self::Structural(_) | Self::Csv(_))
    }
}

pub type Result<T> = std::result::Result<T, SpendsheetError>;
