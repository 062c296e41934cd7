use thiserror::Error;

#[derive(Error, Debug)]
pub enum TallyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(String),

    #[error("Unsupported file type: {0} (expected .csv, .xlsx, .xls or .ods)")]
    UnsupportedFile(String),

    #[error("Could not find {role} column '{column}'. Check the column names in the header row.")]
    MissingColumn { role: &'static str, column: String },

    #[error("No {0} column found. Make sure the file has a header such as {1}.")]
    NoColumn(&'static str, &'static str),

    #[error("Invalid configuration:\n  {}", .0.join("\n  "))]
    InvalidConfig(Vec<String>),

    #[error("Unknown category: {0}")]
    UnknownCategory(String),

    #[error("Category '{0}' needs configuration first. Run `tally config set {1}`.")]
    NotConfigured(String, String),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, TallyError>;
