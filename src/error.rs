use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Unsupported or unreadable file: {0}")]
    Format(String),

    #[error("Missing required columns: {}", .missing.join(", "))]
    Schema { missing: Vec<String> },

    #[error("Data is not loaded yet. Download the route sheets first.")]
    NotLoaded,

    #[error("{0} not found")]
    NotFound(String),

    #[error("No data for {0}")]
    EmptyResult(String),

    #[error("Duplicate {0}")]
    DuplicateKey(String),

    #[error("No downloaded file found after {attempts} attempts")]
    NoFileAvailable { attempts: u32 },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    /// Text shown to the operator. Internal details stay in the log.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Io(_) => "❌ Failed to process the file.".to_string(),
            other => format!("❌ {}", other),
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
