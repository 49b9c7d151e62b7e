// src/utils/error.rs
use thiserror::Error;

/// Raised by the date and currency normalizers. Never fatal: the extractor
/// keeps the raw text as the candidate value and flags it for review.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NormalizationError {
    #[error("Unparseable date: {0}")]
    InvalidDate(String),

    #[error("Date {iso} is later than the processing date (raw: {raw})")]
    FutureDate { raw: String, iso: String },

    #[error("Unparseable amount: {0}")]
    InvalidAmount(String),
}

impl NormalizationError {
    pub fn kind(&self) -> &'static str {
        match self {
            NormalizationError::InvalidDate(_) | NormalizationError::FutureDate { .. } => "invalid-date",
            NormalizationError::InvalidAmount(_) => "invalid-amount",
        }
    }
}

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse document JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Unsupported document input: {0}")]
    Unsupported(String),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Project not found: {0}")]
    ProjectNotFound(String),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error), // Automatically convert IO errors

    #[error("Document loading failed: {0}")]
    Document(#[from] DocumentError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Extraction task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Data processing failed: {0}")]
    Processing(String),
}
