use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum VaultError {
    #[error("Dataset not found: {dataset_id}")]
    DatasetNotFound { dataset_id: Uuid },

    #[error("Person not found: {person_id}")]
    PersonNotFound { person_id: Uuid },

    #[error("Invalid import specification: {message}")]
    InvalidImportSpec { message: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Unsupported file type: {extension}")]
    UnsupportedFileType { extension: String },

    #[error("Primary key violation: {message}")]
    PrimaryKeyViolation { message: String },

    #[error("Query rejected: {message}")]
    QueryRejected { message: String },

    #[error("SQL generation failed: {message}")]
    GenerationFailed { message: String },

    #[error("Storage error: {message}")]
    StorageError { message: String },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("IO error: {message}")]
    IoError { message: String },

    #[error("CSV parse error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Spreadsheet parse error: {0}")]
    SpreadsheetError(#[from] calamine::Error),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),
}

impl From<std::io::Error> for VaultError {
    fn from(err: std::io::Error) -> Self {
        VaultError::IoError {
            message: err.to_string(),
        }
    }
}

impl From<diesel::result::Error> for VaultError {
    fn from(err: diesel::result::Error) -> Self {
        VaultError::StorageError {
            message: format!("Database error: {}", err),
        }
    }
}

impl From<tokio_postgres::Error> for VaultError {
    fn from(err: tokio_postgres::Error) -> Self {
        VaultError::StorageError {
            message: format!("Table store error: {}", err),
        }
    }
}
