use thiserror::Error;

#[derive(Error, Debug)]
pub enum MergeError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Record '{mmsi}' failed validation: {field} {reason}")]
    Validation {
        mmsi: String,
        field: &'static str,
        reason: String,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type MergeResult<T> = Result<T, MergeError>;
