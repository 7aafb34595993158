use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeskError {
    #[error("Unknown account size '{size_id}'")]
    UnknownAccount { size_id: String },

    #[error("Missing required field '{field}'")]
    MissingField { field: &'static str },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Import service error: {0}")]
    ImportService(String),

    #[error("Import service returned non-JSON response: {raw}")]
    NonJsonResponse { raw: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type DeskResult<T> = Result<T, DeskError>;
