use thiserror::Error;

/// Storage layer errors
#[derive(Error, Debug)]
pub enum DbError {
    #[error("Snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Snapshot serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),
}

pub type DbResult<T> = std::result::Result<T, DbError>;
