use thiserror::Error;

/// Application-level errors (process wiring and Discord transport)
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    ServiceError(#[from] fnf_service::error::ServiceError),

    #[error(transparent)]
    DatabaseError(#[from] fnf_db::error::DbError),

    #[error(transparent)]
    CoreError(#[from] fnf_core::error::CoreError),

    #[error("Discord request failed: {0}")]
    DiscordError(#[from] reqwest::Error),
}

pub type AppResult<T> = std::result::Result<T, AppError>;
