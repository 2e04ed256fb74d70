use thiserror::Error;

/// Service layer errors - combines all error types
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    DatabaseError(#[from] fnf_db::error::DbError),

    #[error("Invalid schedule configuration: {0}")]
    InvalidScheduleConfig(#[from] fnf_time::TimeError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Announcement delivery failed: {0}")]
    AnnouncementError(String),
}

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;
