use thiserror::Error;

/// Errors raised while parsing or evaluating schedule times.
///
/// Every variant describes a configuration problem; callers surface them when a
/// schedule is created or edited instead of substituting a default.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimeError {
    #[error("Invalid wall time {0:?}, expected HH:MM")]
    InvalidWallTime(String),

    #[error("Unknown timezone: {0}")]
    UnknownTimezone(String),

    #[error("Unknown day of week: {0}")]
    UnknownWeekday(String),

    #[error("Unknown cadence: {0}")]
    UnknownCadence(String),

    #[error("Date out of range: {0}")]
    OutOfRange(String),
}

pub type TimeResult<T> = std::result::Result<T, TimeError>;
