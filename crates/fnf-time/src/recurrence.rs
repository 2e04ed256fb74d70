//! Recurrence descriptions evaluated by the occurrence calculator.

use std::fmt;
use std::str::FromStr;

use chrono::Weekday;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{TimeError, TimeResult};
use crate::wall_time::WallTime;

/// How often a schedule's event repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cadence {
    /// Every week on the event day.
    #[default]
    Weekly,
    /// The first event day of each month.
    FirstOfMonth,
}

impl Cadence {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Weekly => "weekly",
            Self::FirstOfMonth => "first_of_month",
        }
    }
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Cadence {
    type Err = TimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "weekly" => Ok(Self::Weekly),
            "first_of_month" => Ok(Self::FirstOfMonth),
            _ => Err(TimeError::UnknownCadence(s.to_string())),
        }
    }
}

/// ## Summary
/// Parses a day name (`monday`, `Mon`, `FRIDAY`, ...) into `chrono::Weekday`.
///
/// ## Errors
/// Returns `TimeError::UnknownWeekday` if the name is not a day of the week.
pub fn parse_weekday(input: &str) -> TimeResult<Weekday> {
    input
        .trim()
        .parse::<Weekday>()
        .map_err(|_err| TimeError::UnknownWeekday(input.to_string()))
}

/// When a schedule's event takes place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventRecurrence {
    pub day: Weekday,
    pub time: WallTime,
    pub cadence: Cadence,
    pub timezone: Tz,
}

/// When the announcement for an event is posted, relative to the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostRule {
    pub time: WallTime,
    pub offset_days: u32,
}
