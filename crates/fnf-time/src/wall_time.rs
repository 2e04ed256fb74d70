//! Local wall-clock times written as `HH:MM`.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::{TimeError, TimeResult};

/// A time of day in a schedule's local timezone, minute precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WallTime(NaiveTime);

impl WallTime {
    /// ## Summary
    /// Builds a wall time from an hour and minute.
    ///
    /// ## Errors
    /// Returns `TimeError::InvalidWallTime` if the hour or minute is out of range.
    pub fn new(hour: u32, minute: u32) -> TimeResult<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0)
            .map(Self)
            .ok_or_else(|| TimeError::InvalidWallTime(format!("{hour}:{minute}")))
    }

    /// ## Summary
    /// Parses an `HH:MM` string. One-digit hours and minutes are accepted.
    ///
    /// ## Errors
    /// Returns `TimeError::InvalidWallTime` if the string does not split into an
    /// hour and a minute, or either component is out of range.
    pub fn parse(input: &str) -> TimeResult<Self> {
        let invalid = || TimeError::InvalidWallTime(input.to_string());

        let (hour, minute) = input.trim().split_once(':').ok_or_else(invalid)?;
        if !is_short_number(hour) || !is_short_number(minute) {
            return Err(invalid());
        }
        let hour: u32 = hour.parse().map_err(|_err| invalid())?;
        let minute: u32 = minute.parse().map_err(|_err| invalid())?;

        NaiveTime::from_hms_opt(hour, minute, 0)
            .map(Self)
            .ok_or_else(invalid)
    }

    #[must_use]
    pub fn hour(self) -> u32 {
        self.0.hour()
    }

    #[must_use]
    pub fn minute(self) -> u32 {
        self.0.minute()
    }

    #[must_use]
    pub const fn as_naive(self) -> NaiveTime {
        self.0
    }
}

fn is_short_number(part: &str) -> bool {
    (1..=2).contains(&part.len()) && part.bytes().all(|b| b.is_ascii_digit())
}

impl fmt::Display for WallTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

impl FromStr for WallTime {
    type Err = TimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for WallTime {
    type Error = TimeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<WallTime> for String {
    fn from(value: WallTime) -> Self {
        value.to_string()
    }
}
