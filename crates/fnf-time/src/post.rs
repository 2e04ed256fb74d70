//! Announcement post-time derivation.

use chrono::{DateTime, Days, Utc};
use chrono_tz::Tz;

use crate::error::{TimeError, TimeResult};
use crate::recurrence::PostRule;
use crate::zone::localize;

/// ## Summary
/// Derives when the announcement for `event_occurrence` should be posted.
///
/// The occurrence is converted into `timezone`, moved back `offset_days`
/// calendar days and set to the rule's wall time. The result is not checked
/// against the current time.
///
/// ## Errors
/// Returns `TimeError::OutOfRange` if the offset moves the date out of range.
pub fn post_time_for(
    rule: &PostRule,
    timezone: Tz,
    event_occurrence: DateTime<Utc>,
) -> TimeResult<DateTime<Utc>> {
    let event_date = event_occurrence.with_timezone(&timezone).date_naive();
    let post_date = event_date
        .checked_sub_days(Days::new(u64::from(rule.offset_days)))
        .ok_or_else(|| TimeError::OutOfRange(format!("{event_date} - {} days", rule.offset_days)))?;

    Ok(localize(timezone, post_date.and_time(rule.time.as_naive())))
}
