//! Next-occurrence calculation for weekly and first-of-month schedules.

use chrono::{DateTime, Datelike, Days, Months, NaiveDate, Timelike, Utc, Weekday};

use crate::error::{TimeError, TimeResult};
use crate::recurrence::{Cadence, EventRecurrence};
use crate::zone::localize;

/// ## Summary
/// Computes the first event occurrence strictly after `reference`.
///
/// The reference is converted into the recurrence's timezone and truncated to
/// whole seconds. A weekly event later on the reference's own local day counts
/// (a same-day post announces that evening's event); an event that has already
/// started does not. First-of-month events use the
/// first matching weekday of the reference month, moving forward a month at a
/// time until the occurrence lies after the reference.
///
/// ## Errors
/// Returns `TimeError::OutOfRange` if the computation leaves the range chrono can represent.
pub fn next_occurrence(
    recurrence: &EventRecurrence,
    reference: DateTime<Utc>,
) -> TimeResult<DateTime<Utc>> {
    let tz = recurrence.timezone;
    let local = reference.with_timezone(&tz).naive_local();
    let local = local.with_nanosecond(0).unwrap_or(local);
    tracing::trace!(%local, %tz, cadence = %recurrence.cadence, "Computing next occurrence");

    let occurrence = match recurrence.cadence {
        Cadence::Weekly => {
            // Starts on the reference's own day: a Monday event posted Monday
            // morning announces tonight, not next week.
            let mut date = local
                .date()
                .checked_add_days(Days::new(days_until(local.weekday(), recurrence.day)))
                .ok_or_else(|| out_of_range(local.date()))?;
            loop {
                let candidate = localize(tz, date.and_time(recurrence.time.as_naive()));
                if candidate > reference {
                    break candidate;
                }
                date = date
                    .checked_add_days(Days::new(7))
                    .ok_or_else(|| out_of_range(date))?;
            }
        }
        Cadence::FirstOfMonth => {
            let mut month = local.date().with_day(1).ok_or_else(|| out_of_range(local.date()))?;
            loop {
                let date = first_weekday_of_month(month, recurrence.day)?;
                let candidate = localize(tz, date.and_time(recurrence.time.as_naive()));
                if candidate > reference {
                    break candidate;
                }
                tracing::trace!(%candidate, "Occurrence is not after the reference, moving forward 1 month");
                month = month
                    .checked_add_months(Months::new(1))
                    .ok_or_else(|| out_of_range(month))?;
            }
        }
    };

    tracing::trace!(%occurrence, "Next occurrence computed");
    Ok(occurrence)
}

/// ## Summary
/// Lists `count` consecutive occurrences, the first one strictly after `from`.
///
/// ## Errors
/// Returns `TimeError::OutOfRange` if any occurrence cannot be represented.
pub fn occurrences(
    recurrence: &EventRecurrence,
    from: DateTime<Utc>,
    count: usize,
) -> TimeResult<Vec<DateTime<Utc>>> {
    let mut out = Vec::with_capacity(count);
    let mut reference = from;
    for _ in 0..count {
        reference = next_occurrence(recurrence, reference)?;
        out.push(reference);
    }
    Ok(out)
}

fn days_until(from: Weekday, to: Weekday) -> u64 {
    u64::from((7 + to.num_days_from_monday() - from.num_days_from_monday()) % 7)
}

fn first_weekday_of_month(month_start: NaiveDate, day: Weekday) -> TimeResult<NaiveDate> {
    month_start
        .checked_add_days(Days::new(days_until(month_start.weekday(), day)))
        .ok_or_else(|| out_of_range(month_start))
}

fn out_of_range(date: NaiveDate) -> TimeError {
    TimeError::OutOfRange(date.to_string())
}
