//! Timezone resolution and local-to-UTC conversion.

use std::str::FromStr;

use chrono::{DateTime, LocalResult, NaiveDateTime, Offset, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::{TimeError, TimeResult};

/// ## Summary
/// Resolves an IANA timezone identifier such as `America/Los_Angeles`.
///
/// ## Errors
/// Returns `TimeError::UnknownTimezone` if the identifier is not in the tz database.
pub fn resolve_timezone(tzid: &str) -> TimeResult<Tz> {
    Tz::from_str(tzid.trim()).map_err(|_err| TimeError::UnknownTimezone(tzid.to_string()))
}

/// ## Summary
/// Converts a local wall-clock timestamp in `tz` to an absolute instant.
///
/// The wall time is authoritative. During a DST fold the earlier instant is used.
/// A wall time that falls in a DST gap is read with the offset in effect before
/// the gap, which moves it forward by the length of the gap (02:30 on a
/// spring-forward night in `America/New_York` becomes 03:30 EDT).
#[must_use]
pub fn localize(tz: Tz, local: NaiveDateTime) -> DateTime<Utc> {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _latest) => earliest.with_timezone(&Utc),
        LocalResult::None => {
            // Gaps are never a day apart, so the offset a day earlier is the pre-gap offset.
            let before_gap = tz
                .offset_from_utc_datetime(&(local - TimeDelta::days(1)))
                .fix()
                .local_minus_utc();
            tracing::trace!(%local, %tz, "Wall time falls in a DST gap, shifting forward");
            DateTime::<Utc>::from_naive_utc_and_offset(
                local - TimeDelta::seconds(i64::from(before_gap)),
                Utc,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn naive(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .and_then(|date| date.and_hms_opt(h, min, 0))
            .expect("valid test date")
    }

    #[test]
    fn resolves_iana_names() {
        assert_eq!(
            resolve_timezone("America/Los_Angeles").expect("known zone"),
            Tz::America__Los_Angeles
        );
        assert_eq!(resolve_timezone(" UTC ").expect("known zone"), Tz::UTC);
    }

    #[test]
    fn rejects_unknown_names() {
        assert_eq!(
            resolve_timezone("Mars/Olympus_Mons"),
            Err(TimeError::UnknownTimezone("Mars/Olympus_Mons".to_string()))
        );
    }

    #[test]
    fn localizes_unambiguous_time() {
        let utc = localize(Tz::America__New_York, naive(2026, 1, 15, 10, 0));
        assert_eq!(utc, Utc.with_ymd_and_hms(2026, 1, 15, 15, 0, 0).unwrap());
    }

    #[test]
    fn dst_gap_moves_forward_by_gap_length() {
        // 2024-03-10 02:30 does not exist in New York.
        let utc = localize(Tz::America__New_York, naive(2024, 3, 10, 2, 30));
        assert_eq!(utc, Utc.with_ymd_and_hms(2024, 3, 10, 7, 30, 0).unwrap());
        assert_eq!(
            utc.with_timezone(&Tz::America__New_York).naive_local(),
            naive(2024, 3, 10, 3, 30)
        );
    }

    #[test]
    fn dst_fold_uses_earlier_instant() {
        // 2024-11-03 01:30 happens twice in New York; the EDT one comes first.
        let utc = localize(Tz::America__New_York, naive(2024, 11, 3, 1, 30));
        assert_eq!(utc, Utc.with_ymd_and_hms(2024, 11, 3, 5, 30, 0).unwrap());
    }
}
