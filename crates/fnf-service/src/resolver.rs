//! Next-post resolution across every stored schedule.

use chrono::{DateTime, Utc};

use fnf_core::types::ScheduleId;
use fnf_db::model::Schedule;
use fnf_db::store::ScheduleStore;
use fnf_time::{next_occurrence, post_time_for};

use crate::error::ServiceResult;

/// The announcement that should go out next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NextPost {
    pub schedule: Schedule,
    pub event_at: DateTime<Utc>,
    pub post_at: DateTime<Utc>,
}

/// Why a schedule does not take part in the next-post race.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exclusion {
    /// The schedule already posted for an event that has not happened yet.
    ActiveEventPending { until: DateTime<Utc> },
    /// The derived post time is not after now.
    PostTimeNotInFuture,
    /// The schedule's recurrence could not be evaluated.
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostTiming {
    pub event_at: DateTime<Utc>,
    pub post_at: DateTime<Utc>,
}

/// One schedule's view in a resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostCandidate {
    pub schedule: Schedule,
    /// `None` only when the recurrence could not be evaluated.
    pub timing: Option<PostTiming>,
    pub exclusion: Option<Exclusion>,
}

impl PostCandidate {
    #[must_use]
    pub fn is_eligible(&self) -> bool {
        self.exclusion.is_none()
    }
}

/// Every schedule evaluated against the same instant.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub now: DateTime<Utc>,
    pub candidates: Vec<PostCandidate>,
}

impl Resolution {
    /// ## Summary
    /// Returns the eligible candidate with the earliest post time. On a tie the
    /// schedule listed first wins.
    #[must_use]
    pub fn next_post(&self) -> Option<NextPost> {
        let mut best: Option<(&PostCandidate, PostTiming)> = None;
        for candidate in self.candidates.iter().filter(|c| c.is_eligible()) {
            let Some(timing) = candidate.timing else {
                continue;
            };
            if best.is_none_or(|(_, current)| timing.post_at < current.post_at) {
                best = Some((candidate, timing));
            }
        }

        best.map(|(candidate, timing)| NextPost {
            schedule: candidate.schedule.clone(),
            event_at: timing.event_at,
            post_at: timing.post_at,
        })
    }

    /// Post time of `schedule_id` if that schedule is currently eligible.
    #[must_use]
    pub fn eligible_post_at(&self, schedule_id: ScheduleId) -> Option<DateTime<Utc>> {
        self.candidates
            .iter()
            .find(|c| c.schedule.id == schedule_id && c.is_eligible())
            .and_then(|c| c.timing)
            .map(|timing| timing.post_at)
    }

    /// Earliest instant at which a pending active event goes stale.
    #[must_use]
    pub fn earliest_active_expiry(&self) -> Option<DateTime<Utc>> {
        self.candidates
            .iter()
            .filter_map(|c| match c.exclusion {
                Some(Exclusion::ActiveEventPending { until }) => Some(until),
                _ => None,
            })
            .min()
    }

    /// ## Summary
    /// Earliest instant at which a schedule whose post time already passed
    /// becomes eligible again.
    ///
    /// Once that occurrence happens the search moves on to the following cycle,
    /// whose post time may be before every other candidate.
    #[must_use]
    pub fn earliest_reeligible(&self) -> Option<DateTime<Utc>> {
        self.candidates
            .iter()
            .filter(|c| c.exclusion == Some(Exclusion::PostTimeNotInFuture))
            .filter_map(|c| c.timing.map(|timing| timing.event_at))
            .min()
    }

    /// Earliest instant at which an excluded schedule may change its answer.
    #[must_use]
    pub fn earliest_wakeup(&self) -> Option<DateTime<Utc>> {
        [self.earliest_active_expiry(), self.earliest_reeligible()]
            .into_iter()
            .flatten()
            .min()
    }
}

/// ## Summary
/// Evaluates a single schedule at `now`.
///
/// The occurrence search starts at the live active event's instant when there is
/// one, otherwise at `now`. Calculation errors are reported as an exclusion so one
/// broken schedule never hides the others.
#[must_use]
pub fn evaluate(schedule: &Schedule, now: DateTime<Utc>) -> PostCandidate {
    let active = schedule.live_active_event(now).copied();
    let basis = active.map_or(now, |a| a.occurs_at);

    let timing = next_occurrence(&schedule.recurrence(), basis).and_then(|event_at| {
        post_time_for(&schedule.post_rule(), schedule.timezone, event_at)
            .map(|post_at| PostTiming { event_at, post_at })
    });

    let (timing, exclusion) = match timing {
        Ok(timing) => {
            let exclusion = if let Some(active) = active {
                Some(Exclusion::ActiveEventPending {
                    until: active.occurs_at,
                })
            } else if timing.post_at <= now {
                Some(Exclusion::PostTimeNotInFuture)
            } else {
                None
            };
            (Some(timing), exclusion)
        }
        Err(err) => {
            tracing::warn!(schedule_id = %schedule.id, error = %err, "Schedule cannot be evaluated");
            (None, Some(Exclusion::Invalid(err.to_string())))
        }
    };

    PostCandidate {
        schedule: schedule.clone(),
        timing,
        exclusion,
    }
}

/// ## Summary
/// Reads every schedule from the store and evaluates it at `now`.
///
/// ## Errors
/// Returns an error if the schedule store cannot be read.
#[tracing::instrument(skip(store))]
pub async fn resolve(store: &dyn ScheduleStore, now: DateTime<Utc>) -> ServiceResult<Resolution> {
    let schedules = store.list_all().await?;
    let candidates: Vec<PostCandidate> = schedules.iter().map(|s| evaluate(s, now)).collect();

    let resolution = Resolution { now, candidates };
    match resolution.next_post() {
        Some(next) => tracing::debug!(
            schedule_id = %next.schedule.id,
            post_at = %next.post_at,
            event_at = %next.event_at,
            "Next post resolved"
        ),
        None => tracing::debug!(schedules = schedules.len(), "No schedule has a pending post"),
    }

    Ok(resolution)
}
