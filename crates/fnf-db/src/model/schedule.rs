//! Schedule record.

use chrono::{DateTime, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use fnf_core::types::{ChannelId, EventId, OrderId, ScheduleId, UserId};
use fnf_time::{Cadence, EventRecurrence, PostRule, WallTime};

/// Pointer from a schedule to the event currently in flight for it.
///
/// The occurrence instant is carried alongside the id so staleness can be
/// decided without loading the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveEventRef {
    pub event_id: EventId,
    pub occurs_at: DateTime<Utc>,
}

impl ActiveEventRef {
    /// ## Summary
    /// An active event is stale once its occurrence instant has been reached.
    #[must_use]
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        self.occurs_at <= now
    }
}

/// A named recurring commitment that produces one announcement per occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub id: ScheduleId,
    pub event_day: Weekday,
    pub event_time: WallTime,
    pub cadence: Cadence,
    pub post_time: WallTime,
    pub post_offset_days: u32,
    pub timezone: Tz,
    pub channel: ChannelId,
    pub calendar_user: UserId,
    pub log_channel: Option<ChannelId>,
    pub order: Option<OrderId>,
    pub message: String,
    /// Raw pointer; read it through [`Schedule::live_active_event`].
    pub active_event: Option<ActiveEventRef>,
}

impl Schedule {
    #[must_use]
    pub fn recurrence(&self) -> EventRecurrence {
        EventRecurrence {
            day: self.event_day,
            time: self.event_time,
            cadence: self.cadence,
            timezone: self.timezone,
        }
    }

    #[must_use]
    pub fn post_rule(&self) -> PostRule {
        PostRule {
            time: self.post_time,
            offset_days: self.post_offset_days,
        }
    }

    /// ## Summary
    /// Returns the active event pointer unless it is unset or stale at `now`.
    #[must_use]
    pub fn live_active_event(&self, now: DateTime<Utc>) -> Option<&ActiveEventRef> {
        self.active_event.as_ref().filter(|active| !active.is_stale(now))
    }
}
