//! Event record: one concrete occurrence of a schedule.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use fnf_core::types::{EventId, MessageId, ScheduleId};

use super::schedule::ActiveEventRef;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub schedule_id: ScheduleId,
    /// Wall time in the schedule's timezone when the event was created. Together
    /// with `schedule_id` this identifies the occurrence.
    pub local_date: NaiveDateTime,
    pub occurs_at: DateTime<Utc>,
    pub location: Option<String>,
    pub location_name: Option<String>,
    pub discord_message_id: Option<MessageId>,
    pub calendar_event_id: Option<String>,
    pub log_message_id: Option<MessageId>,
}

impl Event {
    #[must_use]
    pub fn new(schedule_id: ScheduleId, local_date: NaiveDateTime, occurs_at: DateTime<Utc>) -> Self {
        Self {
            id: EventId::new(),
            schedule_id,
            local_date,
            occurs_at,
            location: None,
            location_name: None,
            discord_message_id: None,
            calendar_event_id: None,
            log_message_id: None,
        }
    }

    #[must_use]
    pub fn active_ref(&self) -> ActiveEventRef {
        ActiveEventRef {
            event_id: self.id,
            occurs_at: self.occurs_at,
        }
    }

    /// ## Summary
    /// Returns the location text with blank values treated as unset.
    #[must_use]
    pub fn display_location(&self) -> Option<&str> {
        self.location.as_deref().map(str::trim).filter(|loc| !loc.is_empty())
    }
}
