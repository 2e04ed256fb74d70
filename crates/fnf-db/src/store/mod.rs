//! Storage interfaces used by the scheduler and the event service.
//!
//! The scheduler never caches schedule data; every decision re-reads the
//! store, so implementations are the single source of truth.

pub mod memory;

use async_trait::async_trait;
use chrono::NaiveDateTime;

use fnf_core::types::{EventId, MessageId, ScheduleId};

use crate::error::DbResult;
use crate::model::{Event, Schedule};

pub use memory::MemoryStore;

/// In-place edit of a stored schedule. Returning `false` leaves the schedule untouched.
pub type ScheduleEdit<'a> = Box<dyn FnOnce(&mut Schedule) -> bool + Send + 'a>;

#[async_trait]
pub trait ScheduleStore: Send + Sync {
    /// Every schedule, in a stable order (creation order for time-ordered ids).
    async fn list_all(&self) -> DbResult<Vec<Schedule>>;

    async fn find_by_id(&self, id: ScheduleId) -> DbResult<Option<Schedule>>;

    /// Inserts or replaces the schedule with the same id.
    async fn save(&self, schedule: Schedule) -> DbResult<Schedule>;

    /// ## Summary
    /// Applies `edit` to the stored schedule with no other write in between and
    /// returns the schedule as stored afterwards.
    ///
    /// ## Errors
    /// Returns `DbError::NotFound` if no schedule has that id.
    async fn update<'a>(&'a self, id: ScheduleId, edit: ScheduleEdit<'a>) -> DbResult<Schedule>;

    /// Returns `false` if no schedule had that id.
    async fn delete_by_id(&self, id: ScheduleId) -> DbResult<bool>;
}

#[async_trait]
pub trait EventStore: Send + Sync {
    async fn find_by_id(&self, id: EventId) -> DbResult<Option<Event>>;

    async fn find_by_schedule_and_date(
        &self,
        schedule_id: ScheduleId,
        local_date: NaiveDateTime,
    ) -> DbResult<Option<Event>>;

    async fn find_by_message_id(&self, message_id: MessageId) -> DbResult<Option<Event>>;

    /// Past and present events of a schedule, oldest first.
    async fn list_for_schedule(&self, schedule_id: ScheduleId) -> DbResult<Vec<Event>>;

    /// ## Summary
    /// Atomically returns the stored event for `(event.schedule_id, event.local_date)`
    /// or stores `event` if there is none. The flag is `true` when `event` was inserted.
    async fn find_or_create(&self, event: Event) -> DbResult<(Event, bool)>;

    async fn save(&self, event: Event) -> DbResult<Event>;
}
