//! Turning a schedule's next occurrence into a posted, logged event.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use fnf_core::constants::{NO_LOCATION_TEXT, RSVP_EMOJI};
use fnf_core::types::{ChannelId, EventId, MessageId, ScheduleId};
use fnf_db::error::DbError;
use fnf_db::model::{Event, Schedule};
use fnf_db::store::{EventStore, ScheduleStore};
use fnf_time::next_occurrence;

use crate::clock::Clock;
use crate::error::{ServiceError, ServiceResult};

/// Creates and announces the next event of a schedule when its post time arrives.
#[async_trait]
pub trait EventMaterializer: Send + Sync {
    /// ## Summary
    /// Ensures the next occurrence of `schedule` exists as an event, is announced
    /// and is the schedule's active event. Calling it twice for the same
    /// occurrence must not produce a second event.
    async fn create_and_post_next_occurrence(&self, schedule: &Schedule) -> ServiceResult<Event>;
}

/// Chat transport for announcements and audit lines.
#[async_trait]
pub trait AnnouncementSink: Send + Sync {
    async fn send_message(&self, channel: ChannelId, content: &str) -> ServiceResult<MessageId>;

    async fn edit_message(&self, channel: ChannelId, message: MessageId, content: &str) -> ServiceResult<()>;

    /// Returns `false` when the message was deleted or never existed.
    async fn message_exists(&self, channel: ChannelId, message: MessageId) -> ServiceResult<bool>;

    async fn add_reaction(&self, channel: ChannelId, message: MessageId, emoji: &str) -> ServiceResult<()>;
}

/// Mirrors events into an external calendar.
#[async_trait]
pub trait CalendarSync: Send + Sync {
    /// Creates or updates the calendar entry and returns its id, if any.
    async fn sync_event(&self, schedule: &Schedule, event: &Event) -> ServiceResult<Option<String>>;
}

/// Calendar integration that keeps whatever id the event already has.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCalendar;

#[async_trait]
impl CalendarSync for NoopCalendar {
    async fn sync_event(&self, _schedule: &Schedule, event: &Event) -> ServiceResult<Option<String>> {
        Ok(event.calendar_event_id.clone())
    }
}

/// ## Summary
/// Renders the announcement body for an event.
#[must_use]
pub fn render_announcement(schedule: &Schedule, event: &Event) -> String {
    let mut content = schedule.message.clone();
    if let Some(location) = event.display_location() {
        content.push_str("\n\nLocation: ");
        content.push_str(location);
    }
    content
}

/// ## Summary
/// Renders the audit line written to a schedule's log channel.
#[must_use]
pub fn render_log_line(event: &Event) -> String {
    format!(
        "<t:{}>: {}",
        event.occurs_at.timestamp(),
        event.display_location().unwrap_or(NO_LOCATION_TEXT)
    )
}

pub struct EventService {
    schedules: Arc<dyn ScheduleStore>,
    events: Arc<dyn EventStore>,
    sink: Arc<dyn AnnouncementSink>,
    calendar: Arc<dyn CalendarSync>,
    clock: Arc<dyn Clock>,
}

impl EventService {
    #[must_use]
    pub fn new(
        schedules: Arc<dyn ScheduleStore>,
        events: Arc<dyn EventStore>,
        sink: Arc<dyn AnnouncementSink>,
        calendar: Arc<dyn CalendarSync>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            schedules,
            events,
            sink,
            calendar,
            clock,
        }
    }

    /// ## Summary
    /// Finds or creates the event for the schedule's next occurrence and makes it
    /// the schedule's active event.
    ///
    /// ## Side Effects
    /// - Inserts an event unless one exists for the same local date
    /// - Saves the schedule with the new active event pointer
    ///
    /// ## Errors
    /// Returns an error if the occurrence cannot be computed, the schedule no
    /// longer exists, or a store write fails.
    #[tracing::instrument(skip(self, schedule), fields(schedule_id = %schedule.id))]
    pub async fn create_next_event(&self, schedule: &Schedule) -> ServiceResult<Event> {
        if self.schedules.find_by_id(schedule.id).await?.is_none() {
            return Err(ServiceError::NotFound(format!("schedule {}", schedule.id)));
        }

        let occurs_at = next_occurrence(&schedule.recurrence(), self.clock.now())?;
        let local_date = occurs_at.with_timezone(&schedule.timezone).naive_local();

        let (event, created) = self
            .events
            .find_or_create(Event::new(schedule.id, local_date, occurs_at))
            .await?;
        if created {
            tracing::info!(event_id = %event.id, %occurs_at, "Created event");
        } else {
            tracing::debug!(event_id = %event.id, "Reusing existing event for occurrence");
        }

        let active = event.active_ref();
        self.schedules
            .update(
                schedule.id,
                Box::new(move |current: &mut Schedule| {
                    current.active_event = Some(active);
                    true
                }),
            )
            .await
            .map_err(|err| not_found_as_service(err, schedule.id))?;

        Ok(event)
    }

    /// ## Summary
    /// Announces the event in its schedule's channel.
    ///
    /// An event that already has a live message only gets its RSVP reaction
    /// re-added. A message that has vanished is replaced by a fresh one.
    ///
    /// ## Errors
    /// Returns an error if the schedule is gone or the chat transport fails.
    #[tracing::instrument(skip(self, event), fields(event_id = %event.id))]
    pub async fn post_event(&self, mut event: Event) -> ServiceResult<Event> {
        let schedule = self.schedule_for(&event).await?;

        if let Some(message) = event.discord_message_id {
            if self.sink.message_exists(schedule.channel, message).await? {
                tracing::debug!(%message, "Announcement already posted");
                self.sink.add_reaction(schedule.channel, message, RSVP_EMOJI).await?;
                return Ok(event);
            }
            tracing::warn!(%message, "Announcement message is gone, posting it again");
        }

        let content = render_announcement(&schedule, &event);
        let message = self.sink.send_message(schedule.channel, &content).await?;
        self.sink.add_reaction(schedule.channel, message, RSVP_EMOJI).await?;
        tracing::info!(channel = %schedule.channel, %message, "Announcement posted");

        event.discord_message_id = Some(message);
        Ok(self.events.save(event).await?)
    }

    /// ## Summary
    /// Writes or refreshes the audit line for the event in the schedule's log channel.
    /// Does nothing when the schedule has no log channel.
    ///
    /// ## Errors
    /// Returns an error if the schedule is gone or the chat transport fails.
    #[tracing::instrument(skip(self, event), fields(event_id = %event.id))]
    pub async fn update_log_message(&self, mut event: Event) -> ServiceResult<Event> {
        let schedule = self.schedule_for(&event).await?;
        let Some(log_channel) = schedule.log_channel else {
            return Ok(event);
        };

        let line = render_log_line(&event);
        if let Some(message) = event.log_message_id
            && self.sink.message_exists(log_channel, message).await?
        {
            self.sink.edit_message(log_channel, message, &line).await?;
            return Ok(event);
        }

        let message = self.sink.send_message(log_channel, &line).await?;
        event.log_message_id = Some(message);
        Ok(self.events.save(event).await?)
    }

    /// ## Summary
    /// Sets the event's location and refreshes everything that displays it.
    ///
    /// ## Errors
    /// Returns `ServiceError::NotFound` for an unknown event.
    #[tracing::instrument(skip(self))]
    pub async fn set_location(
        &self,
        event_id: EventId,
        location: String,
        name: Option<String>,
    ) -> ServiceResult<Event> {
        let mut event = self.load(event_id).await?;
        event.location = Some(location);
        event.location_name = name;
        let event = self.events.save(event).await?;
        self.refresh(event).await
    }

    /// ## Summary
    /// Moves the event to a new instant.
    ///
    /// The local date is recomputed in the schedule's current timezone and the
    /// schedule's active event pointer follows when it points at this event.
    /// Callers that change timing must rearm the timer afterwards.
    ///
    /// ## Errors
    /// Returns `ServiceError::Conflict` if the schedule already has another event
    /// at that local date, `ServiceError::NotFound` for an unknown event.
    #[tracing::instrument(skip(self))]
    pub async fn set_time(&self, event_id: EventId, at: DateTime<Utc>) -> ServiceResult<Event> {
        let mut event = self.load(event_id).await?;
        let schedule = self.schedule_for(&event).await?;
        let local_date = at.with_timezone(&schedule.timezone).naive_local();

        if let Some(other) = self
            .events
            .find_by_schedule_and_date(schedule.id, local_date)
            .await?
            && other.id != event.id
        {
            return Err(ServiceError::Conflict(format!(
                "event {} already occurs at {local_date}",
                other.id
            )));
        }

        event.local_date = local_date;
        event.occurs_at = at;
        let event = self.events.save(event).await?;

        let moved = event.active_ref();
        self.schedules
            .update(
                schedule.id,
                Box::new(move |current: &mut Schedule| {
                    let follows = current
                        .active_event
                        .is_some_and(|active| active.event_id == moved.event_id);
                    if follows {
                        current.active_event = Some(moved);
                    }
                    follows
                }),
            )
            .await
            .map_err(|err| not_found_as_service(err, schedule.id))?;

        self.refresh(event).await
    }

    /// ## Summary
    /// Finds the event announced by the given chat message.
    ///
    /// ## Errors
    /// Returns an error if the event store cannot be read.
    pub async fn find_by_message(&self, message_id: MessageId) -> ServiceResult<Option<Event>> {
        Ok(self.events.find_by_message_id(message_id).await?)
    }

    async fn refresh(&self, event: Event) -> ServiceResult<Event> {
        let schedule = self.schedule_for(&event).await?;
        if let Some(message) = event.discord_message_id
            && self.sink.message_exists(schedule.channel, message).await?
        {
            self.sink
                .edit_message(schedule.channel, message, &render_announcement(&schedule, &event))
                .await?;
        }
        let event = self.sync_calendar(&schedule, event).await?;
        self.update_log_message(event).await
    }

    async fn sync_calendar(&self, schedule: &Schedule, mut event: Event) -> ServiceResult<Event> {
        let calendar_id = self.calendar.sync_event(schedule, &event).await?;
        if calendar_id == event.calendar_event_id {
            return Ok(event);
        }
        event.calendar_event_id = calendar_id;
        Ok(self.events.save(event).await?)
    }

    async fn load(&self, event_id: EventId) -> ServiceResult<Event> {
        self.events
            .find_by_id(event_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("event {event_id}")))
    }

    async fn schedule_for(&self, event: &Event) -> ServiceResult<Schedule> {
        self.schedules
            .find_by_id(event.schedule_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("schedule {}", event.schedule_id)))
    }
}

/// Reports a schedule that vanished under an atomic update like any other lookup miss.
pub(crate) fn not_found_as_service(err: DbError, schedule_id: ScheduleId) -> ServiceError {
    match err {
        DbError::NotFound(_) => ServiceError::NotFound(format!("schedule {schedule_id}")),
        other => other.into(),
    }
}

#[async_trait]
impl EventMaterializer for EventService {
    #[tracing::instrument(skip(self, schedule), fields(schedule_id = %schedule.id))]
    async fn create_and_post_next_occurrence(&self, schedule: &Schedule) -> ServiceResult<Event> {
        let event = self.create_next_event(schedule).await?;
        let event = self.post_event(event).await?;
        let current = self.schedule_for(&event).await?;
        let event = self.sync_calendar(&current, event).await?;
        self.update_log_message(event).await
    }
}
