//! Schedule management entry points used by the chat layer.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use fnf_core::constants::{DEFAULT_POST_OFFSET_DAYS, DEFAULT_POST_TIME};
use fnf_core::types::{ChannelId, EventId, OrderId, ScheduleId, UserId};
use fnf_db::model::{Event, Schedule};
use fnf_db::store::ScheduleStore;
use fnf_time::{Cadence, WallTime, next_occurrence, occurrences, parse_weekday, post_time_for, resolve_timezone};

use crate::clock::Clock;
use crate::error::{ServiceError, ServiceResult};
use crate::event::{EventMaterializer, EventService, not_found_as_service};
use crate::resolver::{NextPost, Resolution, resolve};
use crate::timer::RearmingTimer;

/// Raw schedule definition as typed by a user or read from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSchedule {
    pub channel: ChannelId,
    pub calendar_user: UserId,
    pub event_day: String,
    pub event_time: String,
    pub timezone: String,
    pub message: String,
    pub post_time: Option<String>,
    pub post_offset_days: Option<u32>,
    pub cadence: Option<String>,
    pub log_channel: Option<ChannelId>,
}

impl NewSchedule {
    /// ## Summary
    /// Parses every field into a schedule with a fresh id.
    ///
    /// ## Errors
    /// Returns `ServiceError::InvalidScheduleConfig` for a malformed weekday,
    /// wall time, cadence or timezone.
    pub fn validate(&self) -> ServiceResult<Schedule> {
        let post_time = self.post_time.as_deref().unwrap_or(DEFAULT_POST_TIME);
        Ok(Schedule {
            id: ScheduleId::new(),
            event_day: parse_weekday(&self.event_day)?,
            event_time: WallTime::parse(&self.event_time)?,
            cadence: self
                .cadence
                .as_deref()
                .map(str::parse::<Cadence>)
                .transpose()?
                .unwrap_or_default(),
            post_time: WallTime::parse(post_time)?,
            post_offset_days: self.post_offset_days.unwrap_or(DEFAULT_POST_OFFSET_DAYS),
            timezone: resolve_timezone(&self.timezone)?,
            channel: self.channel,
            calendar_user: self.calendar_user,
            log_channel: self.log_channel,
            order: None,
            message: self.message.clone(),
            active_event: None,
        })
    }
}

impl From<&fnf_core::config::ScheduleSeed> for NewSchedule {
    fn from(seed: &fnf_core::config::ScheduleSeed) -> Self {
        Self {
            channel: ChannelId(seed.channel),
            calendar_user: UserId(seed.calendar_user),
            event_day: seed.event_day.clone(),
            event_time: seed.event_time.clone(),
            timezone: seed.timezone.clone(),
            message: seed.message.clone(),
            post_time: seed.post_time.clone(),
            post_offset_days: seed.post_offset_days,
            cadence: seed.cadence.clone(),
            log_channel: seed.log_channel.map(ChannelId),
        }
    }
}

/// An upcoming occurrence together with the instant its announcement goes out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpcomingPost {
    pub event_at: DateTime<Utc>,
    pub post_at: DateTime<Utc>,
}

pub struct ScheduleService {
    schedules: Arc<dyn ScheduleStore>,
    events: Arc<EventService>,
    timer: Arc<RearmingTimer>,
    clock: Arc<dyn Clock>,
}

impl ScheduleService {
    #[must_use]
    pub fn new(
        schedules: Arc<dyn ScheduleStore>,
        events: Arc<EventService>,
        timer: Arc<RearmingTimer>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            schedules,
            events,
            timer,
            clock,
        }
    }

    #[must_use]
    pub fn timer(&self) -> &Arc<RearmingTimer> {
        &self.timer
    }

    /// ## Summary
    /// Returns the announcement that goes out next across all schedules.
    ///
    /// ## Errors
    /// Returns an error if the schedule store cannot be read.
    pub async fn next_post_time(&self) -> ServiceResult<Option<NextPost>> {
        Ok(self.candidates().await?.next_post())
    }

    /// ## Summary
    /// Evaluates every schedule now, including the ones that are excluded.
    ///
    /// ## Errors
    /// Returns an error if the schedule store cannot be read.
    pub async fn candidates(&self) -> ServiceResult<Resolution> {
        resolve(self.schedules.as_ref(), self.clock.now()).await
    }

    /// ## Summary
    /// Computes the schedule's next occurrence after `from`, or after now.
    ///
    /// ## Errors
    /// Returns `ServiceError::NotFound` for an unknown schedule.
    pub async fn next_occurrence(
        &self,
        schedule_id: ScheduleId,
        from: Option<DateTime<Utc>>,
    ) -> ServiceResult<DateTime<Utc>> {
        let schedule = self.load(schedule_id).await?;
        let from = from.unwrap_or_else(|| self.clock.now());
        Ok(next_occurrence(&schedule.recurrence(), from)?)
    }

    /// ## Summary
    /// Lists the next `count` occurrences of a schedule with their post times.
    ///
    /// ## Errors
    /// Returns `ServiceError::NotFound` for an unknown schedule.
    pub async fn upcoming(&self, schedule_id: ScheduleId, count: usize) -> ServiceResult<Vec<UpcomingPost>> {
        let schedule = self.load(schedule_id).await?;
        occurrences(&schedule.recurrence(), self.clock.now(), count)?
            .into_iter()
            .map(|event_at| -> ServiceResult<UpcomingPost> {
                let post_at = post_time_for(&schedule.post_rule(), schedule.timezone, event_at)?;
                Ok(UpcomingPost { event_at, post_at })
            })
            .collect()
    }

    /// ## Summary
    /// Validates and stores a new schedule.
    ///
    /// ## Side Effects
    /// Saves the schedule and rearms the timer.
    ///
    /// ## Errors
    /// Returns `ServiceError::InvalidScheduleConfig` before anything is stored when
    /// a field is malformed.
    #[tracing::instrument(skip(self, new), fields(channel = %new.channel))]
    pub async fn create_new(&self, new: NewSchedule) -> ServiceResult<Schedule> {
        let schedule = new.validate()?;
        let schedule = self.schedules.save(schedule).await?;
        tracing::info!(schedule_id = %schedule.id, "Schedule created");
        self.rearm().await;
        Ok(schedule)
    }

    /// ## Errors
    /// Returns an error for an unknown timezone or schedule.
    #[tracing::instrument(skip(self))]
    pub async fn set_timezone(&self, schedule_id: ScheduleId, timezone: &str) -> ServiceResult<Schedule> {
        let timezone = resolve_timezone(timezone)?;
        self.update(schedule_id, |s| s.timezone = timezone).await
    }

    /// ## Errors
    /// Returns an error for an unknown cadence or schedule.
    #[tracing::instrument(skip(self))]
    pub async fn set_cadence(&self, schedule_id: ScheduleId, cadence: &str) -> ServiceResult<Schedule> {
        let cadence: Cadence = cadence.parse()?;
        self.update(schedule_id, |s| s.cadence = cadence).await
    }

    /// ## Errors
    /// Returns `ServiceError::NotFound` for an unknown schedule.
    #[tracing::instrument(skip(self))]
    pub async fn set_post_offset(&self, schedule_id: ScheduleId, offset_days: u32) -> ServiceResult<Schedule> {
        self.update(schedule_id, |s| s.post_offset_days = offset_days).await
    }

    /// ## Errors
    /// Returns an error for a malformed time or an unknown schedule.
    #[tracing::instrument(skip(self))]
    pub async fn set_post_time(&self, schedule_id: ScheduleId, time: &str) -> ServiceResult<Schedule> {
        let time = WallTime::parse(time)?;
        self.update(schedule_id, |s| s.post_time = time).await
    }

    /// ## Errors
    /// Returns an error for a malformed weekday or an unknown schedule.
    #[tracing::instrument(skip(self))]
    pub async fn set_event_day(&self, schedule_id: ScheduleId, day: &str) -> ServiceResult<Schedule> {
        let day = parse_weekday(day)?;
        self.update(schedule_id, |s| s.event_day = day).await
    }

    /// ## Errors
    /// Returns an error for a malformed time or an unknown schedule.
    #[tracing::instrument(skip(self))]
    pub async fn set_event_time(&self, schedule_id: ScheduleId, time: &str) -> ServiceResult<Schedule> {
        let time = WallTime::parse(time)?;
        self.update(schedule_id, |s| s.event_time = time).await
    }

    /// ## Errors
    /// Returns `ServiceError::NotFound` for an unknown schedule.
    #[tracing::instrument(skip(self))]
    pub async fn set_log_channel(
        &self,
        schedule_id: ScheduleId,
        channel: Option<ChannelId>,
    ) -> ServiceResult<Schedule> {
        self.update(schedule_id, |s| s.log_channel = channel).await
    }

    /// ## Errors
    /// Returns `ServiceError::NotFound` for an unknown schedule.
    #[tracing::instrument(skip(self))]
    pub async fn link_order(&self, schedule_id: ScheduleId, order: OrderId) -> ServiceResult<Schedule> {
        self.update(schedule_id, |s| s.order = Some(order)).await
    }

    /// ## Errors
    /// Returns `ServiceError::NotFound` for an unknown schedule.
    #[tracing::instrument(skip(self))]
    pub async fn unlink_order(&self, schedule_id: ScheduleId) -> ServiceResult<Schedule> {
        self.update(schedule_id, |s| s.order = None).await
    }

    /// ## Summary
    /// Removes a schedule. Its events are kept.
    ///
    /// ## Errors
    /// Returns `ServiceError::NotFound` for an unknown schedule.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, schedule_id: ScheduleId) -> ServiceResult<()> {
        if !self.schedules.delete_by_id(schedule_id).await? {
            return Err(ServiceError::NotFound(format!("schedule {schedule_id}")));
        }
        tracing::info!("Schedule deleted");
        self.rearm().await;
        Ok(())
    }

    /// ## Summary
    /// Posts the schedule's next event right away instead of waiting for its post time.
    ///
    /// ## Errors
    /// Returns an error if the schedule is unknown or the post fails. The timer is
    /// rearmed either way.
    #[tracing::instrument(skip(self))]
    pub async fn post_now(&self, schedule_id: ScheduleId) -> ServiceResult<Event> {
        let schedule = self.load(schedule_id).await?;
        let result = self.events.create_and_post_next_occurrence(&schedule).await;
        self.rearm().await;
        result
    }

    /// ## Summary
    /// Moves an event to another instant and rearms the timer.
    ///
    /// ## Errors
    /// See [`EventService::set_time`].
    #[tracing::instrument(skip(self))]
    pub async fn move_event(&self, event_id: EventId, at: DateTime<Utc>) -> ServiceResult<Event> {
        let event = self.events.set_time(event_id, at).await?;
        self.rearm().await;
        Ok(event)
    }

    async fn update(
        &self,
        schedule_id: ScheduleId,
        apply: impl FnOnce(&mut Schedule) + Send,
    ) -> ServiceResult<Schedule> {
        let now = self.clock.now();
        let mut rejected = None;
        let schedule = self
            .schedules
            .update(
                schedule_id,
                Box::new(|schedule: &mut Schedule| {
                    apply(schedule);
                    // Nothing is stored if the edit makes the recurrence unusable.
                    match next_occurrence(&schedule.recurrence(), now) {
                        Ok(_) => true,
                        Err(err) => {
                            rejected = Some(err);
                            false
                        }
                    }
                }),
            )
            .await
            .map_err(|err| not_found_as_service(err, schedule_id))?;
        if let Some(err) = rejected {
            return Err(err.into());
        }

        tracing::info!("Schedule updated");
        self.rearm().await;
        Ok(schedule)
    }

    async fn rearm(&self) {
        // The schedule change is already stored; a failed rearm leaves the fallback re-check armed.
        if let Err(err) = self.timer.rearm().await {
            tracing::error!(error = %err, "Rearm after schedule change failed");
        }
    }

    async fn load(&self, schedule_id: ScheduleId) -> ServiceResult<Schedule> {
        self.schedules
            .find_by_id(schedule_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("schedule {schedule_id}")))
    }
}
