#![allow(
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
    clippy::unwrap_used
)]
//! Food & Friends bot - integration test support.
//!
//! Provides a deterministic task scheduler, a recording chat sink and a fully
//! wired bot running on a manual clock.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;

use fnf_app::bootstrap::Bot;
use fnf_core::types::{ChannelId, MessageId};
use fnf_db::model::{Event, Schedule};
use fnf_db::store::MemoryStore;
use fnf_service::clock::{Clock, ManualClock};
use fnf_service::error::{ServiceError, ServiceResult};
use fnf_service::event::{AnnouncementSink, EventMaterializer};
use fnf_service::schedule::NewSchedule;
use fnf_service::task::{Task, TaskHandle, TaskScheduler};

pub use fnf_app;
pub use fnf_core;
pub use fnf_db;
pub use fnf_service;
pub use fnf_time;

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct ScheduledTask {
    at: DateTime<Utc>,
    task: Option<Task>,
    cancelled: Arc<AtomicBool>,
}

struct ManualHandle(Arc<AtomicBool>);

impl TaskHandle for ManualHandle {
    fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Task scheduler that only runs tasks when a test asks it to.
#[derive(Default)]
pub struct ManualScheduler {
    tasks: Mutex<Vec<ScheduledTask>>,
}

impl ManualScheduler {
    /// Targets of tasks that are neither cancelled nor run yet, in scheduling order.
    pub fn outstanding(&self) -> Vec<DateTime<Utc>> {
        lock(&self.tasks)
            .iter()
            .filter(|t| t.task.is_some() && !t.cancelled.load(Ordering::SeqCst))
            .map(|t| t.at)
            .collect()
    }

    /// Total number of tasks ever scheduled.
    pub fn scheduled_count(&self) -> usize {
        lock(&self.tasks).len()
    }

    /// Runs outstanding tasks due at or before `now`, including tasks they schedule.
    pub async fn run_due(&self, now: DateTime<Utc>) -> usize {
        let mut ran = 0;
        loop {
            let task = {
                let mut tasks = lock(&self.tasks);
                tasks
                    .iter_mut()
                    .find(|t| t.at <= now && t.task.is_some() && !t.cancelled.load(Ordering::SeqCst))
                    .and_then(|t| t.task.take())
            };
            let Some(task) = task else {
                return ran;
            };
            task.await;
            ran += 1;
        }
    }

    /// Runs the `index`-th scheduled task even if it was cancelled, as a late
    /// wake-up would.
    pub async fn force_run(&self, index: usize) {
        let task = lock(&self.tasks)[index].task.take();
        if let Some(task) = task {
            task.await;
        }
    }
}

impl TaskScheduler for ManualScheduler {
    fn schedule(&self, at: DateTime<Utc>, task: Task) -> Box<dyn TaskHandle> {
        let cancelled = Arc::new(AtomicBool::new(false));
        lock(&self.tasks).push(ScheduledTask {
            at,
            task: Some(task),
            cancelled: cancelled.clone(),
        });
        Box::new(ManualHandle(cancelled))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub channel: ChannelId,
    pub id: MessageId,
    pub content: String,
}

/// Chat sink that records every call.
#[derive(Default)]
pub struct RecordingSink {
    next_id: AtomicU64,
    sent: Mutex<Vec<SentMessage>>,
    edits: Mutex<Vec<(MessageId, String)>>,
    reactions: Mutex<Vec<MessageId>>,
    deleted: Mutex<Vec<MessageId>>,
    fail_sends: AtomicBool,
}

impl RecordingSink {
    pub fn sent(&self) -> Vec<SentMessage> {
        lock(&self.sent).clone()
    }

    pub fn sent_to(&self, channel: ChannelId) -> Vec<SentMessage> {
        self.sent().into_iter().filter(|m| m.channel == channel).collect()
    }

    pub fn edits(&self) -> Vec<(MessageId, String)> {
        lock(&self.edits).clone()
    }

    pub fn reactions(&self) -> Vec<MessageId> {
        lock(&self.reactions).clone()
    }

    /// Simulates a moderator deleting the message.
    pub fn delete(&self, message: MessageId) {
        lock(&self.deleted).push(message);
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl AnnouncementSink for RecordingSink {
    async fn send_message(&self, channel: ChannelId, content: &str) -> ServiceResult<MessageId> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(ServiceError::AnnouncementError("sink is failing".to_string()));
        }
        let id = MessageId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        lock(&self.sent).push(SentMessage {
            channel,
            id,
            content: content.to_string(),
        });
        Ok(id)
    }

    async fn edit_message(&self, _channel: ChannelId, message: MessageId, content: &str) -> ServiceResult<()> {
        lock(&self.edits).push((message, content.to_string()));
        Ok(())
    }

    async fn message_exists(&self, _channel: ChannelId, message: MessageId) -> ServiceResult<bool> {
        let known = lock(&self.sent).iter().any(|m| m.id == message);
        Ok(known && !lock(&self.deleted).contains(&message))
    }

    async fn add_reaction(&self, _channel: ChannelId, message: MessageId, _emoji: &str) -> ServiceResult<()> {
        lock(&self.reactions).push(message);
        Ok(())
    }
}

/// Materializer that always fails and counts its calls.
#[derive(Default)]
pub struct FailingMaterializer {
    calls: AtomicUsize,
}

impl FailingMaterializer {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventMaterializer for FailingMaterializer {
    async fn create_and_post_next_occurrence(&self, schedule: &Schedule) -> ServiceResult<Event> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ServiceError::AnnouncementError(format!("refusing to post {}", schedule.id)))
    }
}

/// A fully wired bot on a manual clock and a manual scheduler.
pub struct TestBot {
    pub bot: Bot,
    pub clock: Arc<ManualClock>,
    pub scheduler: Arc<ManualScheduler>,
    pub sink: Arc<RecordingSink>,
}

impl TestBot {
    pub fn new(now: DateTime<Utc>) -> Self {
        let clock = Arc::new(ManualClock::new(now));
        let scheduler = Arc::new(ManualScheduler::default());
        let sink = Arc::new(RecordingSink::default());
        let bot = Bot::new(
            Arc::new(MemoryStore::new()),
            sink.clone(),
            clock.clone(),
            scheduler.clone(),
            TimeDelta::hours(1),
        );
        Self {
            bot,
            clock,
            scheduler,
            sink,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Moves the clock to `at` and runs every task that became due.
    pub async fn advance_to(&self, at: DateTime<Utc>) -> usize {
        self.clock.set(at);
        self.scheduler.run_due(at).await
    }
}

/// Converts a Los Angeles wall time to UTC.
pub fn la(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    local(Tz::America__Los_Angeles, year, month, day, hour, minute)
}

pub fn local(tz: Tz, year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    tz.with_ymd_and_hms(year, month, day, hour, minute, 0)
        .single()
        .unwrap()
        .with_timezone(&Utc)
}

/// Weekly Los Angeles schedule posting at 09:00 `offset_days` before the event.
pub fn weekly_la(channel: u64, day: &str, time: &str, offset_days: u32) -> NewSchedule {
    NewSchedule {
        channel: ChannelId(channel),
        calendar_user: fnf_core::types::UserId(channel + 1000),
        event_day: day.to_string(),
        event_time: time.to_string(),
        timezone: "America/Los_Angeles".to_string(),
        message: format!("Food & Friends in channel {channel}"),
        post_time: Some("09:00".to_string()),
        post_offset_days: Some(offset_days),
        cadence: None,
        log_channel: None,
    }
}
