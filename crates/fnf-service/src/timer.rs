//! The single self-rescheduling timer that drives announcements.
//!
//! Exactly one task is outstanding at any time. Every mutation and every firing
//! calls [`RearmingTimer::rearm`], which re-reads all schedules, decides the next
//! instant worth waking up for and replaces the outstanding task when needed.

use std::fmt;
use std::sync::{Arc, Weak};

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::Mutex;

use fnf_core::types::ScheduleId;
use fnf_db::store::ScheduleStore;

use crate::clock::Clock;
use crate::error::ServiceResult;
use crate::event::EventMaterializer;
use crate::resolver::{Resolution, resolve};
use crate::task::{Task, TaskHandle, TaskScheduler};

/// What an armed timer does when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerPurpose {
    /// Materialize and announce the schedule's next event.
    Post(ScheduleId),
    /// Only re-evaluate the schedules.
    Recheck,
}

impl fmt::Display for TimerPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Post(id) => write!(f, "post({id})"),
            Self::Recheck => f.write_str("recheck"),
        }
    }
}

/// Read-only view of the timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerStatus {
    Idle,
    Armed {
        target: DateTime<Utc>,
        purpose: TimerPurpose,
    },
    Firing,
}

struct ArmedTimer {
    target: DateTime<Utc>,
    purpose: TimerPurpose,
    generation: u64,
    handle: Box<dyn TaskHandle>,
}

enum TimerState {
    Idle,
    Armed(ArmedTimer),
    Firing,
}

struct TimerInner {
    state: TimerState,
    generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Plan {
    target: DateTime<Utc>,
    purpose: TimerPurpose,
    /// Set when some schedule has an eligible post.
    has_candidate: bool,
}

pub struct RearmingTimer {
    schedules: Arc<dyn ScheduleStore>,
    materializer: Arc<dyn EventMaterializer>,
    scheduler: Arc<dyn TaskScheduler>,
    clock: Arc<dyn Clock>,
    recheck_interval: TimeDelta,
    inner: Mutex<TimerInner>,
    this: Weak<RearmingTimer>,
}

impl RearmingTimer {
    #[must_use]
    pub fn new(
        schedules: Arc<dyn ScheduleStore>,
        materializer: Arc<dyn EventMaterializer>,
        scheduler: Arc<dyn TaskScheduler>,
        clock: Arc<dyn Clock>,
        recheck_interval: TimeDelta,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            schedules,
            materializer,
            scheduler,
            clock,
            recheck_interval,
            inner: Mutex::new(TimerInner {
                state: TimerState::Idle,
                generation: 0,
            }),
            this: this.clone(),
        })
    }

    /// ## Summary
    /// Arms the first timer. Called once the chat connection is ready.
    ///
    /// ## Errors
    /// Returns an error if the schedules cannot be read. A fallback re-check is
    /// armed in that case.
    #[tracing::instrument(skip(self))]
    pub async fn start(&self) -> ServiceResult<()> {
        tracing::info!("Scheduler ready, arming first timer");
        self.rearm().await
    }

    /// ## Summary
    /// Recomputes the next firing from the stored schedules and replaces the armed
    /// timer if it no longer matches.
    ///
    /// The armed timer is kept only while it is a post for the eligible schedule
    /// that still yields exactly its target and nothing earlier is due. Without
    /// any eligible schedule a re-check is armed after the configured interval.
    /// A re-check goes first whenever an excluded schedule can become eligible
    /// earlier: its pending active event expires or its skipped occurrence passes.
    ///
    /// ## Side Effects
    /// Cancels the outstanding task before scheduling its replacement.
    ///
    /// ## Errors
    /// Returns an error if the schedules cannot be read. A fallback re-check is
    /// armed when nothing else is.
    #[tracing::instrument(skip(self))]
    pub async fn rearm(&self) -> ServiceResult<()> {
        let mut inner = self.inner.lock().await;
        let now = self.clock.now();

        let resolution = match resolve(self.schedules.as_ref(), now).await {
            Ok(resolution) => resolution,
            Err(err) => {
                tracing::error!(error = %err, "Failed to resolve next post");
                if !matches!(inner.state, TimerState::Armed(_)) {
                    let target = self.fallback_target(now);
                    self.arm(&mut inner, target, TimerPurpose::Recheck);
                }
                return Err(err);
            }
        };

        let plan = self.plan(&resolution, now);
        if let TimerState::Armed(armed) = &inner.state
            && Self::keeps(armed, &plan, &resolution)
        {
            tracing::debug!(at = %armed.target, purpose = %armed.purpose, "Armed timer is still current");
            return Ok(());
        }

        if let TimerState::Armed(old) = std::mem::replace(&mut inner.state, TimerState::Idle) {
            tracing::debug!(at = %old.target, purpose = %old.purpose, "Cancelling armed timer");
            old.handle.cancel();
        }
        self.arm(&mut inner, plan.target, plan.purpose);
        Ok(())
    }

    /// ## Summary
    /// Cancels the outstanding task and leaves the timer idle.
    #[tracing::instrument(skip(self))]
    pub async fn cancel(&self) {
        let mut inner = self.inner.lock().await;
        if let TimerState::Armed(armed) = std::mem::replace(&mut inner.state, TimerState::Idle) {
            armed.handle.cancel();
            tracing::info!(at = %armed.target, purpose = %armed.purpose, "Timer cancelled");
        }
    }

    pub async fn status(&self) -> TimerStatus {
        match &self.inner.lock().await.state {
            TimerState::Idle => TimerStatus::Idle,
            TimerState::Armed(armed) => TimerStatus::Armed {
                target: armed.target,
                purpose: armed.purpose,
            },
            TimerState::Firing => TimerStatus::Firing,
        }
    }

    fn plan(&self, resolution: &Resolution, now: DateTime<Utc>) -> Plan {
        let wakeup = resolution.earliest_wakeup();
        match resolution.next_post() {
            // An excluded schedule coming back first may be due before `next`.
            Some(next) => match wakeup {
                Some(until) if until < next.post_at => Plan {
                    target: until,
                    purpose: TimerPurpose::Recheck,
                    has_candidate: true,
                },
                _ => Plan {
                    target: next.post_at,
                    purpose: TimerPurpose::Post(next.schedule.id),
                    has_candidate: true,
                },
            },
            None => {
                let fallback = self.fallback_target(now);
                Plan {
                    target: wakeup.map_or(fallback, |until| until.min(fallback)),
                    purpose: TimerPurpose::Recheck,
                    has_candidate: false,
                }
            }
        }
    }

    fn keeps(armed: &ArmedTimer, plan: &Plan, resolution: &Resolution) -> bool {
        if !plan.has_candidate || armed.target > plan.target {
            return false;
        }
        match armed.purpose {
            TimerPurpose::Post(id) => resolution.eligible_post_at(id) == Some(armed.target),
            TimerPurpose::Recheck => false,
        }
    }

    fn fallback_target(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_add_signed(self.recheck_interval)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    fn arm(&self, inner: &mut TimerInner, target: DateTime<Utc>, purpose: TimerPurpose) {
        inner.generation += 1;
        let generation = inner.generation;

        let timer = self.this.clone();
        let task: Task = Box::pin(async move {
            if let Some(timer) = timer.upgrade() {
                timer.fire(generation).await;
            }
        });
        let handle = self.scheduler.schedule(target, task);

        tracing::info!(at = %target, %purpose, generation, "Timer armed");
        inner.state = TimerState::Armed(ArmedTimer {
            target,
            purpose,
            generation,
            handle,
        });
    }

    #[tracing::instrument(skip(self))]
    async fn fire(&self, generation: u64) {
        let purpose = {
            let mut inner = self.inner.lock().await;
            let purpose = match &inner.state {
                TimerState::Armed(armed) if armed.generation == generation => armed.purpose,
                _ => {
                    tracing::debug!("Timer was superseded before it fired");
                    return;
                }
            };
            inner.state = TimerState::Firing;
            purpose
        };

        tracing::info!(%purpose, "Timer fired");
        if let TimerPurpose::Post(schedule_id) = purpose {
            self.post(schedule_id).await;
        }

        if let Err(err) = self.rearm().await {
            tracing::error!(error = %err, "Rearm after firing failed");
        }
    }

    async fn post(&self, schedule_id: ScheduleId) {
        let schedule = match self.schedules.find_by_id(schedule_id).await {
            Ok(Some(schedule)) => schedule,
            Ok(None) => {
                tracing::warn!(%schedule_id, "Schedule was deleted before its post fired");
                return;
            }
            Err(err) => {
                tracing::error!(%schedule_id, error = %err, "Failed to load schedule for post");
                return;
            }
        };

        match self.materializer.create_and_post_next_occurrence(&schedule).await {
            Ok(event) => tracing::info!(
                %schedule_id,
                event_id = %event.id,
                occurs_at = %event.occurs_at,
                "Posted scheduled event"
            ),
            Err(err) => tracing::error!(%schedule_id, error = %err, "Failed to post scheduled event"),
        }
    }
}
