//! One-shot delayed task primitive the rearming timer is built on.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use tracing_futures::Instrument;

use crate::clock::Clock;

pub type Task = BoxFuture<'static, ()>;

/// Handle to a task that has been scheduled but may not have run yet.
pub trait TaskHandle: Send + Sync {
    /// Prevents the task from starting. Has no effect on a task that is already running.
    fn cancel(&self);
}

pub trait TaskScheduler: Send + Sync {
    /// ## Summary
    /// Runs `task` once at or after `at`. An instant in the past runs as soon as possible.
    fn schedule(&self, at: DateTime<Utc>, task: Task) -> Box<dyn TaskHandle>;
}

/// Schedules tasks on the current tokio runtime.
///
/// The delay is measured against the supplied clock when the task is
/// scheduled. Once the delay elapses the task is spawned on its own, so
/// cancelling the handle never interrupts a task that has started.
pub struct TokioTaskScheduler {
    clock: Arc<dyn Clock>,
}

impl TokioTaskScheduler {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

impl TaskScheduler for TokioTaskScheduler {
    fn schedule(&self, at: DateTime<Utc>, task: Task) -> Box<dyn TaskHandle> {
        let delay = (at - self.clock.now()).to_std().unwrap_or_default();
        tracing::trace!(%at, delay_secs = delay.as_secs(), "Scheduling task");

        let sleeper = tokio::spawn(
            async move {
                tokio::time::sleep(delay).await;
                tokio::spawn(task);
            }
            .instrument(tracing::debug_span!("scheduled_task", %at)),
        );

        Box::new(TokioTaskHandle { sleeper })
    }
}

struct TokioTaskHandle {
    sleeper: tokio::task::JoinHandle<()>,
}

impl TaskHandle for TokioTaskHandle {
    fn cancel(&self) {
        self.sleeper.abort();
    }
}
