//! Wiring of stores, services and the timer into a running bot.

use std::sync::Arc;

use chrono::TimeDelta;

use fnf_core::config::{ScheduleSeed, StorageConfig};
use fnf_db::store::{MemoryStore, ScheduleStore};
use fnf_service::clock::Clock;
use fnf_service::event::{AnnouncementSink, EventService, NoopCalendar};
use fnf_service::schedule::{NewSchedule, ScheduleService};
use fnf_service::task::TaskScheduler;
use fnf_service::timer::RearmingTimer;

use crate::error::AppResult;

/// Everything the chat layer talks to.
pub struct Bot {
    pub store: Arc<MemoryStore>,
    pub events: Arc<EventService>,
    pub schedules: Arc<ScheduleService>,
    pub timer: Arc<RearmingTimer>,
}

impl Bot {
    #[must_use]
    pub fn new(
        store: Arc<MemoryStore>,
        sink: Arc<dyn AnnouncementSink>,
        clock: Arc<dyn Clock>,
        scheduler: Arc<dyn TaskScheduler>,
        recheck_interval: TimeDelta,
    ) -> Self {
        let events = Arc::new(EventService::new(
            store.clone(),
            store.clone(),
            sink,
            Arc::new(NoopCalendar),
            clock.clone(),
        ));
        let timer = RearmingTimer::new(
            store.clone(),
            events.clone(),
            scheduler,
            clock.clone(),
            recheck_interval,
        );
        let schedules = Arc::new(ScheduleService::new(
            store.clone(),
            events.clone(),
            timer.clone(),
            clock,
        ));

        Self {
            store,
            events,
            schedules,
            timer,
        }
    }

    /// ## Summary
    /// Creates the configured schedules when the store holds none yet.
    ///
    /// ## Errors
    /// Returns an error if a seed is malformed or the store fails. Seeds before
    /// the malformed one stay created.
    #[tracing::instrument(skip(self, seeds), fields(seeds = seeds.len()))]
    pub async fn seed(&self, seeds: &[ScheduleSeed]) -> AppResult<usize> {
        let existing = self.store.list_all().await?.len();
        if existing > 0 {
            tracing::debug!(existing, "Store already has schedules, skipping seeds");
            return Ok(0);
        }

        for seed in seeds {
            let schedule = self.schedules.create_new(NewSchedule::from(seed)).await?;
            tracing::info!(schedule_id = %schedule.id, channel = %schedule.channel, "Seeded schedule");
        }
        Ok(seeds.len())
    }
}

/// ## Summary
/// Opens the configured store, in memory only when no path is set.
///
/// ## Errors
/// Returns an error if an existing snapshot cannot be read.
pub async fn open_store(config: &StorageConfig) -> AppResult<Arc<MemoryStore>> {
    let store = match &config.path {
        Some(path) => MemoryStore::open(path).await?,
        None => {
            tracing::warn!("No storage path configured, schedules will not survive a restart");
            MemoryStore::new()
        }
    };
    Ok(Arc::new(store))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discord::DryRunSink;
    use chrono::{TimeZone, Utc};
    use fnf_service::clock::ManualClock;
    use fnf_service::task::TokioTaskScheduler;
    use fnf_service::timer::TimerStatus;

    fn seed(day: &str) -> ScheduleSeed {
        ScheduleSeed {
            channel: 1,
            calendar_user: 2,
            event_day: day.to_string(),
            event_time: "18:00".to_string(),
            timezone: "Europe/Berlin".to_string(),
            message: "Essen!".to_string(),
            post_time: None,
            post_offset_days: None,
            cadence: None,
            log_channel: None,
        }
    }

    fn bot() -> Bot {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap()));
        Bot::new(
            Arc::new(MemoryStore::new()),
            Arc::new(DryRunSink::default()),
            clock.clone(),
            Arc::new(TokioTaskScheduler::new(clock)),
            TimeDelta::hours(1),
        )
    }

    #[test_log::test(tokio::test)]
    async fn seeds_only_an_empty_store() {
        let bot = bot();
        assert_eq!(bot.seed(&[seed("fri"), seed("sat")]).await.unwrap(), 2);
        assert_eq!(bot.seed(&[seed("sun")]).await.unwrap(), 0);
        assert_eq!(bot.store.list_all().await.unwrap().len(), 2);
        assert!(matches!(bot.timer.status().await, TimerStatus::Armed { .. }));
        bot.timer.cancel().await;
    }

    #[test_log::test(tokio::test)]
    async fn malformed_seed_fails_fast() {
        let bot = bot();
        assert!(bot.seed(&[seed("caturday")]).await.is_err());
        assert!(bot.store.list_all().await.unwrap().is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn store_without_path_is_in_memory() {
        let store = open_store(&StorageConfig::default()).await.unwrap();
        assert!(store.list_all().await.unwrap().is_empty());
    }
}
