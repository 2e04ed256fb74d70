//! In-process store with an optional JSON snapshot on disk.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use fnf_core::types::{EventId, MessageId, ScheduleId};

use super::{EventStore, ScheduleEdit, ScheduleStore};
use crate::error::{DbError, DbResult};
use crate::model::{Event, Schedule};

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct StoreState {
    schedules: BTreeMap<ScheduleId, Schedule>,
    events: BTreeMap<EventId, Event>,
}

/// Holds schedules and events in memory. When opened with a path, every write
/// rewrites the snapshot file and becomes visible only once that succeeded.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<StoreState>,
    snapshot: Option<PathBuf>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// ## Summary
    /// Opens a store backed by the snapshot at `path`, loading it if it exists.
    ///
    /// ## Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    #[tracing::instrument]
    pub async fn open(path: impl AsRef<Path> + std::fmt::Debug) -> DbResult<Self> {
        let path = path.as_ref().to_path_buf();
        let state = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<StoreState>(&bytes)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "No snapshot found, starting empty");
                StoreState::default()
            }
            Err(err) => return Err(err.into()),
        };

        tracing::info!(
            schedules = state.schedules.len(),
            events = state.events.len(),
            "Store opened"
        );

        Ok(Self {
            state: RwLock::new(state),
            snapshot: Some(path),
        })
    }

    /// ## Summary
    /// Runs `edit` against a copy of the state under the write lock. The copy
    /// replaces the state only when `edit` reports a change and the snapshot
    /// holding it was written.
    ///
    /// ## Errors
    /// Returns the error of `edit` or of the snapshot write. The state is
    /// unchanged in both cases.
    async fn commit<T, F>(&self, edit: F) -> DbResult<T>
    where
        F: FnOnce(&mut StoreState) -> DbResult<(T, bool)> + Send,
        T: Send,
    {
        let mut state = self.state.write().await;
        let mut next = state.clone();
        let (value, changed) = edit(&mut next)?;
        if changed {
            self.persist(&next).await?;
            *state = next;
        }
        Ok(value)
    }

    async fn persist(&self, state: &StoreState) -> DbResult<()> {
        let Some(path) = &self.snapshot else {
            return Ok(());
        };

        let bytes = serde_json::to_vec_pretty(state)?;
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        tracing::trace!(path = %path.display(), "Snapshot written");
        Ok(())
    }
}

#[async_trait]
impl ScheduleStore for MemoryStore {
    async fn list_all(&self) -> DbResult<Vec<Schedule>> {
        Ok(self.state.read().await.schedules.values().cloned().collect())
    }

    async fn find_by_id(&self, id: ScheduleId) -> DbResult<Option<Schedule>> {
        Ok(self.state.read().await.schedules.get(&id).cloned())
    }

    async fn save(&self, schedule: Schedule) -> DbResult<Schedule> {
        self.commit(move |state| {
            state.schedules.insert(schedule.id, schedule.clone());
            Ok((schedule, true))
        })
        .await
    }

    async fn update<'a>(&'a self, id: ScheduleId, edit: ScheduleEdit<'a>) -> DbResult<Schedule> {
        self.commit(move |state| {
            let schedule = state
                .schedules
                .get_mut(&id)
                .ok_or_else(|| DbError::NotFound(format!("schedule {id}")))?;
            let before = schedule.clone();
            if edit(schedule) {
                Ok((schedule.clone(), true))
            } else {
                Ok((before, false))
            }
        })
        .await
    }

    async fn delete_by_id(&self, id: ScheduleId) -> DbResult<bool> {
        self.commit(move |state| {
            let removed = state.schedules.remove(&id).is_some();
            Ok((removed, removed))
        })
        .await
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn find_by_id(&self, id: EventId) -> DbResult<Option<Event>> {
        Ok(self.state.read().await.events.get(&id).cloned())
    }

    async fn find_by_schedule_and_date(
        &self,
        schedule_id: ScheduleId,
        local_date: NaiveDateTime,
    ) -> DbResult<Option<Event>> {
        Ok(self
            .state
            .read()
            .await
            .events
            .values()
            .find(|event| event.schedule_id == schedule_id && event.local_date == local_date)
            .cloned())
    }

    async fn find_by_message_id(&self, message_id: MessageId) -> DbResult<Option<Event>> {
        Ok(self
            .state
            .read()
            .await
            .events
            .values()
            .find(|event| event.discord_message_id == Some(message_id))
            .cloned())
    }

    async fn list_for_schedule(&self, schedule_id: ScheduleId) -> DbResult<Vec<Event>> {
        let mut events: Vec<Event> = self
            .state
            .read()
            .await
            .events
            .values()
            .filter(|event| event.schedule_id == schedule_id)
            .cloned()
            .collect();
        events.sort_by_key(|event| event.occurs_at);
        Ok(events)
    }

    async fn find_or_create(&self, event: Event) -> DbResult<(Event, bool)> {
        self.commit(move |state| {
            if let Some(existing) = state
                .events
                .values()
                .find(|e| e.schedule_id == event.schedule_id && e.local_date == event.local_date)
            {
                return Ok(((existing.clone(), false), false));
            }

            state.events.insert(event.id, event.clone());
            Ok(((event, true), true))
        })
        .await
    }

    async fn save(&self, event: Event) -> DbResult<Event> {
        self.commit(move |state| {
            state.events.insert(event.id, event.clone());
            Ok((event, true))
        })
        .await
    }
}
