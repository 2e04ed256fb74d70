//! Timer firings: materialization, failure handling and the rearm that follows.

use std::sync::Arc;

use chrono::TimeDelta;

use fnf_core::types::ChannelId;
use fnf_db::store::{EventStore, MemoryStore, ScheduleStore};
use fnf_service::clock::ManualClock;
use fnf_service::timer::{RearmingTimer, TimerPurpose, TimerStatus};
use fnf_test::{FailingMaterializer, ManualScheduler, TestBot, la, weekly_la};

#[test_log::test(tokio::test)]
async fn weekly_cycle_posts_once_per_occurrence() {
    let t = TestBot::new(la(2024, 6, 1, 12, 0));
    let a = t.bot.schedules.create_new(weekly_la(1, "mon", "18:00", 1)).await.unwrap();
    t.bot.schedules.set_log_channel(a.id, Some(ChannelId(900))).await.unwrap();
    t.bot.timer.start().await.unwrap();

    // Sunday 09:00: the announcement goes out.
    assert_eq!(t.advance_to(la(2024, 6, 2, 9, 0)).await, 1);
    let announcements = t.sink.sent_to(ChannelId(1));
    assert_eq!(announcements.len(), 1);
    assert_eq!(announcements[0].content, "Food & Friends in channel 1");
    assert_eq!(t.sink.reactions(), vec![announcements[0].id]);

    let log = t.sink.sent_to(ChannelId(900));
    assert_eq!(log.len(), 1);
    assert_eq!(
        log[0].content,
        format!("<t:{}>: No Location Set", la(2024, 6, 3, 18, 0).timestamp())
    );

    // Pending until the event; nothing else to do but re-check.
    assert_eq!(
        t.bot.timer.status().await,
        TimerStatus::Armed {
            target: la(2024, 6, 2, 10, 0),
            purpose: TimerPurpose::Recheck
        }
    );

    // Through the event: the next week's post gets armed.
    t.advance_to(la(2024, 6, 3, 18, 0)).await;
    assert_eq!(
        t.bot.timer.status().await,
        TimerStatus::Armed {
            target: la(2024, 6, 9, 9, 0),
            purpose: TimerPurpose::Post(a.id)
        }
    );

    t.advance_to(la(2024, 6, 9, 9, 0)).await;
    assert_eq!(t.sink.sent_to(ChannelId(1)).len(), 2);

    let events = t.bot.store.list_for_schedule(a.id).await.unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].occurs_at, la(2024, 6, 10, 18, 0));
}

#[test_log::test(tokio::test)]
async fn repeated_materialization_reuses_the_event() {
    let t = TestBot::new(la(2024, 6, 1, 12, 0));
    let a = t.bot.schedules.create_new(weekly_la(1, "mon", "18:00", 1)).await.unwrap();

    let first = t.bot.events.create_next_event(&a).await.unwrap();
    let second = t.bot.events.create_next_event(&a).await.unwrap();
    assert_eq!(first.id, second.id);

    let posted = t.bot.schedules.post_now(a.id).await.unwrap();
    let reposted = t.bot.schedules.post_now(a.id).await.unwrap();
    assert_eq!(posted.id, first.id);
    assert_eq!(reposted.id, first.id);
    assert_eq!(t.sink.sent_to(ChannelId(1)).len(), 1);
    assert_eq!(t.bot.store.list_for_schedule(a.id).await.unwrap().len(), 1);
}

#[test_log::test(tokio::test)]
async fn deleted_announcement_is_reposted() {
    let t = TestBot::new(la(2024, 6, 1, 12, 0));
    let a = t.bot.schedules.create_new(weekly_la(1, "mon", "18:00", 1)).await.unwrap();

    let posted = t.bot.schedules.post_now(a.id).await.unwrap();
    t.sink.delete(posted.discord_message_id.unwrap());

    let reposted = t.bot.schedules.post_now(a.id).await.unwrap();
    assert_eq!(reposted.id, posted.id);
    assert_ne!(reposted.discord_message_id, posted.discord_message_id);
    assert_eq!(t.sink.sent_to(ChannelId(1)).len(), 2);

    let found = t
        .bot
        .events
        .find_by_message(reposted.discord_message_id.unwrap())
        .await
        .unwrap();
    assert_eq!(found.map(|e| e.id), Some(posted.id));
}

#[test_log::test(tokio::test)]
async fn deleted_schedule_firing_is_skipped() {
    let t = TestBot::new(la(2024, 6, 1, 12, 0));
    let a = t.bot.schedules.create_new(weekly_la(1, "mon", "18:00", 1)).await.unwrap();
    t.bot.timer.start().await.unwrap();

    // Removed behind the service's back, so the armed post still points at it.
    assert!(t.bot.store.delete_by_id(a.id).await.unwrap());
    assert_eq!(t.scheduler.outstanding(), vec![la(2024, 6, 2, 9, 0)]);

    assert_eq!(t.advance_to(la(2024, 6, 2, 9, 0)).await, 1);
    assert!(t.sink.sent().is_empty());
    assert_eq!(t.scheduler.outstanding(), vec![la(2024, 6, 2, 10, 0)]);
}

#[test_log::test(tokio::test)]
async fn failed_materialization_still_rearms() {
    let store = Arc::new(MemoryStore::new());
    let materializer = Arc::new(FailingMaterializer::default());
    let scheduler = Arc::new(ManualScheduler::default());
    let clock = Arc::new(ManualClock::new(la(2024, 6, 1, 12, 0)));
    let timer = RearmingTimer::new(
        store.clone(),
        materializer.clone(),
        scheduler.clone(),
        clock.clone(),
        TimeDelta::hours(1),
    );

    let schedule = weekly_la(1, "mon", "18:00", 1).validate().unwrap();
    ScheduleStore::save(store.as_ref(), schedule.clone()).await.unwrap();
    timer.start().await.unwrap();

    let post_at = la(2024, 6, 2, 9, 0);
    clock.set(post_at);
    assert_eq!(scheduler.run_due(post_at).await, 1);

    assert_eq!(materializer.calls(), 1);
    assert_eq!(
        timer.status().await,
        TimerStatus::Armed {
            target: post_at + TimeDelta::hours(1),
            purpose: TimerPurpose::Recheck
        }
    );
    assert_eq!(scheduler.outstanding(), vec![post_at + TimeDelta::hours(1)]);
}

#[test_log::test(tokio::test)]
async fn failed_announcement_keeps_the_timer_alive() {
    let t = TestBot::new(la(2024, 6, 1, 12, 0));
    let a = t.bot.schedules.create_new(weekly_la(1, "mon", "18:00", 1)).await.unwrap();
    t.bot.timer.start().await.unwrap();
    t.sink.fail_sends(true);

    assert_eq!(t.advance_to(la(2024, 6, 2, 9, 0)).await, 1);
    assert!(t.sink.sent().is_empty());

    // The event exists and is active even though it was never announced.
    let events = t.bot.store.list_for_schedule(a.id).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].discord_message_id, None);
    assert!(matches!(t.bot.timer.status().await, TimerStatus::Armed { .. }));

    // A manual retry announces the same event.
    t.sink.fail_sends(false);
    let retried = t.bot.schedules.post_now(a.id).await.unwrap();
    assert_eq!(retried.id, events[0].id);
    assert_eq!(t.sink.sent_to(ChannelId(1)).len(), 1);
    assert!(EventStore::find_by_id(t.bot.store.as_ref(), retried.id)
        .await
        .unwrap()
        .unwrap()
        .discord_message_id
        .is_some());
}

/// ## Summary
/// Posting and editing the same schedule at once keeps both writes: the active
/// event set by the post and every edited field.
#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
async fn concurrent_post_and_edits_keep_every_write() {
    for _ in 0..20 {
        let t = TestBot::new(la(2024, 6, 1, 12, 0));
        let id = t.bot.schedules.create_new(weekly_la(1, "mon", "18:00", 1)).await.unwrap().id;

        let posting = tokio::spawn({
            let schedules = t.bot.schedules.clone();
            async move { schedules.post_now(id).await }
        });
        let retiming = tokio::spawn({
            let schedules = t.bot.schedules.clone();
            async move { schedules.set_post_time(id, "10:30").await }
        });
        let recadencing = tokio::spawn({
            let schedules = t.bot.schedules.clone();
            async move { schedules.set_cadence(id, "FIRST_OF_MONTH").await }
        });

        let event = posting.await.unwrap().unwrap();
        retiming.await.unwrap().unwrap();
        recadencing.await.unwrap().unwrap();

        let stored = ScheduleStore::find_by_id(t.bot.store.as_ref(), id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.active_event.map(|active| active.event_id), Some(event.id));
        assert_eq!(stored.post_time.to_string(), "10:30");
        assert_eq!(stored.cadence, fnf_time::Cadence::FirstOfMonth);
    }
}
