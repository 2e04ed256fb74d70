//! Rearming: one outstanding timer that always targets the current minimum.

use chrono::TimeDelta;

use fnf_core::types::OrderId;
use fnf_service::timer::{TimerPurpose, TimerStatus};
use fnf_test::{TestBot, la, local, weekly_la};

/// Saturday 2024-06-01 12:00 in Los Angeles.
fn start() -> chrono::DateTime<chrono::Utc> {
    la(2024, 6, 1, 12, 0)
}

#[test_log::test(tokio::test)]
async fn zero_schedules_fall_back_to_hourly_recheck() {
    let t = TestBot::new(start());
    assert_eq!(t.bot.schedules.next_post_time().await.unwrap(), None);

    t.bot.timer.start().await.unwrap();
    assert_eq!(t.scheduler.outstanding(), vec![start() + TimeDelta::hours(1)]);

    assert_eq!(t.advance_to(start() + TimeDelta::hours(1)).await, 1);
    assert_eq!(t.scheduler.outstanding(), vec![start() + TimeDelta::hours(2)]);
    assert_eq!(
        t.bot.timer.status().await,
        TimerStatus::Armed {
            target: start() + TimeDelta::hours(2),
            purpose: TimerPurpose::Recheck
        }
    );
}

/// ## Summary
/// Two concurrent timezone edits, one of which moves the global minimum earlier,
/// leave exactly one timer armed for the new minimum.
#[test_log::test(tokio::test)]
async fn concurrent_edits_leave_one_timer_on_new_minimum() {
    let t = TestBot::new(start());
    let a = t.bot.schedules.create_new(weekly_la(1, "mon", "18:00", 1)).await.unwrap();
    let b = t.bot.schedules.create_new(weekly_la(2, "tue", "18:00", 1)).await.unwrap();
    t.bot.timer.start().await.unwrap();
    assert_eq!(t.scheduler.outstanding(), vec![la(2024, 6, 2, 9, 0)]);

    let (ra, rb) = futures::join!(
        t.bot.schedules.set_timezone(a.id, "Asia/Tokyo"),
        t.bot.schedules.set_timezone(b.id, "America/New_York"),
    );
    ra.unwrap();
    rb.unwrap();

    // Monday 18:00 in Tokyo posts Sunday 09:00 JST, Saturday 17:00 in Los Angeles.
    let tokyo_post = local(chrono_tz::Tz::Asia__Tokyo, 2024, 6, 2, 9, 0);
    assert_eq!(tokyo_post, la(2024, 6, 1, 17, 0));
    assert_eq!(t.scheduler.outstanding(), vec![tokyo_post]);
    assert_eq!(
        t.bot.timer.status().await,
        TimerStatus::Armed {
            target: tokyo_post,
            purpose: TimerPurpose::Post(a.id)
        }
    );
}

#[test_log::test(tokio::test)]
async fn edit_that_delays_the_armed_post_replaces_it() {
    let t = TestBot::new(start());
    let a = t.bot.schedules.create_new(weekly_la(1, "mon", "18:00", 1)).await.unwrap();
    t.bot.timer.start().await.unwrap();
    assert_eq!(t.scheduler.outstanding(), vec![la(2024, 6, 2, 9, 0)]);

    t.bot.schedules.set_post_time(a.id, "11:00").await.unwrap();
    assert_eq!(t.scheduler.outstanding(), vec![la(2024, 6, 2, 11, 0)]);
}

#[test_log::test(tokio::test)]
async fn unrelated_edit_keeps_the_armed_timer() {
    let t = TestBot::new(start());
    let a = t.bot.schedules.create_new(weekly_la(1, "mon", "18:00", 1)).await.unwrap();
    let b = t.bot.schedules.create_new(weekly_la(2, "fri", "18:00", 1)).await.unwrap();
    t.bot.timer.start().await.unwrap();
    let before = t.scheduler.scheduled_count();

    t.bot.schedules.set_post_offset(b.id, 2).await.unwrap();
    t.bot.schedules.link_order(a.id, OrderId("weekly-order".to_string())).await.unwrap();

    assert_eq!(t.scheduler.scheduled_count(), before);
    assert_eq!(t.scheduler.outstanding(), vec![la(2024, 6, 2, 9, 0)]);
}

#[test_log::test(tokio::test)]
async fn cancelled_timer_firing_late_is_ignored() {
    let t = TestBot::new(start());
    t.bot.schedules.create_new(weekly_la(1, "tue", "18:00", 1)).await.unwrap();
    t.bot.timer.start().await.unwrap();
    t.bot.schedules.create_new(weekly_la(2, "mon", "18:00", 1)).await.unwrap();

    let scheduled = t.scheduler.scheduled_count();
    // Run every task that was ever scheduled, cancelled ones included.
    for index in 0..scheduled - 1 {
        t.scheduler.force_run(index).await;
    }

    assert!(t.sink.sent().is_empty());
    assert_eq!(t.scheduler.outstanding(), vec![la(2024, 6, 2, 9, 0)]);
    assert_eq!(t.scheduler.scheduled_count(), scheduled);
}

#[test_log::test(tokio::test)]
async fn cancel_leaves_nothing_armed() {
    let t = TestBot::new(start());
    t.bot.schedules.create_new(weekly_la(1, "mon", "18:00", 1)).await.unwrap();
    t.bot.timer.start().await.unwrap();

    t.bot.timer.cancel().await;
    assert!(t.scheduler.outstanding().is_empty());
    assert_eq!(t.bot.timer.status().await, TimerStatus::Idle);
}

/// ## Summary
/// A schedule whose post time already passed is re-checked when its skipped
/// occurrence goes by, even while another schedule holds the armed post.
#[test_log::test(tokio::test)]
async fn skipped_schedule_is_not_starved_by_another_post() {
    let t = TestBot::new(start());
    let a = t.bot.schedules.create_new(weekly_la(1, "mon", "18:00", 6)).await.unwrap();
    let b = t.bot.schedules.create_new(weekly_la(2, "fri", "18:00", 0)).await.unwrap();
    t.bot.timer.start().await.unwrap();

    // Monday's post for June 3 was May 28; wake up when that event passes.
    assert_eq!(
        t.bot.timer.status().await,
        TimerStatus::Armed {
            target: la(2024, 6, 3, 18, 0),
            purpose: TimerPurpose::Recheck
        }
    );

    t.advance_to(la(2024, 6, 3, 18, 0)).await;
    assert_eq!(
        t.bot.timer.status().await,
        TimerStatus::Armed {
            target: la(2024, 6, 4, 9, 0),
            purpose: TimerPurpose::Post(a.id)
        }
    );

    let mut at = la(2024, 6, 3, 18, 0);
    while at < la(2024, 6, 30, 0, 0) {
        at += TimeDelta::hours(1);
        t.advance_to(at).await;
    }

    // Monday events June 10 through July 1, Friday events June 7 through 28.
    assert_eq!(t.sink.sent_to(a.channel).len(), 4);
    assert_eq!(t.sink.sent_to(b.channel).len(), 4);
}
