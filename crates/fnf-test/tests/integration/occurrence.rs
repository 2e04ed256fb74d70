//! Occurrence and post-time calculations as seen through the schedule service.

use chrono::{DateTime, FixedOffset, TimeZone, Utc};

use fnf_test::{TestBot, la, weekly_la};

fn pacific(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    FixedOffset::west_opt(7 * 3600)
        .unwrap()
        .with_ymd_and_hms(y, m, d, h, 0, 0)
        .unwrap()
        .with_timezone(&Utc)
}

/// ## Summary
/// Saturday evening in Los Angeles is already Sunday in UTC; the next Monday is
/// still the one two days later.
#[test_log::test(tokio::test)]
async fn next_occurrence_uses_schedule_timezone() {
    let t = TestBot::new(la(2024, 5, 20, 12, 0));
    let schedule = t.bot.schedules.create_new(weekly_la(1, "MONDAY", "18:00", 6)).await.unwrap();

    let reference = Utc.with_ymd_and_hms(2024, 5, 26, 1, 0, 0).unwrap();
    let next = t
        .bot
        .schedules
        .next_occurrence(schedule.id, Some(reference))
        .await
        .unwrap();

    assert_eq!(next, pacific(2024, 5, 27, 18));
}

#[test_log::test(tokio::test)]
async fn post_time_is_offset_days_before_at_post_time() {
    // Just after the Monday 2024-05-27 event.
    let t = TestBot::new(la(2024, 5, 27, 19, 0));
    let schedule = t.bot.schedules.create_new(weekly_la(1, "monday", "18:00", 6)).await.unwrap();

    let upcoming = t.bot.schedules.upcoming(schedule.id, 1).await.unwrap();
    assert_eq!(upcoming[0].event_at, la(2024, 6, 3, 18, 0));
    assert_eq!(upcoming[0].post_at, la(2024, 5, 28, 9, 0));
}

#[test_log::test(tokio::test)]
async fn first_of_month_rolls_into_next_month() {
    let t = TestBot::new(la(2024, 6, 1, 12, 0));
    let schedule = t.bot.schedules.create_new(weekly_la(1, "friday", "19:00", 6)).await.unwrap();
    t.bot.schedules.set_cadence(schedule.id, "first_of_month").await.unwrap();

    // Second Friday of June 2024.
    let next = t
        .bot
        .schedules
        .next_occurrence(schedule.id, Some(la(2024, 6, 14, 12, 0)))
        .await
        .unwrap();
    assert_eq!(next, la(2024, 7, 5, 19, 0));
}

#[test_log::test(tokio::test)]
async fn occurrences_are_strictly_increasing() {
    let t = TestBot::new(la(2024, 1, 1, 0, 0));
    let schedule = t.bot.schedules.create_new(weekly_la(1, "sun", "02:30", 0)).await.unwrap();

    // Covers both DST transitions of 2024.
    let upcoming = t.bot.schedules.upcoming(schedule.id, 60).await.unwrap();
    let mut previous = t.now();
    for post in upcoming {
        assert!(post.event_at > previous);
        previous = post.event_at;
    }
}
