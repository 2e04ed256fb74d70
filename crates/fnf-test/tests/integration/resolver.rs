//! Next-post resolution against live schedules.

use fnf_service::resolver::Exclusion;
use fnf_test::{TestBot, la, weekly_la};

/// ## Summary
/// A schedule whose announcement is out and whose event has not happened yet is
/// excluded, even when its next computed post time would be the earliest.
#[test_log::test(tokio::test)]
async fn schedule_with_live_active_event_is_excluded() {
    let t = TestBot::new(la(2024, 6, 1, 12, 0));
    let a = t.bot.schedules.create_new(weekly_la(1, "mon", "18:00", 6)).await.unwrap();
    let b = t.bot.schedules.create_new(weekly_la(2, "wed", "18:00", 0)).await.unwrap();

    let event = t.bot.schedules.post_now(a.id).await.unwrap();
    assert_eq!(event.occurs_at, la(2024, 6, 3, 18, 0));

    let resolution = t.bot.schedules.candidates().await.unwrap();
    let excluded = resolution
        .candidates
        .iter()
        .find(|c| c.schedule.id == a.id)
        .unwrap();
    assert_eq!(
        excluded.exclusion,
        Some(Exclusion::ActiveEventPending {
            until: la(2024, 6, 3, 18, 0)
        })
    );
    // Searched from the active event: the June 10 event posts on June 4.
    assert_eq!(excluded.timing.unwrap().post_at, la(2024, 6, 4, 9, 0));

    let next = t.bot.schedules.next_post_time().await.unwrap().unwrap();
    assert_eq!(next.schedule.id, b.id);
    assert_eq!(next.post_at, la(2024, 6, 5, 9, 0));
}

#[test_log::test(tokio::test)]
async fn schedule_becomes_eligible_once_its_event_passes() {
    let t = TestBot::new(la(2024, 6, 1, 12, 0));
    let a = t.bot.schedules.create_new(weekly_la(1, "mon", "18:00", 1)).await.unwrap();
    t.bot.schedules.post_now(a.id).await.unwrap();
    assert_eq!(t.bot.schedules.next_post_time().await.unwrap(), None);

    t.clock.set(la(2024, 6, 3, 18, 0));
    let next = t.bot.schedules.next_post_time().await.unwrap().unwrap();
    assert_eq!(next.schedule.id, a.id);
    assert_eq!(next.event_at, la(2024, 6, 10, 18, 0));
    assert_eq!(next.post_at, la(2024, 6, 9, 9, 0));
}

#[test_log::test(tokio::test)]
async fn past_post_time_is_not_a_candidate() {
    // The Monday event is two days out but a six day offset already passed.
    let t = TestBot::new(la(2024, 6, 1, 12, 0));
    let a = t.bot.schedules.create_new(weekly_la(1, "mon", "18:00", 6)).await.unwrap();

    let resolution = t.bot.schedules.candidates().await.unwrap();
    assert_eq!(
        resolution.candidates[0].exclusion,
        Some(Exclusion::PostTimeNotInFuture)
    );
    assert_eq!(resolution.candidates[0].schedule.id, a.id);
    assert_eq!(resolution.next_post(), None);
}
