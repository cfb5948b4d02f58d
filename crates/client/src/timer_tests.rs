// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

#[test]
fn pops_in_deadline_order() {
    let mut timers = Timers::new();
    timers.schedule(0, ms(300), TimerTask::Flush);
    timers.schedule(0, ms(100), TimerTask::Reconnect("c1".into()));
    timers.schedule(0, ms(200), TimerTask::CloseConnection("c1".into()));

    assert_eq!(timers.next_deadline(), Some(100));
    assert!(timers.pop_due(99).is_none());

    let due: Vec<TimerTask> = std::iter::from_fn(|| timers.pop_due(300)).map(|(_, t)| t).collect();
    assert_eq!(
        due,
        vec![
            TimerTask::Reconnect("c1".into()),
            TimerTask::CloseConnection("c1".into()),
            TimerTask::Flush,
        ]
    );
    assert!(timers.is_empty());
}

#[test]
fn equal_deadlines_fire_in_schedule_order() {
    let mut timers = Timers::new();
    timers.schedule(0, ms(10), TimerTask::CleanupSubscription("a".into()));
    timers.schedule(0, ms(10), TimerTask::CleanupSubscription("b".into()));
    assert_eq!(timers.pop_due(10).unwrap().1, TimerTask::CleanupSubscription("a".into()));
    assert_eq!(timers.pop_due(10).unwrap().1, TimerTask::CleanupSubscription("b".into()));
}

#[test]
fn cancel_prevents_firing() {
    let mut timers = Timers::new();
    let id = timers.schedule(0, ms(10), TimerTask::Flush);
    assert!(timers.cancel(id));
    assert!(!timers.cancel(id));
    assert!(timers.pop_due(1_000).is_none());
    assert_eq!(timers.next_deadline(), None);
}

#[test]
fn fired_timer_cannot_be_canceled() {
    let mut timers = Timers::new();
    let id = timers.schedule(5, ms(0), TimerTask::Flush);
    assert_eq!(timers.pop_due(5).unwrap().0, id);
    assert!(!timers.cancel(id));
}
