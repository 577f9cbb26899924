// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn scheduler_timer_lifecycle() {
    let mut scheduler = ResumeScheduler::new();
    let id = JourneyId::mint(1_000);

    scheduler.set(id, 10_000);
    assert!(scheduler.has_timers());
    assert_eq!(scheduler.next_deadline(), Some(10_000));

    // Deadline hasn't matured yet
    assert!(scheduler.fired(5_000).is_empty());
    assert!(scheduler.has_timers());

    // Deadline fires and is removed
    assert_eq!(scheduler.fired(10_000), vec![id]);
    assert!(!scheduler.has_timers());
}

#[test]
fn scheduler_cancel_is_idempotent() {
    let mut scheduler = ResumeScheduler::new();
    let id = JourneyId::mint(1_000);

    scheduler.set(id, 10_000);
    scheduler.cancel(&id);
    scheduler.cancel(&id);
    assert!(scheduler.fired(20_000).is_empty());
}

#[test]
fn rearm_replaces_prior_deadline() {
    let mut scheduler = ResumeScheduler::new();
    let id = JourneyId::mint(1_000);

    scheduler.set(id, 10_000);
    scheduler.set(id, 50_000);
    assert!(scheduler.fired(10_000).is_empty());
    assert_eq!(scheduler.fired(50_000), vec![id]);
}

#[test]
fn fired_returns_deadline_order() {
    let mut scheduler = ResumeScheduler::new();
    let a = JourneyId::mint(1_000);
    let b = JourneyId::mint(1_001);

    scheduler.set(b, 5_000);
    scheduler.set(a, 9_000);
    assert_eq!(scheduler.fired(10_000), vec![b, a]);
}

#[test]
fn cancel_all_clears_table() {
    let mut scheduler = ResumeScheduler::new();
    scheduler.set(JourneyId::mint(1_000), 10_000);
    scheduler.set(JourneyId::mint(1_001), 20_000);
    scheduler.cancel_all();
    assert!(!scheduler.has_timers());
    assert_eq!(scheduler.next_deadline(), None);
}
