// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::events::FakeEventAdapter;
use jx_ir::{Aggregation, EventQuerySource, HistoryFilter, Period, Pred, ResolvedQuery};

const NOW: u64 = 1_000_000_000;

fn query(name: &str) -> ResolvedQuery {
    HistoryFilter { name: name.into(), ..Default::default() }.resolve(NOW)
}

fn query_within(name: &str, within_secs: u64) -> ResolvedQuery {
    HistoryFilter {
        name: name.into(),
        within_secs: Some(within_secs),
        ..Default::default()
    }
    .resolve(NOW)
}

#[tokio::test]
async fn count_and_times_respect_window() {
    let events = FakeEventAdapter::new();
    events.record("open", NOW - 500_000);
    events.record("open", NOW - 100_000);
    events.record("open", NOW - 10_000);
    events.record("close", NOW - 5_000);

    assert_eq!(events.count(&query("open")).await, 3);
    assert_eq!(events.first_time(&query("open")).await, Some(NOW - 500_000));
    assert_eq!(events.last_time(&query("open")).await, Some(NOW - 10_000));

    // within 200s keeps the two recent opens
    let recent = query_within("open", 200);
    assert_eq!(events.count(&recent).await, 2);
    assert_eq!(events.first_time(&recent).await, Some(NOW - 100_000));

    assert!(!events.exists(&query("purchase")).await);
}

#[tokio::test]
async fn predicate_filters_events() {
    let events = FakeEventAdapter::new();
    events.record_with_properties("purchase", NOW - 1_000, serde_json::json!({"amount": 5}));
    events.record_with_properties("purchase", NOW - 500, serde_json::json!({"amount": 50}));

    let q = HistoryFilter {
        name: "purchase".into(),
        pred: Some(Pred::Pred {
            op: "gte".into(),
            key: "amount".into(),
            value: Some(serde_json::json!(10)),
        }),
        ..Default::default()
    }
    .resolve(NOW);
    assert_eq!(events.count(&q).await, 1);
    assert_eq!(events.last_time(&q).await, Some(NOW - 500));
}

#[tokio::test]
async fn aggregates_over_property() {
    let events = FakeEventAdapter::new();
    events.record_with_properties("purchase", NOW - 300, serde_json::json!({"amount": 10}));
    events.record_with_properties("purchase", NOW - 200, serde_json::json!({"amount": 30}));
    events.record_with_properties("purchase", NOW - 100, serde_json::json!({"other": 1}));

    let q = query("purchase");
    assert_eq!(events.aggregate(&q, Aggregation::Sum, "amount").await, Some(40.0));
    assert_eq!(events.aggregate(&q, Aggregation::Min, "amount").await, Some(10.0));
    assert_eq!(events.aggregate(&q, Aggregation::Avg, "amount").await, Some(20.0));
    assert_eq!(events.aggregate(&q, Aggregation::Max, "missing").await, None);
}

#[tokio::test]
async fn in_order_requires_sequence() {
    let events = FakeEventAdapter::new();
    events.record("view", NOW - 30_000);
    events.record("add_to_cart", NOW - 20_000);
    events.record("checkout", NOW - 10_000);

    let steps = [query("view"), query("add_to_cart"), query("checkout")];
    assert!(events.in_order(&steps, None, None).await);

    // Wrong order fails.
    let steps = [query("checkout"), query("view")];
    assert!(!events.in_order(&steps, None, None).await);

    // Tight overall window fails.
    let steps = [query("view"), query("checkout")];
    assert!(!events.in_order(&steps, Some(15_000), None).await);
    assert!(events.in_order(&steps, Some(25_000), None).await);

    // Per-step window bounds each hop.
    let steps = [query("view"), query("add_to_cart")];
    assert!(!events.in_order(&steps, None, Some(5_000)).await);
    assert!(events.in_order(&steps, None, Some(10_000)).await);
}

#[tokio::test]
async fn active_periods_buckets_backwards_from_now() {
    let events = FakeEventAdapter::new();
    let day = Period::Day.millis();
    events.record("open", NOW - 1_000); // today
    events.record("open", NOW - day - 1_000); // yesterday
    events.record("open", NOW - 3 * day - 1_000); // three days back

    let q = query("open");
    assert_eq!(events.active_periods(&q, Period::Day, 2).await, 2);
    assert_eq!(events.active_periods(&q, Period::Day, 4).await, 3);
}

#[tokio::test]
async fn stopped_and_restarted() {
    let events = FakeEventAdapter::new();
    let day = 86_400_000u64;
    // Active long ago, 10-day gap, then active again 1 day ago.
    events.record("session", NOW - 11 * day);
    events.record("session", NOW - day);

    let q = query("session");
    // Not stopped: last event is only a day old against a 5-day bar.
    assert!(!events.stopped(&q, 5 * day).await);
    assert!(events.stopped(&q, day).await);

    // Restarted: 10-day gap before an event within the last 2 days.
    assert!(events.restarted(&q, 5 * day, 2 * day).await);
    // Gap requirement too large.
    assert!(!events.restarted(&q, 15 * day, 2 * day).await);
    // Restart outside the lookback.
    assert!(!events.restarted(&q, 5 * day, day / 2).await);
}

#[tokio::test]
async fn remote_responses_are_scripted_in_order() {
    let events = FakeEventAdapter::new();
    events.push_remote_response(Ok(RemoteExecution {
        success: true,
        status_code: 200,
        error: None,
        context_updates: None,
    }));

    let first = events
        .track_with_response("$remote", serde_json::json!({}))
        .await
        .unwrap();
    assert!(first.success);

    // Exhausted script behaves like a transport failure.
    assert!(events
        .track_with_response("$remote", serde_json::json!({}))
        .await
        .is_err());

    assert_eq!(events.tracked_named("$remote").len(), 2);
}
