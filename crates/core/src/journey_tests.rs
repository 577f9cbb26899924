// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::campaign::{Campaign, ConversionAnchor, FrequencyPolicy, Trigger};
use crate::node::{NodeBody, WorkflowNode};
use yare::parameterized;

fn test_campaign() -> Campaign {
    Campaign {
        id: "cmp-1".into(),
        version_id: "v1".into(),
        campaign_type: String::new(),
        entry_node_id: "entry".into(),
        nodes: vec![WorkflowNode {
            id: "entry".into(),
            next: vec![],
            body: NodeBody::Exit { reason: None },
        }],
        trigger: Trigger::Event { name: "signup".into(), condition: None },
        goal: None,
        exit_policy: None,
        frequency_policy: FrequencyPolicy::Once,
        frequency_interval_secs: None,
        conversion_window_secs: 3600,
        conversion_anchor: ConversionAnchor::WorkflowEntry,
        max_duration_secs: Some(86_400),
    }
}

#[test]
fn start_snapshots_campaign_rules() {
    let journey = Journey::start(&test_campaign(), "user-1", 1_000);
    assert_eq!(journey.status, JourneyStatus::Pending);
    assert_eq!(journey.current_node_id.as_deref(), Some("entry"));
    assert_eq!(journey.campaign_version_id, "v1");
    assert_eq!(journey.conversion_anchor_at, 1_000);
    assert_eq!(journey.expires_at, Some(1_000 + 86_400_000));
    assert_eq!(journey.conversion_window_secs, 3600);
}

#[parameterized(
    pending = { JourneyStatus::Pending, false, false },
    active = { JourneyStatus::Active, true, false },
    paused = { JourneyStatus::Paused, true, false },
    completed = { JourneyStatus::Completed, false, true },
    expired = { JourneyStatus::Expired, false, true },
    cancelled = { JourneyStatus::Cancelled, false, true },
)]
fn status_liveness(status: JourneyStatus, live: bool, terminal: bool) {
    assert_eq!(status.is_live(), live);
    assert_eq!(status.is_terminal(), terminal);
}

#[test]
fn converted_at_earliest_wins_and_never_unsets() {
    let mut journey = Journey::builder().build();
    assert!(journey.mark_converted(5_000));
    assert_eq!(journey.converted_at, Some(5_000));

    // A later conversion does not move the latch.
    assert!(!journey.mark_converted(9_000));
    assert_eq!(journey.converted_at, Some(5_000));

    // An earlier one does.
    assert!(journey.mark_converted(2_000));
    assert_eq!(journey.converted_at, Some(2_000));
}

#[test]
fn conversion_window_bounds() {
    let mut journey = Journey::builder()
        .conversion_anchor_at(1_000_000)
        .conversion_window_secs(60)
        .build();
    assert!(!journey.within_conversion_window(999_999));
    assert!(journey.within_conversion_window(1_000_000));
    assert!(journey.within_conversion_window(1_060_000));
    assert!(!journey.within_conversion_window(1_060_001));

    // Window 0 is unbounded above.
    journey.conversion_window_secs = 0;
    assert!(journey.within_conversion_window(u64::MAX));
}

#[test]
fn complete_clears_node_and_sets_terminal_fields() {
    let mut journey = Journey::builder().resume_at(2_000u64).build();
    journey.complete(ExitReason::GoalMet, 3_000);
    assert_eq!(journey.status, JourneyStatus::Completed);
    assert!(journey.current_node_id.is_none());
    assert!(journey.resume_at.is_none());
    assert_eq!(journey.completed_at, Some(3_000));
    assert_eq!(journey.exit_reason, Some(ExitReason::GoalMet));

    let record = journey.completion_record().unwrap();
    assert_eq!(record.exit_reason, ExitReason::GoalMet);
    assert_eq!(record.completed_at, 3_000);
}

#[parameterized(
    expired = { ExitReason::Expired, JourneyStatus::Expired },
    cancelled = { ExitReason::Cancelled, JourneyStatus::Cancelled },
    completed = { ExitReason::Completed, JourneyStatus::Completed },
    error = { ExitReason::Error, JourneyStatus::Completed },
)]
fn exit_reason_maps_to_terminal_status(reason: ExitReason, expected: JourneyStatus) {
    let mut journey = Journey::builder().build();
    journey.complete(reason, 1_000);
    assert_eq!(journey.status, expected);
}

#[test]
fn pause_and_resume_manage_deadline() {
    let mut journey = Journey::builder().build();
    journey.pause(Some(9_000), 1_000);
    assert_eq!(journey.status, JourneyStatus::Paused);
    assert_eq!(journey.resume_at, Some(9_000));

    journey.resume(9_000);
    assert_eq!(journey.status, JourneyStatus::Active);
    assert!(journey.resume_at.is_none());
}

#[test]
fn has_expired_uses_expiry_deadline() {
    let journey = Journey::builder().expires_at(10_000u64).build();
    assert!(!journey.has_expired(9_999));
    assert!(journey.has_expired(10_000));

    let unbounded = Journey::builder().build();
    assert!(!unbounded.has_expired(u64::MAX));
}

#[test]
fn journey_roundtrips_through_json() {
    let mut journey = Journey::start(&test_campaign(), "user-1", 1_000);
    journey.activate(1_000);
    journey.set_context("_origin_event_id", serde_json::json!("evt-1"));
    let json = serde_json::to_string(&journey).unwrap();
    let back: Journey = serde_json::from_str(&json).unwrap();
    assert_eq!(back, journey);
}
