// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end scenarios: full service over fake adapters and a fake clock.

use jx_adapters::{
    FakeDelegateAdapter, FakeEventAdapter, FakeFeatureAdapter, FakeFlowAdapter,
    FakeProfileAdapter, FakeSegmentAdapter, SegmentChange,
};
use jx_core::{
    Campaign, ExitPolicy, FakeClock, FrequencyPolicy, GoalSpec, JourneyStatus, NodeBody,
    TrackedEvent, Trigger, WaitPath, WorkflowNode,
};
use jx_engine::{JourneyService, ServiceCommand, ServiceDeps};
use jx_ir::{Expr, IrEnvelope};
use jx_storage::JourneyStore;
use std::sync::Arc;

type TestService = JourneyService<
    FakeProfileAdapter,
    FakeEventAdapter,
    FakeSegmentAdapter,
    FakeFeatureAdapter,
    FakeFlowAdapter,
    FakeDelegateAdapter,
    FakeClock,
>;

struct World {
    service: TestService,
    clock: FakeClock,
    profile: FakeProfileAdapter,
    events: FakeEventAdapter,
    segments: FakeSegmentAdapter,
    _temp: tempfile::TempDir,
}

const NOW: u64 = 1_000_000;

fn world() -> World {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    let temp = tempfile::tempdir().unwrap();
    let store = Arc::new(JourneyStore::open(temp.path()).unwrap());
    let clock = FakeClock::at(NOW);
    let profile = FakeProfileAdapter::new("user-1");
    let events = FakeEventAdapter::new();
    let segments = FakeSegmentAdapter::new();
    let service = JourneyService::new(
        ServiceDeps {
            profile: profile.clone(),
            events: events.clone(),
            segments: segments.clone(),
            features: FakeFeatureAdapter::new(),
            flows: FakeFlowAdapter::new(),
            delegate: FakeDelegateAdapter::new(),
        },
        store,
        clock.clone(),
    );
    World { service, clock, profile, events, segments, _temp: temp }
}

fn send_event_node(id: &str, event_name: &str, next: &str) -> WorkflowNode {
    WorkflowNode {
        id: id.into(),
        next: vec![next.into()],
        body: NodeBody::SendEvent {
            name: event_name.into(),
            properties: serde_json::Value::Null,
        },
    }
}

fn exit_node(id: &str) -> WorkflowNode {
    WorkflowNode { id: id.into(), next: vec![], body: NodeBody::Exit { reason: None } }
}

fn base_campaign(id: &str, entry: &str, nodes: Vec<WorkflowNode>) -> Campaign {
    Campaign {
        id: id.into(),
        version_id: "v1".into(),
        campaign_type: String::new(),
        entry_node_id: entry.into(),
        nodes,
        trigger: Trigger::Event { name: "go".into(), condition: None },
        goal: None,
        exit_policy: None,
        frequency_policy: FrequencyPolicy::EveryRematch,
        frequency_interval_secs: None,
        conversion_window_secs: 0,
        conversion_anchor: Default::default(),
        max_duration_secs: None,
    }
}

/// waitUntil with a `ready`-event path and a 60 s timeout path, each
/// emitting a marker event before exiting.
fn wait_until_campaign() -> Campaign {
    let ready_path = WaitPath {
        condition: IrEnvelope::new(Expr::Event {
            op: "eq".into(),
            key: "$name".into(),
            value: Some(serde_json::json!("ready")),
        }),
        max_time_secs: None,
        next: "a".into(),
    };
    let timeout_path = WaitPath {
        condition: IrEnvelope::new(Expr::Bool { value: false }),
        max_time_secs: Some(60),
        next: "b".into(),
    };
    base_campaign(
        "cmp-wait",
        "wait",
        vec![
            WorkflowNode {
                id: "wait".into(),
                next: vec![],
                body: NodeBody::WaitUntil { paths: vec![ready_path, timeout_path] },
            },
            send_event_node("a", "took_ready_path", "end"),
            send_event_node("b", "took_timeout_path", "end"),
            exit_node("end"),
        ],
    )
}

#[tokio::test]
async fn wait_until_resumes_reactively_on_the_matching_event() {
    let mut w = world();
    let campaign = wait_until_campaign();
    let id = w.service.start_journey(&campaign, None).await.unwrap();

    // Parked with the timeout path's deadline armed.
    let journey = w.service.journey(&id).unwrap();
    assert_eq!(journey.status, JourneyStatus::Paused);
    assert_eq!(journey.resume_at, Some(NOW + 60_000));
    assert_eq!(w.service.resume_deadline(&id), Some(NOW + 60_000));

    // An unrelated event wakes it, matches nothing, re-parks at the same
    // deadline.
    w.clock.advance_secs(5);
    w.service
        .handle_event(&TrackedEvent::new("e0", "noise", NOW + 5_000, "user-1"))
        .await;
    let journey = w.service.journey(&id).unwrap();
    assert_eq!(journey.status, JourneyStatus::Paused);
    assert_eq!(journey.resume_at, Some(NOW + 60_000));

    // The ready event takes the reactive path immediately.
    w.clock.advance_secs(5);
    w.service
        .handle_event(&TrackedEvent::new("e1", "ready", NOW + 10_000, "user-1"))
        .await;
    assert!(w.service.journey(&id).is_none());
    assert_eq!(w.events.tracked_named("took_ready_path").len(), 1);
    assert!(w.events.tracked_named("took_timeout_path").is_empty());
    assert_eq!(w.service.resume_deadline(&id), None);
}

#[tokio::test]
async fn wait_until_falls_back_to_the_timeout_path() {
    let mut w = world();
    let campaign = wait_until_campaign();
    let id = w.service.start_journey(&campaign, None).await.unwrap();

    w.clock.advance_secs(60);
    w.service.tick().await;

    assert!(w.service.journey(&id).is_none());
    assert!(w.events.tracked_named("took_ready_path").is_empty());
    assert_eq!(w.events.tracked_named("took_timeout_path").len(), 1);
}

fn vip_segment_campaign(exit_policy: Option<ExitPolicy>) -> Campaign {
    let mut campaign = base_campaign(
        "cmp-vip",
        "wait",
        vec![
            WorkflowNode {
                id: "wait".into(),
                next: vec![],
                body: NodeBody::WaitUntil {
                    paths: vec![WaitPath {
                        condition: IrEnvelope::new(Expr::Bool { value: false }),
                        max_time_secs: None,
                        next: "end".into(),
                    }],
                },
            },
            exit_node("end"),
        ],
    );
    campaign.trigger = Trigger::Segment {
        condition: IrEnvelope::new(Expr::Segment {
            op: "is_member".into(),
            id: "vip".into(),
            within_secs: None,
        }),
    };
    campaign.exit_policy = exit_policy;
    campaign
}

#[tokio::test]
async fn segment_membership_starts_and_stops_journeys() {
    let mut w = world();
    let campaign = vip_segment_campaign(Some(ExitPolicy::OnStopMatching));
    w.profile.set_campaigns(vec![campaign]);

    // Not yet a member: the change delivery starts nothing.
    w.service
        .handle_segment_change(&SegmentChange {
            distinct_id: "user-1".into(),
            entered: vec![],
            exited: vec![],
            remained: vec![],
        })
        .await;
    assert!(w.service.active_journeys("user-1").is_empty());

    // Joining the segment starts a journey, parked reactively.
    w.segments.join("vip", NOW);
    w.service
        .handle_segment_change(&SegmentChange {
            distinct_id: "user-1".into(),
            entered: vec!["vip".into()],
            exited: vec![],
            remained: vec![],
        })
        .await;
    let live = w.service.active_journeys("user-1");
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].status, JourneyStatus::Paused);
    assert_eq!(live[0].resume_at, None);

    // Leaving the segment exits the journey via stop-matching.
    w.segments.leave("vip");
    w.service
        .handle_segment_change(&SegmentChange {
            distinct_id: "user-1".into(),
            entered: vec![],
            exited: vec!["vip".into()],
            remained: vec![],
        })
        .await;
    assert!(w.service.active_journeys("user-1").is_empty());
    let exited = w.events.tracked_named("$journey_exited");
    assert_eq!(exited.len(), 1);
    assert_eq!(exited[0].properties["reason"], "triggerUnmatched");
}

#[tokio::test]
async fn segment_goal_converts_on_membership_change() {
    let mut w = world();
    let mut campaign = wait_until_campaign();
    campaign.goal = Some(GoalSpec::SegmentEnter { segment_id: "converted".into() });
    campaign.exit_policy = Some(ExitPolicy::OnGoal);
    let id = w.service.start_journey(&campaign, None).await.unwrap();

    w.clock.advance_secs(10);
    w.segments.join("converted", NOW + 10_000);
    w.service
        .handle_segment_change(&SegmentChange {
            distinct_id: "user-1".into(),
            entered: vec!["converted".into()],
            exited: vec![],
            remained: vec![],
        })
        .await;

    assert!(w.service.journey(&id).is_none());
    let exited = w.events.tracked_named("$journey_exited");
    assert_eq!(exited.len(), 1);
    assert_eq!(exited[0].properties["reason"], "goalMet");
    assert_eq!(w.events.tracked_named("$journey_goal_met").len(), 1);
}

#[tokio::test]
async fn command_loop_processes_events_and_segment_deliveries() {
    let w = world();
    let campaign = base_campaign(
        "cmp-now",
        "ping",
        vec![send_event_node("ping", "instant_done", "end"), exit_node("end")],
    );
    w.profile.set_campaigns(vec![campaign]);

    let (tx, rx) = tokio::sync::mpsc::channel(8);
    let events = w.events.clone();
    let segments = w.segments.clone();
    let handle = tokio::spawn(w.service.run(rx));

    tx.send(ServiceCommand::Event(TrackedEvent::new("e1", "go", NOW, "user-1")))
        .await
        .unwrap();
    segments
        .push_change(SegmentChange {
            distinct_id: "user-1".into(),
            entered: vec![],
            exited: vec![],
            remained: vec![],
        })
        .await;
    tx.send(ServiceCommand::Shutdown).await.unwrap();
    handle.await.unwrap();

    // The triggered journey ran straight through to completion.
    assert_eq!(events.tracked_named("instant_done").len(), 1);
    assert_eq!(events.tracked_named("$journey_exited").len(), 1);
}
