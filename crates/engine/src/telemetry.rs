// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Internal analytics events.
//!
//! Emission is advisory: failures are logged and never affect journey state.

use jx_core::{ExitReason, Journey};

pub const JOURNEY_EXITED: &str = "$journey_exited";
pub const JOURNEY_GOAL_MET: &str = "$journey_goal_met";
pub const EXPERIMENT_EXPOSURE: &str = "$experiment_exposure";
pub const EXPERIMENT_EXPOSURE_ERROR: &str = "$experiment_exposure_error";

/// Common journey tags.
fn base(journey: &Journey) -> serde_json::Map<String, serde_json::Value> {
    let mut map = serde_json::Map::new();
    map.insert("journey_id".into(), journey.id.to_string().into());
    map.insert("campaign_id".into(), journey.campaign_id.clone().into());
    map
}

pub fn journey_exited_props(journey: &Journey, reason: ExitReason, now_ms: u64) -> serde_json::Value {
    let mut map = base(journey);
    map.insert("reason".into(), reason.to_string().into());
    map.insert(
        "duration_ms".into(),
        now_ms.saturating_sub(journey.started_at).into(),
    );
    serde_json::Value::Object(map)
}

pub fn journey_goal_met_props(journey: &Journey, converted_at: u64) -> serde_json::Value {
    let mut map = base(journey);
    map.insert("converted_at".into(), converted_at.into());
    serde_json::Value::Object(map)
}

pub fn experiment_exposure_props(
    journey: &Journey,
    node_id: &str,
    experiment_key: &str,
    variant_key: Option<&str>,
) -> serde_json::Value {
    let mut map = base(journey);
    map.insert("node_id".into(), node_id.into());
    map.insert("experiment_key".into(), experiment_key.into());
    if let Some(variant) = variant_key {
        map.insert("variant_key".into(), variant.into());
    }
    serde_json::Value::Object(map)
}

pub fn node_event_props(journey: &Journey, node_id: &str) -> serde_json::Map<String, serde_json::Value> {
    let mut map = base(journey);
    map.insert("node_id".into(), node_id.into());
    map
}
