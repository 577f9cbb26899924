// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Evaluation context: the clock reading, the triggering event (if any),
//! and whichever capability sources the call site can supply.

use crate::sources::{EventQuerySource, FeatureSource, SegmentSource, UserPropertySource};
use crate::value::Value;

/// Borrowed view of the event an expression is being evaluated against.
#[derive(Debug, Clone, Copy)]
pub struct EvalEvent<'a> {
    pub name: &'a str,
    pub timestamp_ms: u64,
    pub distinct_id: &'a str,
    pub properties: &'a serde_json::Value,
}

impl EvalEvent<'_> {
    /// Dotted-path lookup over the event.
    ///
    /// `$name`, `$timestamp`, and `$distinct_id` address the envelope;
    /// `properties.a.b.c` descends into the payload; any other key is tried
    /// top-level first, then as `properties[key]`.
    pub fn lookup(&self, path: &str) -> Option<Value> {
        match path {
            "$name" => return Some(Value::Str(self.name.to_string())),
            "$timestamp" => return Some(Value::Timestamp(self.timestamp_ms)),
            "$distinct_id" => return Some(Value::Str(self.distinct_id.to_string())),
            _ => {}
        }
        if let Some(rest) = path.strip_prefix("properties.") {
            return descend(self.properties, rest);
        }
        descend(self.properties, path)
    }
}

fn descend(root: &serde_json::Value, path: &str) -> Option<Value> {
    let mut cur = root;
    for seg in path.split('.') {
        cur = cur.get(seg)?;
    }
    match cur {
        serde_json::Value::Object(_) => None,
        leaf => Some(Value::from_json(leaf)),
    }
}

/// Everything an evaluation can see. Missing sources make the corresponding
/// queries evaluate to false (or zero/null in value position).
#[derive(Clone, Copy, Default)]
pub struct EvalContext<'a> {
    pub now_ms: u64,
    pub event: Option<EvalEvent<'a>>,
    pub user: Option<&'a dyn UserPropertySource>,
    pub events: Option<&'a dyn EventQuerySource>,
    pub segments: Option<&'a dyn SegmentSource>,
    pub features: Option<&'a dyn FeatureSource>,
}

impl<'a> EvalContext<'a> {
    pub fn new(now_ms: u64) -> Self {
        Self { now_ms, ..Default::default() }
    }

    pub fn with_event(mut self, event: EvalEvent<'a>) -> Self {
        self.event = Some(event);
        self
    }

    pub fn with_user(mut self, user: &'a dyn UserPropertySource) -> Self {
        self.user = Some(user);
        self
    }

    pub fn with_events(mut self, events: &'a dyn EventQuerySource) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_segments(mut self, segments: &'a dyn SegmentSource) -> Self {
        self.segments = Some(segments);
        self
    }

    pub fn with_features(mut self, features: &'a dyn FeatureSource) -> Self {
        self.features = Some(features);
        self
    }
}
