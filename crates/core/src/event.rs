// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Inbound tracked events.

use serde::{Deserialize, Serialize};

/// An event observed for a user: the unit that drives journey triggering,
/// goal latching, and reactive resume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedEvent {
    /// Stable event id, used to seed `_origin_event_id` on triggered journeys.
    pub id: String,
    pub name: String,
    /// Event time in epoch milliseconds. May differ from arrival time.
    pub timestamp_ms: u64,
    pub distinct_id: String,
    #[serde(default)]
    pub properties: serde_json::Value,
}

impl TrackedEvent {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        timestamp_ms: u64,
        distinct_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            timestamp_ms,
            distinct_id: distinct_id.into(),
            properties: serde_json::Value::Null,
        }
    }

    pub fn with_properties(mut self, properties: serde_json::Value) -> Self {
        self.properties = properties;
        self
    }

    /// Borrowed view for expression evaluation.
    pub fn as_eval_event(&self) -> jx_ir::EvalEvent<'_> {
        jx_ir::EvalEvent {
            name: &self.name,
            timestamp_ms: self.timestamp_ms,
            distinct_id: &self.distinct_id,
            properties: &self.properties,
        }
    }
}
