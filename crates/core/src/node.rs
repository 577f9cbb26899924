// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workflow nodes: the units of a campaign graph.
//!
//! A node is a tagged sum over its `type` discriminator; the executor is a
//! match over the tags. Unknown discriminators decode to
//! [`NodeBody::Unknown`], which the executor skips, so a newer campaign
//! doesn't brick an older client.

use crate::journey::ExitReason;
use jx_ir::IrEnvelope;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One node of a workflow graph: shared routing plus a typed payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowNode {
    pub id: String,
    /// Ordered successors. The first entry is the default follow-on.
    #[serde(default)]
    pub next: Vec<String>,
    #[serde(flatten)]
    pub body: NodeBody,
}

impl WorkflowNode {
    /// Default successor: the first entry of `next`.
    pub fn first_next(&self) -> Option<&str> {
        self.next.first().map(String::as_str)
    }
}

/// One path out of a `waitUntil` node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitPath {
    pub condition: IrEnvelope,
    /// Timeout for this path, seconds from node entry. `None` = no deadline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_time_secs: Option<u64>,
    pub next: String,
}

/// One arm of a `randomBranch`; arm `i` routes to `next[i]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomArm {
    pub percentage: u8,
}

/// Flow resolution for `showFlow` / `showPaywall`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FlowTarget {
    Single {
        flow_id: String,
    },
    /// Variant chosen by the user's experiment assignment; the chosen key is
    /// frozen into the journey context on first evaluation.
    Experiment {
        experiment_id: String,
        /// variant key → flow id
        variants: BTreeMap<String, String>,
    },
}

/// Typed node payloads, keyed by the `type` discriminator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum NodeBody {
    ShowFlow {
        flow: FlowTarget,
        /// Hold the journey until the user interacts with the flow.
        #[serde(default)]
        wait_for_interaction: bool,
    },
    ShowPaywall {
        flow: FlowTarget,
        #[serde(default = "default_true")]
        wait_for_interaction: bool,
    },
    TimeDelay {
        duration_secs: u64,
    },
    TimeWindow {
        /// Window opening, minutes past midnight.
        start_minute: u16,
        /// Window close, minutes past midnight. May wrap past midnight.
        end_minute: u16,
        /// Offset from UTC, minutes. `None` = UTC.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        utc_offset_minutes: Option<i32>,
        /// Allowed weekdays, Sun=1..Sat=7. `None` = every day.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        days_of_week: Option<Vec<u8>>,
    },
    WaitUntil {
        paths: Vec<WaitPath>,
    },
    Branch {
        condition: IrEnvelope,
    },
    MultiBranch {
        conditions: Vec<IrEnvelope>,
    },
    RandomBranch {
        branches: Vec<RandomArm>,
    },
    UpdateCustomer {
        attributes: BTreeMap<String, serde_json::Value>,
    },
    SendEvent {
        name: String,
        #[serde(default)]
        properties: serde_json::Value,
    },
    CallDelegate {
        message: String,
        #[serde(default)]
        payload: serde_json::Value,
    },
    Remote {
        action: String,
        #[serde(default)]
        payload: serde_json::Value,
        /// Skip the response round-trip and continue immediately.
        #[serde(default)]
        fire_and_forget: bool,
    },
    Exit {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<ExitReason>,
    },
    #[serde(other)]
    Unknown,
}

fn default_true() -> bool {
    true
}

impl NodeBody {
    /// Node type tag for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            NodeBody::ShowFlow { .. } => "showFlow",
            NodeBody::ShowPaywall { .. } => "showPaywall",
            NodeBody::TimeDelay { .. } => "timeDelay",
            NodeBody::TimeWindow { .. } => "timeWindow",
            NodeBody::WaitUntil { .. } => "waitUntil",
            NodeBody::Branch { .. } => "branch",
            NodeBody::MultiBranch { .. } => "multiBranch",
            NodeBody::RandomBranch { .. } => "randomBranch",
            NodeBody::UpdateCustomer { .. } => "updateCustomer",
            NodeBody::SendEvent { .. } => "sendEvent",
            NodeBody::CallDelegate { .. } => "callDelegate",
            NodeBody::Remote { .. } => "remote",
            NodeBody::Exit { .. } => "exit",
            NodeBody::Unknown => "unknown",
        }
    }
}

#[cfg(test)]
#[path = "node_tests.rs"]
mod tests;
