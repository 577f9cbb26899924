// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Campaign model: trigger, workflow graph, goal, exit policy, frequency.
//!
//! Campaigns are immutable once published; journeys snapshot the parts they
//! need at start so later campaign edits never alter in-flight journeys.

use crate::node::{NodeBody, WorkflowNode};
use jx_ir::{IrEnvelope, Pred};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What starts a journey.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Trigger {
    /// Fires on a named event, optionally gated by a condition over the event.
    Event {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        condition: Option<IrEnvelope>,
    },
    /// Fires when the segment condition holds for the user.
    Segment { condition: IrEnvelope },
}

/// Conversion goal. Satisfaction latches `converted_at` on the journey.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum GoalSpec {
    Event {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filter: Option<Pred>,
    },
    SegmentEnter { segment_id: String },
    SegmentLeave { segment_id: String },
    Attribute { condition: IrEnvelope },
}

/// Early-exit mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum ExitPolicy {
    #[default]
    Never,
    OnGoal,
    OnStopMatching,
    OnGoalOrStop,
}

impl ExitPolicy {
    pub fn exits_on_goal(self) -> bool {
        matches!(self, ExitPolicy::OnGoal | ExitPolicy::OnGoalOrStop)
    }

    pub fn exits_on_stop_matching(self) -> bool {
        matches!(self, ExitPolicy::OnStopMatching | ExitPolicy::OnGoalOrStop)
    }
}

crate::simple_display! {
    ExitPolicy {
        Never => "never",
        OnGoal => "onGoal",
        OnStopMatching => "onStopMatching",
        OnGoalOrStop => "onGoalOrStop",
    }
}

/// Admission rule for starting a new journey per (user, campaign).
///
/// Unknown serialized values fall back to `EveryRematch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FrequencyPolicy {
    Once,
    #[default]
    EveryRematch,
    FixedInterval,
}

impl From<String> for FrequencyPolicy {
    fn from(s: String) -> Self {
        match s.as_str() {
            "once" => FrequencyPolicy::Once,
            "everyRematch" => FrequencyPolicy::EveryRematch,
            "fixedInterval" => FrequencyPolicy::FixedInterval,
            _ => FrequencyPolicy::EveryRematch,
        }
    }
}

impl From<FrequencyPolicy> for String {
    fn from(p: FrequencyPolicy) -> String {
        match p {
            FrequencyPolicy::Once => "once",
            FrequencyPolicy::EveryRematch => "everyRematch",
            FrequencyPolicy::FixedInterval => "fixedInterval",
        }
        .to_string()
    }
}

/// Time reference for the conversion window. Open set; unknown values fall
/// back to the workflow entry time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ConversionAnchor {
    #[default]
    WorkflowEntry,
}

impl From<String> for ConversionAnchor {
    fn from(_: String) -> Self {
        ConversionAnchor::WorkflowEntry
    }
}

impl From<ConversionAnchor> for String {
    fn from(a: ConversionAnchor) -> String {
        match a {
            ConversionAnchor::WorkflowEntry => "workflowEntry",
        }
        .to_string()
    }
}

/// A published campaign: a workflow graph plus the rules for entering,
/// converting, and leaving it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: String,
    pub version_id: String,
    #[serde(default)]
    pub campaign_type: String,
    pub entry_node_id: String,
    pub nodes: Vec<WorkflowNode>,
    pub trigger: Trigger,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal: Option<GoalSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_policy: Option<ExitPolicy>,
    #[serde(default)]
    pub frequency_policy: FrequencyPolicy,
    /// Interval for `FixedInterval`, seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_interval_secs: Option<u64>,
    /// Conversion window, seconds. 0 = unbounded.
    #[serde(default)]
    pub conversion_window_secs: u64,
    #[serde(default)]
    pub conversion_anchor: ConversionAnchor,
    /// Journey lifetime cap, seconds. Sets `expires_at` on started journeys.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_duration_secs: Option<u64>,
}

/// Campaign decode/validation failures.
#[derive(Debug, Error)]
pub enum CampaignError {
    #[error("campaign {campaign_id}: entry node {node_id} not found")]
    MissingEntryNode { campaign_id: String, node_id: String },
    #[error("campaign {campaign_id}: node {node_id} invalid: {reason}")]
    NodeInvalid {
        campaign_id: String,
        node_id: String,
        reason: String,
    },
}

impl Campaign {
    /// Look up a workflow node by id.
    pub fn node(&self, id: &str) -> Option<&WorkflowNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn is_segment_triggered(&self) -> bool {
        matches!(self.trigger, Trigger::Segment { .. })
    }

    /// Event name for event-typed triggers.
    pub fn trigger_event_name(&self) -> Option<&str> {
        match &self.trigger {
            Trigger::Event { name, .. } => Some(name),
            Trigger::Segment { .. } => None,
        }
    }

    /// Structural validation, applied after decode.
    pub fn validate(&self) -> Result<(), CampaignError> {
        if self.node(&self.entry_node_id).is_none() {
            return Err(CampaignError::MissingEntryNode {
                campaign_id: self.id.clone(),
                node_id: self.entry_node_id.clone(),
            });
        }
        for node in &self.nodes {
            let invalid = |reason: String| CampaignError::NodeInvalid {
                campaign_id: self.id.clone(),
                node_id: node.id.clone(),
                reason,
            };
            match &node.body {
                NodeBody::Branch { .. } if node.next.len() < 2 => {
                    return Err(invalid(format!(
                        "branch needs 2 successors, has {}",
                        node.next.len()
                    )));
                }
                NodeBody::MultiBranch { conditions }
                    if node.next.len() != conditions.len() + 1 =>
                {
                    return Err(invalid(format!(
                        "multiBranch needs {} successors (conditions + default), has {}",
                        conditions.len() + 1,
                        node.next.len()
                    )));
                }
                NodeBody::RandomBranch { branches } => {
                    let sum: u32 = branches.iter().map(|b| b.percentage as u32).sum();
                    if sum != 100 {
                        return Err(invalid(format!("branch percentages sum to {sum}, not 100")));
                    }
                    if node.next.len() < branches.len() {
                        return Err(invalid(format!(
                            "randomBranch needs {} successors, has {}",
                            branches.len(),
                            node.next.len()
                        )));
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "campaign_tests.rs"]
mod tests;
