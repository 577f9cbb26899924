// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Journey identity and state machine.

use crate::campaign::{Campaign, ConversionAnchor, ExitPolicy, GoalSpec};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

crate::define_id! {
    /// Unique identifier for a journey instance.
    ///
    /// Ids are time-ordered: sorting id strings sorts journeys by creation
    /// time, which fixes the iteration order when advancing a user's
    /// journeys.
    pub struct JourneyId("jny-");
}

/// Lifecycle status of a journey.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JourneyStatus {
    Pending,
    Active,
    Paused,
    Completed,
    Expired,
    Cancelled,
}

impl JourneyStatus {
    /// Live journeys occupy the registry and count against frequency
    /// admission.
    pub fn is_live(self) -> bool {
        matches!(self, JourneyStatus::Active | JourneyStatus::Paused)
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JourneyStatus::Completed | JourneyStatus::Expired | JourneyStatus::Cancelled
        )
    }
}

crate::simple_display! {
    JourneyStatus {
        Pending => "pending",
        Active => "active",
        Paused => "paused",
        Completed => "completed",
        Expired => "expired",
        Cancelled => "cancelled",
    }
}

/// Why a journey reached a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExitReason {
    Completed,
    GoalMet,
    TriggerUnmatched,
    Expired,
    Cancelled,
    Error,
}

crate::simple_display! {
    ExitReason {
        Completed => "completed",
        GoalMet => "goalMet",
        TriggerUnmatched => "triggerUnmatched",
        Expired => "expired",
        Cancelled => "cancelled",
        Error => "error",
    }
}

/// What woke a journey up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeReason {
    /// First execution after starting, or a follow-on step.
    Start,
    /// A scheduled deadline fired.
    Timer,
    /// An inbound event resumed a reactive wait.
    Event,
    /// A segment-membership change resumed a reactive wait.
    SegmentChange,
}

crate::simple_display! {
    ResumeReason {
        Start => "start",
        Timer => "timer",
        Event => "event",
        SegmentChange => "segmentChange",
    }
}

/// A per-user execution instance of a campaign workflow.
///
/// The journey snapshots the campaign's goal and exit policy at creation;
/// the campaign itself is re-resolved through the profile adapter when
/// needed and never embedded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Journey {
    pub id: JourneyId,
    pub campaign_id: String,
    pub campaign_version_id: String,
    pub distinct_id: String,

    /// Current node, `None` iff terminal.
    pub current_node_id: Option<String>,
    pub status: JourneyStatus,
    /// Scratchpad carried across nodes (experiment assignments, remote
    /// context updates, origin event).
    #[serde(default)]
    pub context: BTreeMap<String, serde_json::Value>,

    pub started_at: u64,
    pub updated_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<u64>,
    /// Wake deadline; set only while paused with a scheduled resume.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
    /// When the current node was entered; anchors waitUntil timeouts.
    pub node_entered_at: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal_snapshot: Option<GoalSpec>,
    #[serde(default)]
    pub exit_policy_snapshot: ExitPolicy,
    #[serde(default)]
    pub conversion_window_secs: u64,
    #[serde(default)]
    pub conversion_anchor: ConversionAnchor,
    pub conversion_anchor_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub converted_at: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_reason: Option<ExitReason>,
}

impl Journey {
    /// Create a journey at the campaign's entry node.
    ///
    /// The journey starts `Pending`; the service activates it once it is in
    /// the registry.
    pub fn start(campaign: &Campaign, distinct_id: impl Into<String>, now_ms: u64) -> Self {
        Self {
            id: JourneyId::mint(now_ms),
            campaign_id: campaign.id.clone(),
            campaign_version_id: campaign.version_id.clone(),
            distinct_id: distinct_id.into(),
            current_node_id: Some(campaign.entry_node_id.clone()),
            status: JourneyStatus::Pending,
            context: BTreeMap::new(),
            started_at: now_ms,
            updated_at: now_ms,
            completed_at: None,
            resume_at: None,
            expires_at: campaign.max_duration_secs.map(|s| now_ms + s * 1000),
            node_entered_at: now_ms,
            goal_snapshot: campaign.goal.clone(),
            exit_policy_snapshot: campaign.exit_policy.unwrap_or_default(),
            conversion_window_secs: campaign.conversion_window_secs,
            conversion_anchor: campaign.conversion_anchor,
            conversion_anchor_at: now_ms,
            converted_at: None,
            exit_reason: None,
        }
    }

    pub fn is_live(&self) -> bool {
        self.status.is_live()
    }

    pub fn has_expired(&self, now_ms: u64) -> bool {
        self.expires_at.is_some_and(|at| now_ms >= at)
    }

    /// Flip a pending journey to active.
    pub fn activate(&mut self, now_ms: u64) {
        self.status = JourneyStatus::Active;
        self.updated_at = now_ms;
    }

    /// Move to a node, resetting the node-entry anchor.
    pub fn advance_to(&mut self, node_id: impl Into<String>, now_ms: u64) {
        self.current_node_id = Some(node_id.into());
        self.node_entered_at = now_ms;
        self.updated_at = now_ms;
    }

    /// Pause, optionally with a wake deadline.
    pub fn pause(&mut self, resume_at: Option<u64>, now_ms: u64) {
        self.status = JourneyStatus::Paused;
        self.resume_at = resume_at;
        self.updated_at = now_ms;
    }

    /// Wake a paused journey.
    pub fn resume(&mut self, now_ms: u64) {
        self.status = JourneyStatus::Active;
        self.resume_at = None;
        self.updated_at = now_ms;
    }

    /// Latch the conversion time. Earliest wins; never unset.
    /// Returns true when the stored value changed.
    pub fn mark_converted(&mut self, at_ms: u64) -> bool {
        match self.converted_at {
            Some(existing) if existing <= at_ms => false,
            _ => {
                self.converted_at = Some(at_ms);
                true
            }
        }
    }

    /// Whether a timestamp falls inside the conversion window.
    pub fn within_conversion_window(&self, ts_ms: u64) -> bool {
        if ts_ms < self.conversion_anchor_at {
            return false;
        }
        if self.conversion_window_secs == 0 {
            return true;
        }
        ts_ms <= self.conversion_anchor_at + self.conversion_window_secs * 1000
    }

    /// Terminal transition. Clears the current node and records the reason.
    pub fn complete(&mut self, reason: ExitReason, now_ms: u64) {
        self.status = match reason {
            ExitReason::Expired => JourneyStatus::Expired,
            ExitReason::Cancelled => JourneyStatus::Cancelled,
            _ => JourneyStatus::Completed,
        };
        self.current_node_id = None;
        self.resume_at = None;
        self.completed_at = Some(now_ms);
        self.exit_reason = Some(reason);
        self.updated_at = now_ms;
    }

    pub fn set_context(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.context.insert(key.into(), value);
    }

    pub fn context_value(&self, key: &str) -> Option<&serde_json::Value> {
        self.context.get(key)
    }

    /// The completion-ledger record for this (terminal) journey.
    pub fn completion_record(&self) -> Option<CompletionRecord> {
        Some(CompletionRecord {
            campaign_id: self.campaign_id.clone(),
            distinct_id: self.distinct_id.clone(),
            journey_id: self.id,
            completed_at: self.completed_at?,
            exit_reason: self.exit_reason?,
        })
    }
}

/// One line of the completion ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRecord {
    pub campaign_id: String,
    pub distinct_id: String,
    pub journey_id: JourneyId,
    pub completed_at: u64,
    pub exit_reason: ExitReason,
}

crate::builder! {
    pub struct JourneyBuilder => Journey {
        into {
            campaign_id: String = "cmp-1",
            campaign_version_id: String = "v1",
            distinct_id: String = "user-1",
        }
        set {
            status: JourneyStatus = JourneyStatus::Active,
            context: BTreeMap<String, serde_json::Value> = BTreeMap::new(),
            started_at: u64 = 1_000_000_000,
            updated_at: u64 = 1_000_000_000,
            node_entered_at: u64 = 1_000_000_000,
            conversion_window_secs: u64 = 0,
            conversion_anchor: ConversionAnchor = ConversionAnchor::WorkflowEntry,
            conversion_anchor_at: u64 = 1_000_000_000,
            exit_policy_snapshot: ExitPolicy = ExitPolicy::Never,
        }
        option {
            current_node_id: String = Some("entry".to_string()),
            completed_at: u64 = None,
            resume_at: u64 = None,
            expires_at: u64 = None,
            goal_snapshot: GoalSpec = None,
            converted_at: u64 = None,
            exit_reason: ExitReason = None,
        }
        computed {
            id: JourneyId = JourneyId::mint(1_000_000_000),
        }
    }
}

#[cfg(test)]
#[path = "journey_tests.rs"]
mod tests;
