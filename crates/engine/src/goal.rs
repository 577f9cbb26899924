// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Goal evaluation: has this journey's goal been met, and when?

use jx_core::{GoalSpec, Journey};
use jx_ir::{
    EvalContext, EventQuerySource, ResolvedQuery, SegmentSource, UserPropertySource,
};

/// Result of a goal check. `at` is the latching time when met.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GoalOutcome {
    pub met: bool,
    pub at: Option<u64>,
}

impl GoalOutcome {
    pub const NOT_MET: GoalOutcome = GoalOutcome { met: false, at: None };

    fn met_at(at: u64) -> GoalOutcome {
        GoalOutcome { met: true, at: Some(at) }
    }
}

/// Evaluate the journey's goal snapshot against the current world.
///
/// Event goals ask the event store for the last matching event inside the
/// conversion window and latch at event time; segment and attribute goals
/// latch at evaluation time. Evaluation failures degrade to "not met".
pub async fn evaluate_goal(
    journey: &Journey,
    now_ms: u64,
    user: &dyn UserPropertySource,
    events: &dyn EventQuerySource,
    segments: &dyn SegmentSource,
) -> GoalOutcome {
    let Some(goal) = &journey.goal_snapshot else {
        return GoalOutcome::NOT_MET;
    };
    let anchor = journey.conversion_anchor_at;
    match goal {
        GoalSpec::Event { name, filter } => {
            let until = (journey.conversion_window_secs > 0)
                .then(|| anchor + journey.conversion_window_secs * 1000);
            let query = ResolvedQuery {
                name: name.clone(),
                since: Some(anchor),
                until,
                pred: filter.clone(),
                now_ms,
            };
            match events.last_time(&query).await {
                Some(at) => GoalOutcome::met_at(at),
                None => GoalOutcome::NOT_MET,
            }
        }
        GoalSpec::SegmentEnter { segment_id } => {
            if segments.is_member(segment_id).await {
                GoalOutcome::met_at(now_ms)
            } else {
                GoalOutcome::NOT_MET
            }
        }
        GoalSpec::SegmentLeave { segment_id } => {
            if !segments.is_member(segment_id).await {
                GoalOutcome::met_at(now_ms)
            } else {
                GoalOutcome::NOT_MET
            }
        }
        GoalSpec::Attribute { condition } => {
            let ctx = EvalContext::new(now_ms).with_user(user);
            match jx_ir::eval_bool(condition, ctx).await {
                Ok(true) => GoalOutcome::met_at(now_ms),
                Ok(false) => GoalOutcome::NOT_MET,
                Err(e) => {
                    tracing::debug!(
                        journey_id = %journey.id,
                        error = %e,
                        "attribute goal evaluation failed, treating as not met"
                    );
                    GoalOutcome::NOT_MET
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "goal_tests.rs"]
mod tests;
