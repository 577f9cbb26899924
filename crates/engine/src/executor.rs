// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Node execution: one workflow node in, one outcome out.
//!
//! The executor never touches the registry or the scheduler; it mutates only
//! the journey it was handed (context, experiment freezes) and reports what
//! the service should do next.

use crate::service::JourneyService;
use crate::telemetry;
use chrono::{DateTime, Datelike, Timelike};
use jx_adapters::{
    DelegateAdapter, EventAdapter, ExperimentStatus, FeatureAdapter, FlowAdapter, FlowRequest,
    ProfileAdapter, SegmentAdapter,
};
use jx_core::{
    Clock, ExitReason, FlowTarget, Journey, NodeBody, ResumeReason, TrackedEvent, WaitPath,
    WorkflowNode,
};
use sha2::{Digest, Sha256};

/// What a node execution decided.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeOutcome {
    /// Proceed along the ordered successor list (first entry wins).
    Continue(Vec<String>),
    /// Jump to a specific node, or just advance when `None`.
    Skip(Option<String>),
    /// Park the journey; resume at the deadline or reactively when `None`.
    Wait { resume_at: Option<u64> },
    /// Terminate the journey.
    Complete(ExitReason),
}

impl NodeOutcome {
    /// Outcome tag for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            NodeOutcome::Continue(_) => "continue",
            NodeOutcome::Skip(_) => "skip",
            NodeOutcome::Wait { .. } => "wait",
            NodeOutcome::Complete(_) => "complete",
        }
    }
}

impl<P, E, S, F, W, D, C> JourneyService<P, E, S, F, W, D, C>
where
    P: ProfileAdapter,
    E: EventAdapter,
    S: SegmentAdapter,
    F: FeatureAdapter,
    W: FlowAdapter,
    D: DelegateAdapter,
    C: Clock,
{
    /// Execute a single node.
    pub(crate) async fn execute_node(
        &self,
        journey: &mut Journey,
        node: &WorkflowNode,
        reason: ResumeReason,
        event: Option<&TrackedEvent>,
    ) -> NodeOutcome {
        let now = self.now();
        match &node.body {
            NodeBody::TimeDelay { duration_secs } => {
                // Anchored to node entry so a resume after the deadline
                // advances instead of re-arming the delay.
                let deadline = journey.node_entered_at + duration_secs * 1000;
                if now >= deadline {
                    NodeOutcome::Continue(node.next.clone())
                } else {
                    NodeOutcome::Wait { resume_at: Some(deadline) }
                }
            }

            NodeBody::TimeWindow { start_minute, end_minute, utc_offset_minutes, days_of_week } => {
                let offset = utc_offset_minutes.unwrap_or(0);
                if in_time_window(now, *start_minute, *end_minute, offset, days_of_week.as_deref())
                {
                    NodeOutcome::Continue(node.next.clone())
                } else {
                    NodeOutcome::Wait {
                        resume_at: Some(next_window_open(
                            now,
                            *start_minute,
                            *end_minute,
                            offset,
                            days_of_week.as_deref(),
                        )),
                    }
                }
            }

            NodeBody::WaitUntil { paths } => {
                self.exec_wait_until(journey, paths, reason, event).await
            }

            NodeBody::Branch { condition } => {
                let taken = self.eval_envelope(condition, event).await.unwrap_or(false);
                let index = if taken { 0 } else { 1 };
                match node.next.get(index) {
                    Some(next) => NodeOutcome::Continue(vec![next.clone()]),
                    None => NodeOutcome::Complete(ExitReason::Error),
                }
            }

            NodeBody::MultiBranch { conditions } => {
                for (index, condition) in conditions.iter().enumerate() {
                    if self.eval_envelope(condition, event).await.unwrap_or(false) {
                        return match node.next.get(index) {
                            Some(next) => NodeOutcome::Continue(vec![next.clone()]),
                            None => NodeOutcome::Complete(ExitReason::Error),
                        };
                    }
                }
                match node.next.last() {
                    Some(next) => NodeOutcome::Continue(vec![next.clone()]),
                    None => NodeOutcome::Complete(ExitReason::Error),
                }
            }

            NodeBody::RandomBranch { branches } => {
                let roll = branch_roll(&journey.id, &node.id);
                let mut cumulative = 0.0;
                for (index, arm) in branches.iter().enumerate() {
                    cumulative += arm.percentage as f64;
                    if roll < cumulative {
                        return match node.next.get(index) {
                            Some(next) => NodeOutcome::Continue(vec![next.clone()]),
                            None => NodeOutcome::Complete(ExitReason::Error),
                        };
                    }
                }
                // Percentages sum to 100 and roll < 100, so this is only
                // reachable on an invariant-violating node.
                NodeOutcome::Complete(ExitReason::Error)
            }

            NodeBody::ShowFlow { flow, wait_for_interaction }
            | NodeBody::ShowPaywall { flow, wait_for_interaction } => {
                if reason != ResumeReason::Start {
                    // Waking a parked flow node means the interaction is
                    // over; advancing must not re-present the flow.
                    return NodeOutcome::Continue(node.next.clone());
                }
                self.exec_show_flow(journey, node, flow, *wait_for_interaction).await
            }

            NodeBody::UpdateCustomer { attributes } => {
                if let Err(e) = self.deps.profile.update_properties(attributes.clone()).await {
                    tracing::warn!(journey_id = %journey.id, error = %e, "customer update failed");
                }
                NodeOutcome::Continue(node.next.clone())
            }

            NodeBody::SendEvent { name, properties } => {
                let mut props = telemetry::node_event_props(journey, &node.id);
                if let Some(extra) = properties.as_object() {
                    for (key, value) in extra {
                        props.insert(key.clone(), value.clone());
                    }
                }
                self.emit(name, serde_json::Value::Object(props)).await;
                NodeOutcome::Continue(node.next.clone())
            }

            NodeBody::CallDelegate { message, payload } => {
                if let Err(e) = self.deps.delegate.post(message, payload.clone()).await {
                    tracing::warn!(journey_id = %journey.id, error = %e, "delegate post failed");
                }
                NodeOutcome::Continue(node.next.clone())
            }

            NodeBody::Remote { action, payload, fire_and_forget } => {
                self.exec_remote(journey, node, action, payload, *fire_and_forget).await
            }

            NodeBody::Exit { reason } => {
                NodeOutcome::Complete(reason.unwrap_or(ExitReason::Completed))
            }

            NodeBody::Unknown => {
                tracing::warn!(journey_id = %journey.id, node_id = %node.id, "skipping unknown node type");
                match node.first_next() {
                    Some(next) => NodeOutcome::Skip(Some(next.to_string())),
                    None => NodeOutcome::Complete(ExitReason::Error),
                }
            }
        }
    }

    /// `waitUntil`: first true path wins; otherwise wait for the nearest
    /// path deadline (or purely reactively). An elapsed deadline selects the
    /// first timed-out path.
    async fn exec_wait_until(
        &self,
        journey: &Journey,
        paths: &[WaitPath],
        _reason: ResumeReason,
        event: Option<&TrackedEvent>,
    ) -> NodeOutcome {
        for path in paths {
            if self.eval_envelope(&path.condition, event).await.unwrap_or(false) {
                return NodeOutcome::Skip(Some(path.next.clone()));
            }
        }

        let now = self.now();
        let deadline_of =
            |path: &WaitPath| path.max_time_secs.map(|s| journey.node_entered_at + s * 1000);

        // Timeout branch: the first path whose deadline has elapsed.
        for path in paths {
            if deadline_of(path).is_some_and(|at| at <= now) {
                return NodeOutcome::Skip(Some(path.next.clone()));
            }
        }

        let next_deadline = paths.iter().filter_map(deadline_of).min();
        NodeOutcome::Wait { resume_at: next_deadline }
    }

    /// `showFlow` / `showPaywall`: resolve the target (freezing experiment
    /// assignments into the journey context), request presentation, and
    /// either park or continue.
    async fn exec_show_flow(
        &self,
        journey: &mut Journey,
        node: &WorkflowNode,
        flow: &FlowTarget,
        wait_for_interaction: bool,
    ) -> NodeOutcome {
        let (flow_id, experiment_key, variant_key) = match flow {
            FlowTarget::Single { flow_id } => (flow_id.clone(), None, None),
            FlowTarget::Experiment { experiment_id, variants } => {
                let frozen = journey
                    .context_value("_experiment_variants")
                    .and_then(|m| m.get(experiment_id))
                    .and_then(|v| v.as_str())
                    .map(str::to_string);
                let variant = match frozen {
                    Some(variant) => variant,
                    None => match self.experiments.get(experiment_id) {
                        Some(assignment) => {
                            if assignment.status == ExperimentStatus::Running {
                                freeze_variant(journey, experiment_id, &assignment.variant_key);
                            }
                            self.emit(
                                telemetry::EXPERIMENT_EXPOSURE,
                                telemetry::experiment_exposure_props(
                                    journey,
                                    &node.id,
                                    experiment_id,
                                    Some(&assignment.variant_key),
                                ),
                            )
                            .await;
                            if assignment.is_holdout {
                                // Holdouts see nothing and move on.
                                return NodeOutcome::Continue(node.next.clone());
                            }
                            assignment.variant_key.clone()
                        }
                        None => {
                            self.emit(
                                telemetry::EXPERIMENT_EXPOSURE_ERROR,
                                telemetry::experiment_exposure_props(
                                    journey,
                                    &node.id,
                                    experiment_id,
                                    None,
                                ),
                            )
                            .await;
                            return NodeOutcome::Continue(node.next.clone());
                        }
                    },
                };
                match variants.get(&variant) {
                    Some(flow_id) => {
                        (flow_id.clone(), Some(experiment_id.clone()), Some(variant))
                    }
                    None => {
                        self.emit(
                            telemetry::EXPERIMENT_EXPOSURE_ERROR,
                            telemetry::experiment_exposure_props(
                                journey,
                                &node.id,
                                experiment_id,
                                Some(&variant),
                            ),
                        )
                        .await;
                        return NodeOutcome::Continue(node.next.clone());
                    }
                }
            }
        };

        let request = FlowRequest {
            journey_id: journey.id,
            campaign_id: journey.campaign_id.clone(),
            node_id: node.id.clone(),
            flow_id,
            experiment_key,
            variant_key,
        };
        if let Err(e) = self.deps.flows.present(request).await {
            // Presentation is advisory; don't strand the journey on failure.
            tracing::warn!(journey_id = %journey.id, error = %e, "flow presentation failed");
            return NodeOutcome::Continue(node.next.clone());
        }

        if wait_for_interaction {
            NodeOutcome::Wait { resume_at: None }
        } else {
            NodeOutcome::Continue(node.next.clone())
        }
    }

    /// `remote`: fire-and-forget or a full request/response round-trip with
    /// retry semantics.
    async fn exec_remote(
        &self,
        journey: &mut Journey,
        node: &WorkflowNode,
        action: &str,
        payload: &serde_json::Value,
        fire_and_forget: bool,
    ) -> NodeOutcome {
        let mut props = telemetry::node_event_props(journey, &node.id);
        props.insert("payload".into(), payload.clone());
        let props = serde_json::Value::Object(props);

        if fire_and_forget {
            self.emit(action, props).await;
            return NodeOutcome::Continue(node.next.clone());
        }

        let now = self.now();
        let default_retry_ms = self.config.remote_retry_default_secs * 1000;
        match self.deps.events.track_with_response(action, props).await {
            Ok(execution) if execution.success => {
                if let Some(updates) = execution.context_updates {
                    for (key, value) in updates {
                        journey.set_context(key, value);
                    }
                }
                NodeOutcome::Continue(node.next.clone())
            }
            Ok(execution) => match execution.error {
                Some(error) if error.retryable => {
                    let delay_ms =
                        error.retry_after_secs.map(|s| s * 1000).unwrap_or(default_retry_ms);
                    tracing::debug!(
                        journey_id = %journey.id,
                        action,
                        delay_ms,
                        "remote action retryable, scheduling retry"
                    );
                    NodeOutcome::Wait { resume_at: Some(now + delay_ms) }
                }
                _ => {
                    tracing::warn!(journey_id = %journey.id, action, "remote action failed permanently");
                    NodeOutcome::Complete(ExitReason::Error)
                }
            },
            Err(e) => {
                tracing::debug!(journey_id = %journey.id, action, error = %e, "remote transport failure, retrying");
                NodeOutcome::Wait { resume_at: Some(now + default_retry_ms) }
            }
        }
    }
}

/// Freeze an experiment variant into `context["_experiment_variants"]`.
fn freeze_variant(journey: &mut Journey, experiment_id: &str, variant_key: &str) {
    let entry = journey
        .context
        .entry("_experiment_variants".to_string())
        .or_insert_with(|| serde_json::json!({}));
    if let Some(map) = entry.as_object_mut() {
        map.entry(experiment_id.to_string())
            .or_insert_with(|| serde_json::json!(variant_key));
    }
}

/// Deterministic roll in [0, 100) from the (journey, node) pair.
fn branch_roll(journey_id: &jx_core::JourneyId, node_id: &str) -> f64 {
    let mut hasher = Sha256::new();
    hasher.update(journey_id.as_str().as_bytes());
    hasher.update(b":");
    hasher.update(node_id.as_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(bytes) % 10_000) as f64 / 100.0
}

/// Shift an epoch-ms instant into the window's local frame.
fn to_local_ms(now_ms: u64, offset_minutes: i32) -> i64 {
    now_ms as i64 + offset_minutes as i64 * 60_000
}

/// Weekday of a local instant, Sun=1..Sat=7.
fn weekday_sun1(local_ms: i64) -> u8 {
    DateTime::from_timestamp_millis(local_ms)
        .map(|dt| dt.weekday().num_days_from_sunday() as u8 + 1)
        .unwrap_or(1)
}

fn minute_of_day(local_ms: i64) -> u16 {
    DateTime::from_timestamp_millis(local_ms)
        .map(|dt| (dt.hour() * 60 + dt.minute()) as u16)
        .unwrap_or(0)
}

/// Whether a local instant falls inside the minute window (which may wrap
/// past midnight) on an allowed weekday.
fn in_time_window(
    now_ms: u64,
    start_minute: u16,
    end_minute: u16,
    offset_minutes: i32,
    days_of_week: Option<&[u8]>,
) -> bool {
    let local = to_local_ms(now_ms, offset_minutes);
    if days_of_week.is_some_and(|days| !days.contains(&weekday_sun1(local))) {
        return false;
    }
    let minute = minute_of_day(local);
    if start_minute <= end_minute {
        minute >= start_minute && minute < end_minute
    } else {
        minute >= start_minute || minute < end_minute
    }
}

/// Next instant (epoch ms) at which the window is open.
///
/// Bounded minute scan: at most eight days of minutes, which is cheap and
/// sidesteps wrap/weekday corner cases.
fn next_window_open(
    now_ms: u64,
    start_minute: u16,
    end_minute: u16,
    offset_minutes: i32,
    days_of_week: Option<&[u8]>,
) -> u64 {
    const MINUTE_MS: u64 = 60_000;
    let mut candidate = now_ms - now_ms % MINUTE_MS + MINUTE_MS;
    let horizon = now_ms + 8 * 86_400_000;
    while candidate <= horizon {
        if in_time_window(candidate, start_minute, end_minute, offset_minutes, days_of_week) {
            return candidate;
        }
        candidate += MINUTE_MS;
    }
    // Unsatisfiable filter (e.g. empty day list): try again in a day.
    now_ms + 86_400_000
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
