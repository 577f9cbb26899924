// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The journey service: a single cooperative actor owning the in-memory
//! registry, the resume scheduler, and the segment-change subscription.
//!
//! All registry mutations go through `&mut self`, so invariants hold at
//! every suspension point. External callers interact through the command
//! channel (`run`) or, in tests, by calling the handlers directly.

use crate::error::EngineError;
use crate::executor::NodeOutcome;
use crate::frequency::{admit, Admission};
use crate::goal::evaluate_goal;
use crate::scheduler::ResumeScheduler;
use crate::telemetry;
use jx_adapters::{
    DelegateAdapter, EventAdapter, ExperimentAssignment, FeatureAdapter, FlowAdapter,
    ProfileAdapter, SegmentAdapter, SegmentChange,
};
use jx_core::{
    Campaign, Clock, ExitReason, Journey, JourneyId, ResumeReason, TrackedEvent, Trigger,
};
use jx_ir::{EvalContext, IrEnvelope};
use jx_storage::JourneyStore;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// The collaborators a service instance runs against.
pub struct ServiceDeps<P, E, S, F, W, D> {
    pub profile: P,
    pub events: E,
    pub segments: S,
    pub features: F,
    pub flows: W,
    pub delegate: D,
}

/// Tunables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Retry delay for remote nodes when the server doesn't specify one.
    pub remote_retry_default_secs: u64,
    /// Circuit breaker: maximum node transitions in one `execute_journey`
    /// call before the journey is failed. Guards against degenerate graphs
    /// that cycle without ever waiting.
    pub max_steps_per_run: u32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self { remote_retry_default_secs: 5, max_steps_per_run: 64 }
    }
}

/// Inbound commands for the run loop.
#[derive(Debug)]
pub enum ServiceCommand {
    Event(TrackedEvent),
    UserChanged { old: String, new: String },
    Background,
    Foreground,
    Shutdown,
}

/// The orchestrator.
pub struct JourneyService<P, E, S, F, W, D, C> {
    pub(crate) deps: ServiceDeps<P, E, S, F, W, D>,
    pub(crate) store: Arc<JourneyStore>,
    pub(crate) clock: C,
    pub(crate) config: ServiceConfig,
    /// Authoritative live state: journey id → journey.
    registry: HashMap<JourneyId, Journey>,
    scheduler: ResumeScheduler,
    /// Last-known campaigns by id, refreshed on profile fetches.
    campaigns: HashMap<String, Campaign>,
    /// Last-fetched experiment assignments, for flow variant resolution.
    pub(crate) experiments: HashMap<String, ExperimentAssignment>,
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
    pub fn new(deps: ServiceDeps<P, E, S, F, W, D>, store: Arc<JourneyStore>, clock: C) -> Self {
        Self {
            deps,
            store,
            clock,
            config: ServiceConfig::default(),
            registry: HashMap::new(),
            scheduler: ResumeScheduler::new(),
            campaigns: HashMap::new(),
            experiments: HashMap::new(),
        }
    }

    pub fn with_config(mut self, config: ServiceConfig) -> Self {
        self.config = config;
        self
    }

    pub(crate) fn now(&self) -> u64 {
        self.clock.epoch_ms()
    }

    // === Introspection (snapshots only; the registry itself stays private) ===

    pub fn journey(&self, id: &JourneyId) -> Option<Journey> {
        self.registry.get(id).cloned()
    }

    /// Live journeys for a user, in id (creation) order.
    pub fn active_journeys(&self, distinct_id: &str) -> Vec<Journey> {
        let mut journeys: Vec<Journey> = self
            .registry
            .values()
            .filter(|j| j.distinct_id == distinct_id && j.is_live())
            .cloned()
            .collect();
        journeys.sort_by_key(|j| j.id);
        journeys
    }

    pub fn resume_deadline(&self, id: &JourneyId) -> Option<u64> {
        self.scheduler.deadline_for(id)
    }

    fn live_journey_for(&self, distinct_id: &str, campaign_id: &str) -> Option<&Journey> {
        let mut live: Vec<&Journey> = self
            .registry
            .values()
            .filter(|j| {
                j.is_live() && j.distinct_id == distinct_id && j.campaign_id == campaign_id
            })
            .collect();
        live.sort_by_key(|j| j.id);
        live.into_iter().next()
    }

    /// Ids of this user's live journeys, in creation order.
    fn user_journey_ids(&self, distinct_id: &str) -> Vec<JourneyId> {
        let mut ids: Vec<JourneyId> = self
            .registry
            .values()
            .filter(|j| j.distinct_id == distinct_id && j.is_live())
            .map(|j| j.id)
            .collect();
        ids.sort();
        ids
    }

    // === Campaign resolution ===

    /// Prime the campaign cache (startup restore, tests).
    pub fn register_campaigns(&mut self, campaigns: Vec<Campaign>) {
        for campaign in campaigns {
            self.campaigns.insert(campaign.id.clone(), campaign);
        }
    }

    pub(crate) fn campaign_for(&self, campaign_id: &str) -> Option<Campaign> {
        self.campaigns.get(campaign_id).cloned()
    }

    /// Resolve a journey's current node through the campaign cache.
    fn resolve_node(
        &self,
        campaign_id: &str,
        node_id: &str,
    ) -> Result<jx_core::WorkflowNode, EngineError> {
        let campaign = self
            .campaigns
            .get(campaign_id)
            .ok_or_else(|| EngineError::CampaignNotFound(campaign_id.to_string()))?;
        campaign
            .node(node_id)
            .cloned()
            .ok_or_else(|| EngineError::NodeNotFound {
                campaign_id: campaign_id.to_string(),
                node_id: node_id.to_string(),
            })
    }

    /// Fetch the user's profile, refreshing the campaign and experiment
    /// caches. Fetch failure means "no campaigns".
    async fn refresh_profile(&mut self, distinct_id: &str) -> Vec<Campaign> {
        match self.deps.profile.fetch_profile(distinct_id).await {
            Ok(profile) => {
                self.experiments = profile.experiments;
                for campaign in &profile.campaigns {
                    self.campaigns.insert(campaign.id.clone(), campaign.clone());
                }
                profile.campaigns
            }
            Err(e) => {
                tracing::warn!(distinct_id, error = %e, "profile fetch failed, no campaigns");
                Vec::new()
            }
        }
    }

    // === Startup / identity ===

    /// Load persisted live journeys for the current user and re-arm their
    /// timers.
    pub async fn restore(&mut self) {
        let distinct_id = self.deps.profile.distinct_id();
        self.refresh_profile(&distinct_id).await;
        let journeys = match self.store.load_journeys_for(&distinct_id) {
            Ok(journeys) => journeys,
            Err(e) => {
                tracing::warn!(error = %e, "journey restore failed, starting empty");
                return;
            }
        };
        for journey in journeys {
            self.insert_live(journey);
        }
        // Fire anything that matured while we were down.
        self.tick().await;
    }

    /// Insert a live journey into the registry and re-arm its timer.
    fn insert_live(&mut self, journey: Journey) {
        if let Some(resume_at) = journey.resume_at {
            self.scheduler.set(journey.id, resume_at);
        }
        self.store.update_cache(&journey);
        self.registry.insert(journey.id, journey);
    }

    /// Adopt a server-reported live journey ahead of any local start
    /// attempt, so cross-device `once` admission fast-fails locally.
    pub async fn adopt_remote_journey(&mut self, journey: Journey) {
        if !journey.is_live() {
            tracing::warn!(journey_id = %journey.id, "ignoring non-live remote journey");
            return;
        }
        self.persist(&journey);
        self.insert_live(journey);
    }

    /// Swap users: evict every journey of the old user from memory (their
    /// persisted state stays put), then restore the new user's journeys.
    pub async fn handle_user_change(&mut self, old_distinct_id: &str, new_distinct_id: &str) {
        let old_ids: Vec<JourneyId> = self
            .registry
            .values()
            .filter(|j| j.distinct_id == old_distinct_id)
            .map(|j| j.id)
            .collect();
        for id in old_ids {
            self.scheduler.cancel(&id);
            self.registry.remove(&id);
        }
        self.store.clear_cache();
        tracing::info!(
            old = old_distinct_id,
            new = new_distinct_id,
            "identity changed, swapped journey registry"
        );

        self.refresh_profile(new_distinct_id).await;
        match self.store.load_journeys_for(new_distinct_id) {
            Ok(journeys) => {
                for journey in journeys {
                    self.insert_live(journey);
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to load journeys for new identity");
            }
        }
        self.tick().await;
    }

    // === Starting ===

    /// Attempt to start a journey for the current user, subject to the
    /// campaign's frequency policy. Returns the journey id when admitted.
    pub async fn start_journey(
        &mut self,
        campaign: &Campaign,
        origin_event: Option<&TrackedEvent>,
    ) -> Option<JourneyId> {
        let distinct_id = self.deps.profile.distinct_id();
        let now = self.now();

        let decision = admit(
            campaign.frequency_policy,
            campaign.frequency_interval_secs,
            self.live_journey_for(&distinct_id, &campaign.id),
            self.store.has_completed_campaign(&distinct_id, &campaign.id),
            self.store.last_completion_time(&distinct_id, &campaign.id),
            now,
        );
        match decision {
            Admission::Deny => {
                tracing::debug!(campaign_id = %campaign.id, distinct_id, "start denied by frequency policy");
                return None;
            }
            Admission::AllowAfterCancelling(prior) => {
                tracing::info!(
                    campaign_id = %campaign.id,
                    journey_id = %prior,
                    "fixed interval elapsed, cancelling prior journey"
                );
                if let Err(e) = self.cancel_journey(&prior).await {
                    tracing::warn!(error = %e, "prior journey vanished before cancellation");
                }
            }
            Admission::Allow => {}
        }

        self.campaigns.insert(campaign.id.clone(), campaign.clone());
        let mut journey = Journey::start(campaign, &distinct_id, now);
        if let Some(event) = origin_event {
            journey.set_context("_origin_event_id", serde_json::json!(event.id));
        }
        let id = journey.id;
        // Into the registry before the first execution step, so admission
        // checks during execution see it.
        self.registry.insert(id, journey);
        if let Some(journey) = self.registry.get_mut(&id) {
            journey.activate(now);
        }
        tracing::info!(journey_id = %id, campaign_id = %campaign.id, distinct_id, "journey started");
        self.execute_journey(&id, ResumeReason::Start, origin_event).await;
        Some(id)
    }

    // === The execution loop ===

    /// Advance a journey until it waits, completes, or runs out of nodes.
    ///
    /// `event` is the inbound event that woke the journey, if any; it is
    /// visible to the first node's condition evaluation only.
    pub async fn execute_journey(
        &mut self,
        id: &JourneyId,
        reason: ResumeReason,
        event: Option<&TrackedEvent>,
    ) {
        let Some(mut journey) = self.registry.get(id).cloned() else {
            tracing::warn!(journey_id = %id, "execute on unknown journey, ignoring");
            return;
        };
        if !matches!(
            journey.status,
            jx_core::JourneyStatus::Active | jx_core::JourneyStatus::Pending
        ) {
            tracing::warn!(journey_id = %id, status = %journey.status, "execute on non-active journey, ignoring");
            return;
        }

        let mut reason = reason;
        let mut event = event;
        let mut steps: u32 = 0;
        loop {
            let now = self.now();

            // 1. Goal first: latch the conversion before deciding exits.
            self.latch_goal(&mut journey, now).await;

            // 2. Exit decision.
            if let Some(exit) = self.evaluate_exit(&journey).await {
                self.finish_journey(journey, exit).await;
                return;
            }

            // 3. Resolve the current node.
            let Some(node_id) = journey.current_node_id.clone() else {
                self.finish_journey(journey, ExitReason::Completed).await;
                return;
            };
            let node = match self.resolve_node(&journey.campaign_id, &node_id) {
                Ok(node) => node,
                Err(e) => {
                    // Fatal for this journey only.
                    tracing::warn!(journey_id = %journey.id, error = %e, "failing journey");
                    self.finish_journey(journey, ExitReason::Error).await;
                    return;
                }
            };

            steps += 1;
            if steps > self.config.max_steps_per_run {
                tracing::warn!(
                    journey_id = %journey.id,
                    steps,
                    "node transition limit hit, failing journey"
                );
                self.finish_journey(journey, ExitReason::Error).await;
                return;
            }

            // 4. Execute the node.
            let outcome = self.execute_node(&mut journey, &node, reason, event).await;
            tracing::debug!(
                journey_id = %journey.id,
                node_id = %node.id,
                node_type = node.body.kind(),
                reason = %reason,
                outcome = outcome.kind(),
                "node executed"
            );

            // 5. Apply.
            let now = self.now();
            match outcome {
                NodeOutcome::Continue(next) => match next.first() {
                    Some(next_id) => journey.advance_to(next_id.clone(), now),
                    None => {
                        self.finish_journey(journey, ExitReason::Completed).await;
                        return;
                    }
                },
                NodeOutcome::Skip(target) => {
                    let target = target.or_else(|| node.first_next().map(str::to_string));
                    match target {
                        Some(next_id) => journey.advance_to(next_id, now),
                        None => {
                            self.finish_journey(journey, ExitReason::Completed).await;
                            return;
                        }
                    }
                }
                NodeOutcome::Wait { resume_at } => {
                    journey.pause(resume_at, now);
                    self.persist(&journey);
                    if let Some(at) = resume_at {
                        self.scheduler.set(journey.id, at);
                    } else {
                        // Reactive-only wait: no deadline to arm.
                        self.scheduler.cancel(&journey.id);
                    }
                    self.registry.insert(journey.id, journey);
                    return;
                }
                NodeOutcome::Complete(exit) => {
                    self.finish_journey(journey, exit).await;
                    return;
                }
            }
            // Keep the registry's copy current between transitions.
            self.registry.insert(journey.id, journey.clone());
            // Only the first node of a call sees the external wake reason
            // and the waking event.
            reason = ResumeReason::Start;
            event = None;
        }
    }

    /// Evaluate the goal snapshot and latch `converted_at` (earliest wins).
    async fn latch_goal(&mut self, journey: &mut Journey, now: u64) {
        let outcome = evaluate_goal(
            journey,
            now,
            &self.deps.profile,
            &self.deps.events,
            &self.deps.segments,
        )
        .await;
        if let (true, Some(at)) = (outcome.met, outcome.at) {
            if journey.mark_converted(at) {
                self.persist(journey);
                self.registry.insert(journey.id, journey.clone());
                self.emit(
                    telemetry::JOURNEY_GOAL_MET,
                    telemetry::journey_goal_met_props(journey, at),
                )
                .await;
            }
        }
    }

    /// Exit decision, in precedence order: expiry, goal-based exit,
    /// stop-matching exit.
    async fn evaluate_exit(&self, journey: &Journey) -> Option<ExitReason> {
        let now = self.now();
        if journey.has_expired(now) {
            return Some(ExitReason::Expired);
        }
        if journey.exit_policy_snapshot.exits_on_goal() && journey.converted_at.is_some() {
            return Some(ExitReason::GoalMet);
        }
        if journey.exit_policy_snapshot.exits_on_stop_matching() {
            if let Some(campaign) = self.campaign_for(&journey.campaign_id) {
                if let Trigger::Segment { condition } = &campaign.trigger {
                    // Evaluation failure keeps the journey alive: a transient
                    // lookup error must not evict users.
                    match self.eval_envelope(condition, None).await {
                        Some(false) => return Some(ExitReason::TriggerUnmatched),
                        _ => {}
                    }
                }
            }
        }
        None
    }

    /// Terminal transition: registry, timers, persistence, ledger, telemetry.
    pub(crate) async fn finish_journey(&mut self, mut journey: Journey, reason: ExitReason) {
        let now = self.now();
        journey.complete(reason, now);
        self.registry.remove(&journey.id);
        self.scheduler.cancel(&journey.id);
        if let Err(e) = self.store.delete_journey(&journey.id) {
            tracing::warn!(journey_id = %journey.id, error = %e, "failed to delete journey state");
        }
        if let Some(record) = journey.completion_record() {
            if let Err(e) = self.store.record_completion(&record) {
                tracing::warn!(journey_id = %journey.id, error = %e, "failed to append completion record");
            }
        }
        tracing::info!(
            journey_id = %journey.id,
            campaign_id = %journey.campaign_id,
            reason = %reason,
            "journey exited"
        );
        self.emit(
            telemetry::JOURNEY_EXITED,
            telemetry::journey_exited_props(&journey, reason, now),
        )
        .await;
    }

    /// Explicitly cancel a live journey.
    pub async fn cancel_journey(&mut self, id: &JourneyId) -> Result<(), EngineError> {
        let Some(journey) = self.registry.get(id).cloned() else {
            return Err(EngineError::NotLive(*id));
        };
        self.finish_journey(journey, ExitReason::Cancelled).await;
        Ok(())
    }

    // === Event handling ===

    pub async fn handle_event(&mut self, event: &TrackedEvent) {
        let distinct_id = self.deps.profile.distinct_id();
        if event.distinct_id != distinct_id {
            tracing::debug!(
                event_user = %event.distinct_id,
                current_user = %distinct_id,
                "event for another identity, ignoring"
            );
            return;
        }

        // (a) Trigger candidate campaigns.
        let campaigns = self.refresh_profile(&distinct_id).await;
        for campaign in campaigns {
            let Trigger::Event { name, condition } = &campaign.trigger else {
                continue;
            };
            if name != &event.name {
                continue;
            }
            let matched = match condition {
                Some(env) => self.eval_envelope(env, Some(event)).await.unwrap_or(false),
                None => true,
            };
            if matched {
                self.start_journey(&campaign, Some(event)).await;
            }
        }

        // (b) Event-time goal latching for live journeys.
        for id in self.user_journey_ids(&distinct_id) {
            self.latch_event_goal(&id, event).await;
        }

        // (c) Generic exit re-evaluation.
        for id in self.user_journey_ids(&distinct_id) {
            if let Some(journey) = self.registry.get(&id).cloned() {
                if let Some(exit) = self.evaluate_exit(&journey).await {
                    self.finish_journey(journey, exit).await;
                }
            }
        }

        // (d) Reactive resume for waitUntil journeys.
        self.try_reactive_resume(&distinct_id, ResumeReason::Event, Some(event)).await;
    }

    /// Apply event-time goal semantics to one journey.
    async fn latch_event_goal(&mut self, id: &JourneyId, event: &TrackedEvent) {
        let Some(mut journey) = self.registry.get(id).cloned() else { return };
        let Some(jx_core::GoalSpec::Event { name, filter }) = journey.goal_snapshot.clone() else {
            return;
        };
        if name != event.name || !journey.within_conversion_window(event.timestamp_ms) {
            return;
        }
        if let Some(pred) = &filter {
            let view = event.as_eval_event();
            if !jx_ir::pred_matches(pred, &|key| view.lookup(key)).unwrap_or(false) {
                return;
            }
        }
        if journey.mark_converted(event.timestamp_ms) {
            self.persist(&journey);
            self.registry.insert(journey.id, journey.clone());
            self.emit(
                telemetry::JOURNEY_GOAL_MET,
                telemetry::journey_goal_met_props(&journey, event.timestamp_ms),
            )
            .await;
        }
        if journey.exit_policy_snapshot.exits_on_goal() {
            self.finish_journey(journey, ExitReason::GoalMet).await;
        }
    }

    // === Segment change handling ===

    pub async fn handle_segment_change(&mut self, change: &SegmentChange) {
        let distinct_id = self.deps.profile.distinct_id();
        if change.distinct_id != distinct_id {
            // Identity transitions race with in-flight deliveries; drop them.
            tracing::debug!(
                change_user = %change.distinct_id,
                current_user = %distinct_id,
                "segment change for another identity, ignoring"
            );
            return;
        }

        // (a) Segment-triggered campaign starts.
        let campaigns = self.refresh_profile(&distinct_id).await;
        for campaign in campaigns {
            let Trigger::Segment { condition } = &campaign.trigger else {
                continue;
            };
            if self.eval_envelope(condition, None).await.unwrap_or(false) {
                self.start_journey(&campaign, None).await;
            }
        }

        // (b) Exit re-evaluation (covers stop-matching) and segment goals.
        for id in self.user_journey_ids(&distinct_id) {
            let Some(mut journey) = self.registry.get(&id).cloned() else { continue };
            self.latch_goal(&mut journey, self.now()).await;
            if journey.exit_policy_snapshot.exits_on_goal() && journey.converted_at.is_some() {
                self.finish_journey(journey, ExitReason::GoalMet).await;
                continue;
            }
            if let Some(exit) = self.evaluate_exit(&journey).await {
                self.finish_journey(journey, exit).await;
            }
        }

        // (c) Reactive resume.
        self.try_reactive_resume(&distinct_id, ResumeReason::SegmentChange, None).await;
    }

    // === Reactive resume & timers ===

    /// Wake every paused journey of the user that is parked on a
    /// `waitUntil` node and re-run it with the given reason.
    async fn try_reactive_resume(
        &mut self,
        distinct_id: &str,
        reason: ResumeReason,
        event: Option<&TrackedEvent>,
    ) {
        for id in self.user_journey_ids(distinct_id) {
            let Some(journey) = self.registry.get(&id) else { continue };
            if journey.status != jx_core::JourneyStatus::Paused {
                continue;
            }
            let on_wait_until = journey
                .current_node_id
                .as_deref()
                .and_then(|node_id| {
                    let campaign = self.campaign_for(&journey.campaign_id)?;
                    let node = campaign.node(node_id)?;
                    Some(matches!(node.body, jx_core::NodeBody::WaitUntil { .. }))
                })
                .unwrap_or(false);
            if !on_wait_until {
                continue;
            }
            self.scheduler.cancel(&id);
            let now = self.now();
            if let Some(journey) = self.registry.get_mut(&id) {
                journey.resume(now);
            }
            self.execute_journey(&id, reason, event).await;
        }
    }

    /// Resume one journey after its deadline fired. Re-reads the canonical
    /// instance; a stale fire on a non-paused journey is a no-op.
    pub async fn resume_journey(&mut self, id: &JourneyId) {
        let Some(journey) = self.registry.get(id) else {
            tracing::debug!(journey_id = %id, "timer fired for unknown journey, ignoring");
            return;
        };
        if journey.status != jx_core::JourneyStatus::Paused {
            tracing::debug!(journey_id = %id, status = %journey.status, "timer fired for non-paused journey, ignoring");
            return;
        }
        let now = self.now();
        if let Some(journey) = self.registry.get_mut(id) {
            journey.resume(now);
        }
        self.execute_journey(id, ResumeReason::Timer, None).await;
    }

    /// Fire matured deadlines.
    pub async fn tick(&mut self) {
        for id in self.scheduler.fired(self.now()) {
            self.resume_journey(&id).await;
        }
    }

    // === App lifecycle ===

    /// Backgrounding cancels all timers; paused journeys are persisted so a
    /// process death loses nothing.
    pub async fn on_background(&mut self) {
        self.scheduler.cancel_all();
        let paused: Vec<Journey> = self
            .registry
            .values()
            .filter(|j| j.status == jx_core::JourneyStatus::Paused)
            .cloned()
            .collect();
        for journey in paused {
            self.persist(&journey);
        }
        tracing::debug!("backgrounded: timers cancelled, paused journeys persisted");
    }

    /// Foregrounding fires anything that matured while backgrounded, then
    /// re-arms the rest.
    pub async fn on_foreground(&mut self) {
        let now = self.now();
        let mut matured = Vec::new();
        for journey in self.registry.values() {
            if journey.status != jx_core::JourneyStatus::Paused {
                continue;
            }
            match journey.resume_at {
                Some(at) if at <= now => matured.push(journey.id),
                Some(at) => self.scheduler.set(journey.id, at),
                None => {}
            }
        }
        matured.sort();
        for id in matured {
            self.resume_journey(&id).await;
        }
    }

    // === Helpers ===

    /// Evaluate an envelope with the full adapter context. `None` means the
    /// evaluation itself failed.
    pub(crate) async fn eval_envelope(
        &self,
        env: &IrEnvelope,
        event: Option<&TrackedEvent>,
    ) -> Option<bool> {
        let mut ctx = EvalContext::new(self.now())
            .with_user(&self.deps.profile)
            .with_events(&self.deps.events)
            .with_segments(&self.deps.segments)
            .with_features(&self.deps.features);
        let view = event.map(TrackedEvent::as_eval_event);
        if let Some(view) = view {
            ctx = ctx.with_event(view);
        }
        match jx_ir::eval_bool(env, ctx).await {
            Ok(result) => Some(result),
            Err(e) => {
                tracing::debug!(error = %e, "condition evaluation failed");
                None
            }
        }
    }

    /// Write-through persistence; failures are logged, never fatal.
    pub(crate) fn persist(&self, journey: &Journey) {
        if let Err(e) = self.store.save_journey(journey) {
            tracing::warn!(journey_id = %journey.id, error = %e, "journey persist failed, continuing in memory");
        }
    }

    /// Advisory analytics emission.
    pub(crate) async fn emit(&self, name: &str, properties: serde_json::Value) {
        if let Err(e) = self.deps.events.track(name, properties).await {
            tracing::warn!(event = name, error = %e, "telemetry emission failed");
        }
    }

    // === Run loop ===

    /// Drive the service: commands, segment deliveries, and timer deadlines
    /// multiplexed on one task.
    pub async fn run(mut self, mut commands: mpsc::Receiver<ServiceCommand>) {
        let mut segment_rx = self.deps.segments.subscribe();
        let mut segments_open = true;
        loop {
            let sleep_ms = self
                .scheduler
                .next_deadline()
                .map(|at| at.saturating_sub(self.now()));
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(ServiceCommand::Event(event)) => self.handle_event(&event).await,
                    Some(ServiceCommand::UserChanged { old, new }) => {
                        self.handle_user_change(&old, &new).await;
                    }
                    Some(ServiceCommand::Background) => self.on_background().await,
                    Some(ServiceCommand::Foreground) => self.on_foreground().await,
                    Some(ServiceCommand::Shutdown) | None => break,
                },
                change = segment_rx.recv(), if segments_open => match change {
                    Some(change) => self.handle_segment_change(&change).await,
                    None => segments_open = false,
                },
                _ = tokio::time::sleep(Duration::from_millis(sleep_ms.unwrap_or(0))),
                    if sleep_ms.is_some() =>
                {
                    self.tick().await;
                }
            }
        }
        tracing::info!("journey service stopped");
    }
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
