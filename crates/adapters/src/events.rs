// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event capability: history queries, analytics emission, and the
//! request/response channel used by `remote` workflow nodes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors from event emission.
#[derive(Debug, Error)]
pub enum EventError {
    #[error("transport failure: {0}")]
    Transport(String),
}

/// Error payload of a server-dispatched remote execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteError {
    pub message: String,
    pub retryable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

/// Result of a `track_with_response` round-trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteExecution {
    pub success: bool,
    #[serde(default)]
    pub status_code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RemoteError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_updates: Option<BTreeMap<String, serde_json::Value>>,
}

/// Event capability.
///
/// History queries come from the [`jx_ir::EventQuerySource`] supertrait; this
/// trait adds the emission channels.
#[async_trait]
pub trait EventAdapter: jx_ir::EventQuerySource + Clone + Send + Sync + 'static {
    /// Emit an analytics event. Failures are the adapter's to retry; callers
    /// treat emission as advisory.
    async fn track(&self, name: &str, properties: serde_json::Value) -> Result<(), EventError>;

    /// Emit an event and await the server-dispatched execution response
    /// (the `remote` node channel).
    async fn track_with_response(
        &self,
        name: &str,
        properties: serde_json::Value,
    ) -> Result<RemoteExecution, EventError>;
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use jx_ir::{pred_matches, Aggregation, EvalEvent, Period, ResolvedQuery};
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::Arc;

    /// One event in the fake store.
    #[derive(Debug, Clone)]
    pub struct StoredEvent {
        pub name: String,
        pub timestamp_ms: u64,
        pub properties: serde_json::Value,
    }

    /// A recorded `track` emission.
    #[derive(Debug, Clone)]
    pub struct TrackedCall {
        pub name: String,
        pub properties: serde_json::Value,
    }

    #[derive(Default)]
    struct FakeEventState {
        store: Vec<StoredEvent>,
        tracked: Vec<TrackedCall>,
        remote_responses: VecDeque<Result<RemoteExecution, EventError>>,
    }

    /// Fake event adapter: an in-memory event store with naive scan
    /// implementations of the history queries, plus scripted remote
    /// responses.
    #[derive(Clone, Default)]
    pub struct FakeEventAdapter {
        inner: Arc<Mutex<FakeEventState>>,
    }

    impl FakeEventAdapter {
        pub fn new() -> Self {
            Self::default()
        }

        /// Seed the history store.
        pub fn record(&self, name: impl Into<String>, timestamp_ms: u64) {
            self.record_with_properties(name, timestamp_ms, serde_json::Value::Null);
        }

        pub fn record_with_properties(
            &self,
            name: impl Into<String>,
            timestamp_ms: u64,
            properties: serde_json::Value,
        ) {
            self.inner.lock().store.push(StoredEvent {
                name: name.into(),
                timestamp_ms,
                properties,
            });
        }

        /// Queue the next `track_with_response` outcome.
        pub fn push_remote_response(&self, response: Result<RemoteExecution, EventError>) {
            self.inner.lock().remote_responses.push_back(response);
        }

        /// Recorded `track` emissions.
        pub fn tracked(&self) -> Vec<TrackedCall> {
            self.inner.lock().tracked.clone()
        }

        /// Recorded emissions with the given event name.
        pub fn tracked_named(&self, name: &str) -> Vec<TrackedCall> {
            self.tracked().into_iter().filter(|c| c.name == name).collect()
        }

        fn matching(&self, q: &ResolvedQuery) -> Vec<StoredEvent> {
            let state = self.inner.lock();
            let mut hits: Vec<StoredEvent> = state
                .store
                .iter()
                .filter(|e| event_matches(e, q))
                .cloned()
                .collect();
            hits.sort_by_key(|e| e.timestamp_ms);
            hits
        }
    }

    fn event_matches(event: &StoredEvent, q: &ResolvedQuery) -> bool {
        if event.name != q.name {
            return false;
        }
        if q.since.is_some_and(|since| event.timestamp_ms < since) {
            return false;
        }
        if q.until.is_some_and(|until| event.timestamp_ms > until) {
            return false;
        }
        let Some(pred) = &q.pred else { return true };
        let view = EvalEvent {
            name: &event.name,
            timestamp_ms: event.timestamp_ms,
            distinct_id: "",
            properties: &event.properties,
        };
        // Predicate failures are non-matches, not errors.
        pred_matches(pred, &|key| view.lookup(key)).unwrap_or(false)
    }

    #[async_trait]
    impl jx_ir::EventQuerySource for FakeEventAdapter {
        async fn exists(&self, q: &ResolvedQuery) -> bool {
            !self.matching(q).is_empty()
        }

        async fn count(&self, q: &ResolvedQuery) -> u64 {
            self.matching(q).len() as u64
        }

        async fn first_time(&self, q: &ResolvedQuery) -> Option<u64> {
            self.matching(q).first().map(|e| e.timestamp_ms)
        }

        async fn last_time(&self, q: &ResolvedQuery) -> Option<u64> {
            self.matching(q).last().map(|e| e.timestamp_ms)
        }

        async fn aggregate(
            &self,
            q: &ResolvedQuery,
            agg: Aggregation,
            prop: &str,
        ) -> Option<f64> {
            let values: Vec<f64> = self
                .matching(q)
                .iter()
                .filter_map(|e| descend_number(&e.properties, prop))
                .collect();
            if values.is_empty() {
                return None;
            }
            match agg {
                Aggregation::Sum => Some(values.iter().sum()),
                Aggregation::Min => values.iter().copied().reduce(f64::min),
                Aggregation::Max => values.iter().copied().reduce(f64::max),
                Aggregation::Avg => Some(values.iter().sum::<f64>() / values.len() as f64),
                Aggregation::Count => Some(values.len() as f64),
            }
        }

        async fn in_order(
            &self,
            steps: &[ResolvedQuery],
            overall_within_ms: Option<u64>,
            per_step_within_ms: Option<u64>,
        ) -> bool {
            if steps.is_empty() {
                return false;
            }
            let mut prev_ts: Option<u64> = None;
            let mut first_ts: Option<u64> = None;
            for step in steps {
                let hits = self.matching(step);
                let found = hits.iter().find(|e| {
                    let after_prev = prev_ts.is_none_or(|p| e.timestamp_ms > p);
                    let within_step = match (prev_ts, per_step_within_ms) {
                        (Some(p), Some(w)) => e.timestamp_ms.saturating_sub(p) <= w,
                        _ => true,
                    };
                    after_prev && within_step
                });
                match found {
                    Some(e) => {
                        first_ts.get_or_insert(e.timestamp_ms);
                        prev_ts = Some(e.timestamp_ms);
                    }
                    None => return false,
                }
            }
            match (first_ts, prev_ts, overall_within_ms) {
                (Some(first), Some(last), Some(w)) => last - first <= w,
                _ => true,
            }
        }

        async fn active_periods(&self, q: &ResolvedQuery, period: Period, total: u32) -> u32 {
            let hits = self.matching(q);
            let len = period.millis();
            let mut active = 0;
            for k in 0..total as u64 {
                let hi = q.now_ms.saturating_sub(k * len);
                let lo = q.now_ms.saturating_sub((k + 1) * len);
                if hits.iter().any(|e| e.timestamp_ms > lo && e.timestamp_ms <= hi) {
                    active += 1;
                }
            }
            active
        }

        async fn stopped(&self, q: &ResolvedQuery, inactive_for_ms: u64) -> bool {
            match self.matching(q).last() {
                Some(e) => q.now_ms.saturating_sub(e.timestamp_ms) >= inactive_for_ms,
                None => false,
            }
        }

        async fn restarted(
            &self,
            q: &ResolvedQuery,
            inactive_for_ms: u64,
            within_ms: u64,
        ) -> bool {
            let hits = self.matching(q);
            let floor = q.now_ms.saturating_sub(within_ms);
            hits.windows(2).any(|pair| {
                let (prior, restart) = (&pair[0], &pair[1]);
                restart.timestamp_ms >= floor
                    && restart.timestamp_ms - prior.timestamp_ms >= inactive_for_ms
            })
        }
    }

    #[async_trait]
    impl EventAdapter for FakeEventAdapter {
        async fn track(
            &self,
            name: &str,
            properties: serde_json::Value,
        ) -> Result<(), EventError> {
            self.inner.lock().tracked.push(TrackedCall {
                name: name.to_string(),
                properties,
            });
            Ok(())
        }

        async fn track_with_response(
            &self,
            name: &str,
            properties: serde_json::Value,
        ) -> Result<RemoteExecution, EventError> {
            let mut state = self.inner.lock();
            state.tracked.push(TrackedCall {
                name: name.to_string(),
                properties,
            });
            state
                .remote_responses
                .pop_front()
                .unwrap_or_else(|| Err(EventError::Transport("no scripted response".into())))
        }
    }

    fn descend_number(root: &serde_json::Value, path: &str) -> Option<f64> {
        let mut cur = root;
        for seg in path.split('.') {
            cur = cur.get(seg)?;
        }
        cur.as_f64()
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeEventAdapter, StoredEvent, TrackedCall};

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
