// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Capability traits the interpreter suspends on.
//!
//! The interpreter itself is pure; every lookup that touches user profile
//! data, event history, segment membership, or feature balances goes through
//! one of these traits. Production implementations live in `jx-adapters`.

use crate::expr::{Period, Pred, ResolvedQuery};
use crate::value::Value;
use async_trait::async_trait;

/// User profile properties.
#[async_trait]
pub trait UserPropertySource: Send + Sync {
    /// Current value of a profile property, `None` when unset.
    async fn property(&self, key: &str) -> Option<Value>;
}

/// Event-history queries.
///
/// Query semantics (windows, ordering, inactivity) are owned by the backing
/// event store; the interpreter only folds `within` into `since` before
/// delegating.
#[async_trait]
pub trait EventQuerySource: Send + Sync {
    async fn exists(&self, q: &ResolvedQuery) -> bool;
    async fn count(&self, q: &ResolvedQuery) -> u64;
    /// Timestamp (epoch ms) of the earliest matching event.
    async fn first_time(&self, q: &ResolvedQuery) -> Option<u64>;
    /// Timestamp (epoch ms) of the latest matching event.
    async fn last_time(&self, q: &ResolvedQuery) -> Option<u64>;
    /// Aggregate a numeric property over matching events. `None` when no
    /// event matches (except `count`, which the caller maps to zero).
    async fn aggregate(&self, q: &ResolvedQuery, agg: crate::expr::Aggregation, prop: &str)
        -> Option<f64>;
    /// Whether the steps occurred in order, each after the previous, subject
    /// to the overall and per-step windows (milliseconds).
    async fn in_order(
        &self,
        steps: &[ResolvedQuery],
        overall_within_ms: Option<u64>,
        per_step_within_ms: Option<u64>,
    ) -> bool;
    /// Number of period buckets (among the `total` most recent) containing
    /// at least one matching event.
    async fn active_periods(&self, q: &ResolvedQuery, period: Period, total: u32) -> u32;
    /// Whether the user stopped: a matching event exists, and none within
    /// the trailing inactivity window.
    async fn stopped(&self, q: &ResolvedQuery, inactive_for_ms: u64) -> bool;
    /// Whether the user restarted: a matching event within `within_ms`
    /// preceded by an inactivity gap of at least `inactive_for_ms`.
    async fn restarted(&self, q: &ResolvedQuery, inactive_for_ms: u64, within_ms: u64) -> bool;
}

/// Segment membership.
#[async_trait]
pub trait SegmentSource: Send + Sync {
    async fn is_member(&self, segment_id: &str) -> bool;
    /// When the user entered the segment, if currently a member.
    async fn entered_at(&self, segment_id: &str) -> Option<u64>;
}

/// Feature entitlements.
#[async_trait]
pub trait FeatureSource: Send + Sync {
    async fn has(&self, feature_id: &str) -> bool;
    async fn is_unlimited(&self, feature_id: &str) -> bool;
    async fn balance(&self, feature_id: &str) -> Option<f64>;
}

/// Evaluate a predicate tree against a property lookup.
///
/// Shared by event-store implementations so the operator semantics stay in
/// one place. Lookup failures and unknown operators degrade per the caller's
/// policy (the interpreter treats them as errors; stores treat them as
/// non-matches).
pub fn pred_matches<F>(pred: &Pred, lookup: &F) -> Result<bool, crate::IrError>
where
    F: Fn(&str) -> Option<Value>,
{
    match pred {
        Pred::Pred { op, key, value } => {
            let op = crate::expr::KeyOp::parse(op)?;
            let actual = lookup(key);
            let expected = value.as_ref().map(Value::from_json);
            crate::interp::apply_key_op(op, actual.as_ref(), expected.as_ref())
        }
        Pred::PredAnd { preds } => {
            for p in preds {
                if !pred_matches(p, lookup)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Pred::PredOr { preds } => {
            for p in preds {
                if pred_matches(p, lookup)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
    }
}
