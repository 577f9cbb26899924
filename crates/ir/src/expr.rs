// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Serialized expression algebra.
//!
//! Campaign triggers, branch conditions, wait paths, and goal filters all
//! carry an [`IrEnvelope`]: a versioned, JSON-encoded expression tree.
//! Operator strings are kept verbatim at decode time and parsed during
//! evaluation, so an unknown operator surfaces as
//! [`IrError::InvalidOperator`](crate::IrError) instead of a decode failure.

use crate::error::IrError;
use serde::{Deserialize, Serialize};

/// Versioned wrapper around a serialized expression tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrEnvelope {
    pub ir_version: u32,
    pub expr: Expr,
}

impl IrEnvelope {
    pub fn new(expr: Expr) -> Self {
        Self { ir_version: 1, expr }
    }
}

/// Filter shared by every event-history query: event name, an optional
/// absolute window, an optional relative window, and a property predicate.
///
/// Times are epoch milliseconds; `within_secs` is relative to evaluation
/// time and tightens `since` to `max(since, now - within)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct HistoryFilter {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub within_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pred: Option<Pred>,
}

impl HistoryFilter {
    /// Fold `within_secs` into `since` against the evaluation time.
    pub fn resolve(&self, now_ms: u64) -> ResolvedQuery {
        let mut since = self.since;
        if let Some(within) = self.within_secs {
            let floor = now_ms.saturating_sub(within * 1000);
            since = Some(since.map_or(floor, |s| s.max(floor)));
        }
        ResolvedQuery {
            name: self.name.clone(),
            since,
            until: self.until,
            pred: self.pred.clone(),
            now_ms,
        }
    }
}

/// A history filter with `within` already folded into `since`; this is what
/// event-query sources receive. Carries the evaluation time so sources can
/// bucket periods and measure inactivity against a consistent clock reading.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedQuery {
    pub name: String,
    pub since: Option<u64>,
    pub until: Option<u64>,
    pub pred: Option<Pred>,
    pub now_ms: u64,
}

/// Predicate tree over event properties. `not` is intentionally absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Pred {
    Pred {
        op: String,
        key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<serde_json::Value>,
    },
    PredAnd { preds: Vec<Pred> },
    PredOr { preds: Vec<Pred> },
}

/// One serialized expression node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Expr {
    // Literals
    Bool { value: bool },
    Number { value: f64 },
    String { value: String },
    Timestamp { value: u64 },
    Duration { secs: u64 },
    List { items: Vec<Expr> },
    TimeNow,
    TimeAgo { secs: u64 },
    TimeWindow { value: f64, interval: Interval },

    // Logic
    And { exprs: Vec<Expr> },
    Or { exprs: Vec<Expr> },
    Not { expr: Box<Expr> },
    Compare {
        op: String,
        left: Box<Expr>,
        right: Box<Expr>,
    },

    // Scoped predicates
    User {
        op: String,
        key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<serde_json::Value>,
    },
    Event {
        op: String,
        key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<serde_json::Value>,
    },
    Feature {
        op: String,
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<serde_json::Value>,
    },
    Segment {
        op: String,
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        within_secs: Option<u64>,
    },

    // Event-history queries
    Exists {
        #[serde(flatten)]
        filter: HistoryFilter,
    },
    Count {
        #[serde(flatten)]
        filter: HistoryFilter,
    },
    FirstTime {
        #[serde(flatten)]
        filter: HistoryFilter,
    },
    LastTime {
        #[serde(flatten)]
        filter: HistoryFilter,
    },
    LastAge {
        #[serde(flatten)]
        filter: HistoryFilter,
    },
    Aggregate {
        agg: String,
        prop: String,
        #[serde(flatten)]
        filter: HistoryFilter,
    },
    InOrder {
        steps: Vec<HistoryFilter>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        overall_within_secs: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        per_step_within_secs: Option<u64>,
    },
    ActivePeriods {
        period: String,
        total: u32,
        min: u32,
        #[serde(flatten)]
        filter: HistoryFilter,
    },
    Stopped {
        inactive_for_secs: u64,
        #[serde(flatten)]
        filter: HistoryFilter,
    },
    Restarted {
        inactive_for_secs: u64,
        within_secs_restart: u64,
        #[serde(flatten)]
        filter: HistoryFilter,
    },
}

/// Calendar interval for `timeWindow` literals. Month and year use fixed
/// 30-day and 365-day lengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interval {
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl Interval {
    pub fn millis(self) -> u64 {
        match self {
            Interval::Hour => 3_600_000,
            Interval::Day => 86_400_000,
            Interval::Week => 7 * 86_400_000,
            Interval::Month => 30 * 86_400_000,
            Interval::Year => 365 * 86_400_000,
        }
    }
}

/// Bucketing period for `activePeriods`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Day,
    Week,
    Month,
}

impl Period {
    pub fn parse(s: &str) -> Result<Period, IrError> {
        match s {
            "day" => Ok(Period::Day),
            "week" => Ok(Period::Week),
            "month" => Ok(Period::Month),
            other => Err(IrError::InvalidOperator(other.to_string())),
        }
    }

    pub fn millis(self) -> u64 {
        match self {
            Period::Day => 86_400_000,
            Period::Week => 7 * 86_400_000,
            Period::Month => 30 * 86_400_000,
        }
    }
}

/// Aggregation over an event property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    Sum,
    Min,
    Max,
    Avg,
    Count,
}

impl Aggregation {
    pub fn parse(s: &str) -> Result<Aggregation, IrError> {
        match s {
            "sum" => Ok(Aggregation::Sum),
            "min" => Ok(Aggregation::Min),
            "max" => Ok(Aggregation::Max),
            "avg" => Ok(Aggregation::Avg),
            "count" => Ok(Aggregation::Count),
            other => Err(IrError::InvalidOperator(other.to_string())),
        }
    }
}

/// Top-level comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
    NotIn,
}

impl CompareOp {
    pub fn parse(s: &str) -> Result<CompareOp, IrError> {
        match s {
            "eq" => Ok(CompareOp::Eq),
            "neq" => Ok(CompareOp::Neq),
            "lt" => Ok(CompareOp::Lt),
            "lte" => Ok(CompareOp::Lte),
            "gt" => Ok(CompareOp::Gt),
            "gte" => Ok(CompareOp::Gte),
            "in" => Ok(CompareOp::In),
            "notIn" => Ok(CompareOp::NotIn),
            other => Err(IrError::InvalidOperator(other.to_string())),
        }
    }
}

/// Per-key operators for `user`, `event`, and property predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOp {
    IsSet,
    IsNotSet,
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    IContains,
    Regex,
    In,
    NotIn,
    IsDateExact,
    IsDateAfter,
    IsDateBefore,
}

impl KeyOp {
    pub fn parse(s: &str) -> Result<KeyOp, IrError> {
        match s {
            "has" | "is_set" => Ok(KeyOp::IsSet),
            "is_not_set" => Ok(KeyOp::IsNotSet),
            "eq" => Ok(KeyOp::Eq),
            "neq" => Ok(KeyOp::Neq),
            "gt" => Ok(KeyOp::Gt),
            "gte" => Ok(KeyOp::Gte),
            "lt" => Ok(KeyOp::Lt),
            "lte" => Ok(KeyOp::Lte),
            "icontains" => Ok(KeyOp::IContains),
            "regex" => Ok(KeyOp::Regex),
            "in" => Ok(KeyOp::In),
            "not_in" => Ok(KeyOp::NotIn),
            "is_date_exact" => Ok(KeyOp::IsDateExact),
            "is_date_after" => Ok(KeyOp::IsDateAfter),
            "is_date_before" => Ok(KeyOp::IsDateBefore),
            other => Err(IrError::InvalidOperator(other.to_string())),
        }
    }
}

/// Membership operators for `segment`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentOp {
    IsMember,
    NotMember,
    EnteredWithin,
}

impl SegmentOp {
    pub fn parse(s: &str) -> Result<SegmentOp, IrError> {
        match s {
            "is_member" => Ok(SegmentOp::IsMember),
            "not_member" => Ok(SegmentOp::NotMember),
            "entered_within" => Ok(SegmentOp::EnteredWithin),
            other => Err(IrError::InvalidOperator(other.to_string())),
        }
    }
}

/// Feature-access operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureOp {
    Has,
    NotHas,
    IsUnlimited,
    CreditsEq,
    CreditsNeq,
    CreditsGt,
    CreditsGte,
    CreditsLt,
    CreditsLte,
}

impl FeatureOp {
    pub fn parse(s: &str) -> Result<FeatureOp, IrError> {
        match s {
            "has" => Ok(FeatureOp::Has),
            "not_has" => Ok(FeatureOp::NotHas),
            "is_unlimited" => Ok(FeatureOp::IsUnlimited),
            "credits_eq" => Ok(FeatureOp::CreditsEq),
            "credits_neq" => Ok(FeatureOp::CreditsNeq),
            "credits_gt" => Ok(FeatureOp::CreditsGt),
            "credits_gte" => Ok(FeatureOp::CreditsGte),
            "credits_lt" => Ok(FeatureOp::CreditsLt),
            "credits_lte" => Ok(FeatureOp::CreditsLte),
            other => Err(IrError::InvalidOperator(other.to_string())),
        }
    }
}

#[cfg(test)]
#[path = "expr_tests.rs"]
mod tests;
