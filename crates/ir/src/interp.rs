// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Expression evaluation.
//!
//! Evaluation is pure: all I/O happens through the sources on the
//! [`EvalContext`], which may suspend. A missing source makes the dependent
//! query false (zero/null in value position) rather than an error; malformed
//! trees surface [`IrError`].

use crate::context::EvalContext;
use crate::error::IrError;
use crate::expr::{
    Aggregation, CompareOp, Expr, FeatureOp, IrEnvelope, KeyOp, Period, SegmentOp,
};
use crate::value::{civil_day, Value};
use futures::future::BoxFuture;
use futures::FutureExt;

/// Evaluate an envelope in boolean position.
pub async fn eval_bool(env: &IrEnvelope, ctx: EvalContext<'_>) -> Result<bool, IrError> {
    Ok(eval(&env.expr, ctx).await?.is_truthy())
}

/// Evaluate an envelope in value position.
pub async fn eval_value(env: &IrEnvelope, ctx: EvalContext<'_>) -> Result<Value, IrError> {
    eval(&env.expr, ctx).await
}

fn eval<'a>(expr: &'a Expr, ctx: EvalContext<'a>) -> BoxFuture<'a, Result<Value, IrError>> {
    async move {
        match expr {
            // Literals
            Expr::Bool { value } => Ok(Value::Bool(*value)),
            Expr::Number { value } => Ok(Value::Number(*value)),
            Expr::String { value } => Ok(Value::Str(value.clone())),
            Expr::Timestamp { value } => Ok(Value::Timestamp(*value)),
            Expr::Duration { secs } => Ok(Value::Duration(secs * 1000)),
            Expr::List { items } => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(eval(item, ctx).await?);
                }
                Ok(Value::List(out))
            }
            Expr::TimeNow => Ok(Value::Timestamp(ctx.now_ms)),
            Expr::TimeAgo { secs } => {
                Ok(Value::Timestamp(ctx.now_ms.saturating_sub(secs * 1000)))
            }
            Expr::TimeWindow { value, interval } => {
                Ok(Value::Duration((value * interval.millis() as f64) as u64))
            }

            // Logic
            Expr::And { exprs } => {
                for e in exprs {
                    if !eval(e, ctx).await?.is_truthy() {
                        return Ok(Value::Bool(false));
                    }
                }
                Ok(Value::Bool(true))
            }
            Expr::Or { exprs } => {
                for e in exprs {
                    if eval(e, ctx).await?.is_truthy() {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(Value::Bool(false))
            }
            Expr::Not { expr } => Ok(Value::Bool(!eval(expr, ctx).await?.is_truthy())),
            Expr::Compare { op, left, right } => {
                let op = CompareOp::parse(op)?;
                let l = eval(left, ctx).await?;
                let r = eval(right, ctx).await?;
                compare(op, &l, &r).map(Value::Bool)
            }

            // Scoped predicates
            Expr::User { op, key, value } => {
                let op = KeyOp::parse(op)?;
                let Some(user) = ctx.user else {
                    return Ok(Value::Bool(false));
                };
                let actual = user.property(key).await;
                let expected = value.as_ref().map(Value::from_json);
                apply_key_op(op, actual.as_ref(), expected.as_ref()).map(Value::Bool)
            }
            Expr::Event { op, key, value } => {
                let op = KeyOp::parse(op)?;
                let Some(event) = ctx.event else {
                    return Ok(Value::Bool(false));
                };
                let actual = event.lookup(key);
                let expected = value.as_ref().map(Value::from_json);
                apply_key_op(op, actual.as_ref(), expected.as_ref()).map(Value::Bool)
            }
            Expr::Feature { op, id, value } => {
                let op = FeatureOp::parse(op)?;
                let Some(features) = ctx.features else {
                    return Ok(Value::Bool(false));
                };
                eval_feature(op, id, value.as_ref(), features).await.map(Value::Bool)
            }
            Expr::Segment { op, id, within_secs } => {
                let op = SegmentOp::parse(op)?;
                let Some(segments) = ctx.segments else {
                    return Ok(Value::Bool(false));
                };
                let held = match op {
                    SegmentOp::IsMember => segments.is_member(id).await,
                    SegmentOp::NotMember => !segments.is_member(id).await,
                    SegmentOp::EnteredWithin => match segments.entered_at(id).await {
                        Some(at) => {
                            let within_ms = within_secs.unwrap_or(0) * 1000;
                            ctx.now_ms.saturating_sub(at) <= within_ms
                        }
                        None => false,
                    },
                };
                Ok(Value::Bool(held))
            }

            // Event-history queries
            Expr::Exists { filter } => {
                let Some(events) = ctx.events else {
                    return Ok(Value::Bool(false));
                };
                Ok(Value::Bool(events.exists(&filter.resolve(ctx.now_ms)).await))
            }
            Expr::Count { filter } => {
                let Some(events) = ctx.events else {
                    return Ok(Value::Number(0.0));
                };
                Ok(Value::Number(events.count(&filter.resolve(ctx.now_ms)).await as f64))
            }
            Expr::FirstTime { filter } => {
                let Some(events) = ctx.events else {
                    return Ok(Value::Null);
                };
                Ok(opt_ts(events.first_time(&filter.resolve(ctx.now_ms)).await))
            }
            Expr::LastTime { filter } => {
                let Some(events) = ctx.events else {
                    return Ok(Value::Null);
                };
                Ok(opt_ts(events.last_time(&filter.resolve(ctx.now_ms)).await))
            }
            Expr::LastAge { filter } => {
                let Some(events) = ctx.events else {
                    return Ok(Value::Null);
                };
                match events.last_time(&filter.resolve(ctx.now_ms)).await {
                    Some(at) => Ok(Value::Duration(ctx.now_ms.saturating_sub(at))),
                    None => Ok(Value::Null),
                }
            }
            Expr::Aggregate { agg, prop, filter } => {
                let agg = Aggregation::parse(agg)?;
                let Some(events) = ctx.events else {
                    return Ok(if agg == Aggregation::Count {
                        Value::Number(0.0)
                    } else {
                        Value::Null
                    });
                };
                let q = filter.resolve(ctx.now_ms);
                match agg {
                    Aggregation::Count => Ok(Value::Number(events.count(&q).await as f64)),
                    _ => match events.aggregate(&q, agg, prop).await {
                        Some(n) => Ok(Value::Number(n)),
                        None => Ok(Value::Null),
                    },
                }
            }
            Expr::InOrder { steps, overall_within_secs, per_step_within_secs } => {
                let Some(events) = ctx.events else {
                    return Ok(Value::Bool(false));
                };
                let resolved: Vec<_> = steps.iter().map(|s| s.resolve(ctx.now_ms)).collect();
                let held = events
                    .in_order(
                        &resolved,
                        overall_within_secs.map(|s| s * 1000),
                        per_step_within_secs.map(|s| s * 1000),
                    )
                    .await;
                Ok(Value::Bool(held))
            }
            Expr::ActivePeriods { period, total, min, filter } => {
                let period = Period::parse(period)?;
                let Some(events) = ctx.events else {
                    return Ok(Value::Bool(false));
                };
                let active = events
                    .active_periods(&filter.resolve(ctx.now_ms), period, *total)
                    .await;
                Ok(Value::Bool(active >= *min))
            }
            Expr::Stopped { inactive_for_secs, filter } => {
                let Some(events) = ctx.events else {
                    return Ok(Value::Bool(false));
                };
                let held = events
                    .stopped(&filter.resolve(ctx.now_ms), inactive_for_secs * 1000)
                    .await;
                Ok(Value::Bool(held))
            }
            Expr::Restarted { inactive_for_secs, within_secs_restart, filter } => {
                let Some(events) = ctx.events else {
                    return Ok(Value::Bool(false));
                };
                let held = events
                    .restarted(
                        &filter.resolve(ctx.now_ms),
                        inactive_for_secs * 1000,
                        within_secs_restart * 1000,
                    )
                    .await;
                Ok(Value::Bool(held))
            }
        }
    }
    .boxed()
}

fn opt_ts(t: Option<u64>) -> Value {
    match t {
        Some(ms) => Value::Timestamp(ms),
        None => Value::Null,
    }
}

fn compare(op: CompareOp, left: &Value, right: &Value) -> Result<bool, IrError> {
    use std::cmp::Ordering;
    match op {
        CompareOp::Eq => Ok(left.loose_eq(right)),
        CompareOp::Neq => Ok(!left.loose_eq(right)),
        CompareOp::Lt => Ok(left.ordered_against(right, "lt")? == Ordering::Less),
        CompareOp::Lte => Ok(left.ordered_against(right, "lte")? != Ordering::Greater),
        CompareOp::Gt => Ok(left.ordered_against(right, "gt")? == Ordering::Greater),
        CompareOp::Gte => Ok(left.ordered_against(right, "gte")? != Ordering::Less),
        CompareOp::In => left.contained_in(right, "in"),
        CompareOp::NotIn => Ok(!left.contained_in(right, "notIn")?),
    }
}

async fn eval_feature(
    op: FeatureOp,
    id: &str,
    expected: Option<&serde_json::Value>,
    features: &dyn crate::sources::FeatureSource,
) -> Result<bool, IrError> {
    use std::cmp::Ordering;
    let credits_cmp = |balance: Option<f64>| -> Result<Option<Ordering>, IrError> {
        let Some(balance) = balance else { return Ok(None) };
        let expected = expected
            .and_then(|v| v.as_f64())
            .ok_or(IrError::TypeMismatch { op: "credits", left: "number", right: "null" })?;
        Ok(balance.partial_cmp(&expected))
    };
    match op {
        FeatureOp::Has => Ok(features.has(id).await),
        FeatureOp::NotHas => Ok(!features.has(id).await),
        FeatureOp::IsUnlimited => Ok(features.is_unlimited(id).await),
        FeatureOp::CreditsEq => {
            Ok(credits_cmp(features.balance(id).await)? == Some(Ordering::Equal))
        }
        FeatureOp::CreditsNeq => {
            let ord = credits_cmp(features.balance(id).await)?;
            Ok(ord.is_some() && ord != Some(Ordering::Equal))
        }
        FeatureOp::CreditsGt => {
            Ok(credits_cmp(features.balance(id).await)? == Some(Ordering::Greater))
        }
        FeatureOp::CreditsGte => {
            let ord = credits_cmp(features.balance(id).await)?;
            Ok(matches!(ord, Some(Ordering::Greater) | Some(Ordering::Equal)))
        }
        FeatureOp::CreditsLt => {
            Ok(credits_cmp(features.balance(id).await)? == Some(Ordering::Less))
        }
        FeatureOp::CreditsLte => {
            let ord = credits_cmp(features.balance(id).await)?;
            Ok(matches!(ord, Some(Ordering::Less) | Some(Ordering::Equal)))
        }
    }
}

/// Apply a per-key operator to an optional actual value and an optional
/// expected literal. Missing actual values match only `is_not_set`.
pub fn apply_key_op(
    op: KeyOp,
    actual: Option<&Value>,
    expected: Option<&Value>,
) -> Result<bool, IrError> {
    use std::cmp::Ordering;
    let is_set = matches!(actual, Some(v) if !matches!(v, Value::Null));
    match op {
        KeyOp::IsSet => return Ok(is_set),
        KeyOp::IsNotSet => return Ok(!is_set),
        _ => {}
    }
    let Some(actual) = actual.filter(|v| !matches!(v, Value::Null)) else {
        return Ok(false);
    };
    let expected = expected.ok_or(IrError::TypeMismatch {
        op: "key-op",
        left: actual.type_name(),
        right: "null",
    })?;
    match op {
        KeyOp::IsSet | KeyOp::IsNotSet => Ok(true),
        KeyOp::Eq => Ok(actual.loose_eq(expected)),
        KeyOp::Neq => Ok(!actual.loose_eq(expected)),
        KeyOp::Gt => Ok(actual.ordered_against(expected, "gt")? == Ordering::Greater),
        KeyOp::Gte => Ok(actual.ordered_against(expected, "gte")? != Ordering::Less),
        KeyOp::Lt => Ok(actual.ordered_against(expected, "lt")? == Ordering::Less),
        KeyOp::Lte => Ok(actual.ordered_against(expected, "lte")? != Ordering::Greater),
        KeyOp::IContains => match (actual, expected) {
            (Value::Str(a), Value::Str(e)) => {
                Ok(a.to_lowercase().contains(&e.to_lowercase()))
            }
            _ => Ok(false),
        },
        KeyOp::Regex => match (actual, expected) {
            (Value::Str(a), Value::Str(pattern)) => match regex::Regex::new(pattern) {
                Ok(re) => Ok(re.is_match(a)),
                Err(e) => {
                    tracing::debug!(pattern, error = %e, "invalid regex in predicate");
                    Ok(false)
                }
            },
            _ => Ok(false),
        },
        KeyOp::In => actual.contained_in(expected, "in"),
        KeyOp::NotIn => Ok(!actual.contained_in(expected, "not_in")?),
        KeyOp::IsDateExact => Ok(civil_pair(actual, expected)
            .map(|(a, e)| a == e)
            .unwrap_or(false)),
        KeyOp::IsDateAfter => Ok(civil_pair(actual, expected)
            .map(|(a, e)| a > e)
            .unwrap_or(false)),
        KeyOp::IsDateBefore => Ok(civil_pair(actual, expected)
            .map(|(a, e)| a < e)
            .unwrap_or(false)),
    }
}

fn civil_pair(actual: &Value, expected: &Value) -> Option<(i64, i64)> {
    let a = civil_day(actual.as_timestamp_ms()?)?;
    let e = civil_day(expected.as_timestamp_ms()?)?;
    Some((a, e))
}

#[cfg(test)]
#[path = "interp_tests.rs"]
mod tests;
