// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime value model for expression evaluation.

use crate::error::IrError;
use chrono::{DateTime, Datelike};
use std::cmp::Ordering;

/// A value produced while evaluating an expression tree.
///
/// Timestamps and durations are epoch/interval milliseconds. Serialized
/// durations are seconds and get converted at decode sites.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
    Timestamp(u64),
    Duration(u64),
    List(Vec<Value>),
}

impl Value {
    /// Boolean-position coercion: numbers non-zero truthy, strings and lists
    /// non-empty truthy, null falsy, timestamps truthy iff present.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Timestamp(_) => true,
            Value::Duration(d) => *d != 0,
            Value::List(items) => !items.is_empty(),
        }
    }

    /// Static name for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Timestamp(_) => "timestamp",
            Value::Duration(_) => "duration",
            Value::List(_) => "list",
        }
    }

    /// Convert a JSON literal into a value. Numbers stay numbers; there is
    /// no implicit timestamp detection on this path.
    pub fn from_json(v: &serde_json::Value) -> Value {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(0.0)),
            serde_json::Value::String(s) => Value::Str(s.clone()),
            serde_json::Value::Array(items) => {
                Value::List(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(_) => Value::Null,
        }
    }

    /// Numeric view over numbers, timestamps, and durations.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Timestamp(ms) => Some(*ms as f64),
            Value::Duration(ms) => Some(*ms as f64),
            _ => None,
        }
    }

    /// Epoch-millisecond view: timestamps directly, numbers interpreted as
    /// epoch milliseconds.
    pub fn as_timestamp_ms(&self) -> Option<u64> {
        match self {
            Value::Timestamp(ms) => Some(*ms),
            Value::Number(n) if *n >= 0.0 => Some(*n as u64),
            _ => None,
        }
    }

    /// Loose equality: numeric kinds compare by value, otherwise same-kind
    /// structural comparison. Cross-kind comparisons are unequal.
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self.as_number(), other.as_number()) {
            (Some(a), Some(b)) => return a == b,
            (None, None) => {}
            _ => return false,
        }
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.loose_eq(y))
            }
            _ => false,
        }
    }

    /// Ordering for the relational operators. Numeric kinds order by value,
    /// strings lexicographically; anything else is a type mismatch.
    pub fn ordered_against(&self, other: &Value, op: &'static str) -> Result<Ordering, IrError> {
        if let (Some(a), Some(b)) = (self.as_number(), other.as_number()) {
            return Ok(a.partial_cmp(&b).unwrap_or(Ordering::Equal));
        }
        if let (Value::Str(a), Value::Str(b)) = (self, other) {
            return Ok(a.cmp(b));
        }
        Err(IrError::TypeMismatch {
            op,
            left: self.type_name(),
            right: other.type_name(),
        })
    }

    /// Membership test for `in`/`not_in`: list on the right.
    pub fn contained_in(&self, other: &Value, op: &'static str) -> Result<bool, IrError> {
        match other {
            Value::List(items) => Ok(items.iter().any(|i| i.loose_eq(self))),
            _ => Err(IrError::TypeMismatch {
                op,
                left: self.type_name(),
                right: other.type_name(),
            }),
        }
    }
}

/// Civil (calendar) day of an epoch-millisecond timestamp, in UTC.
/// Returns days since the epoch, so equal values mean the same calendar day.
pub fn civil_day(epoch_ms: u64) -> Option<i64> {
    let dt = DateTime::from_timestamp_millis(epoch_ms as i64)?;
    Some(dt.date_naive().num_days_from_ce() as i64)
}

#[cfg(test)]
#[path = "value_tests.rs"]
mod tests;
