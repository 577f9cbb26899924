// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Interpreter errors.

use thiserror::Error;

/// Errors produced while evaluating an expression tree.
///
/// Evaluation sites that only need a boolean (trigger conditions, branch
/// conditions, goal filters) catch these and degrade to `false`; value-only
/// positions propagate them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IrError {
    /// An operator string in the serialized tree is not recognized.
    #[error("invalid operator: {0}")]
    InvalidOperator(String),

    /// Operand types are incompatible with the operator in a value position.
    #[error("type mismatch: {op} over {left} and {right}")]
    TypeMismatch {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },
}
