// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Frequency-policy admission control.
//!
//! A pure decision over the inputs the service already holds: the live
//! journey for the (user, campaign) pair from the in-memory registry, and
//! the completion ledger.

use jx_core::{FrequencyPolicy, Journey, JourneyId};

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allow,
    /// Admit, but cancel the named live journey first (fixed-interval
    /// override).
    AllowAfterCancelling(JourneyId),
    Deny,
}

impl Admission {
    pub fn is_denied(self) -> bool {
        self == Admission::Deny
    }
}

/// Decide whether a new journey may start for a (user, campaign).
///
/// `live` is the currently live journey for the pair, if any;
/// `last_completion_ms` comes from the ledger.
pub fn admit(
    policy: FrequencyPolicy,
    interval_secs: Option<u64>,
    live: Option<&Journey>,
    has_completed: bool,
    last_completion_ms: Option<u64>,
    now_ms: u64,
) -> Admission {
    match policy {
        FrequencyPolicy::Once => {
            if has_completed || live.is_some() {
                Admission::Deny
            } else {
                Admission::Allow
            }
        }
        FrequencyPolicy::EveryRematch => {
            if live.is_some() {
                Admission::Deny
            } else {
                Admission::Allow
            }
        }
        FrequencyPolicy::FixedInterval => {
            let interval_ms = interval_secs.unwrap_or(0) * 1000;
            if let Some(live) = live {
                if now_ms.saturating_sub(live.started_at) >= interval_ms {
                    Admission::AllowAfterCancelling(live.id)
                } else {
                    Admission::Deny
                }
            } else if let Some(last) = last_completion_ms {
                if now_ms.saturating_sub(last) >= interval_ms {
                    Admission::Allow
                } else {
                    Admission::Deny
                }
            } else {
                Admission::Allow
            }
        }
    }
}

#[cfg(test)]
#[path = "frequency_tests.rs"]
mod tests;
