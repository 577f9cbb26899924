// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resume-deadline table.
//!
//! At most one deadline per journey: re-arming replaces the prior entry,
//! which is what makes app-foreground re-arms idempotent. Cancelling never
//! touches journey state.

use jx_core::JourneyId;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct ResumeScheduler {
    deadlines: HashMap<JourneyId, u64>,
}

impl ResumeScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm (or re-arm) the resume deadline for a journey.
    pub fn set(&mut self, id: JourneyId, deadline_ms: u64) {
        self.deadlines.insert(id, deadline_ms);
    }

    /// Cancel a journey's deadline. Idempotent.
    pub fn cancel(&mut self, id: &JourneyId) {
        self.deadlines.remove(id);
    }

    pub fn cancel_all(&mut self) {
        self.deadlines.clear();
    }

    pub fn deadline_for(&self, id: &JourneyId) -> Option<u64> {
        self.deadlines.get(id).copied()
    }

    /// Earliest armed deadline, for the run loop's sleep.
    pub fn next_deadline(&self) -> Option<u64> {
        self.deadlines.values().min().copied()
    }

    pub fn has_timers(&self) -> bool {
        !self.deadlines.is_empty()
    }

    /// Remove and return the journeys whose deadlines have matured, in
    /// (deadline, id) order.
    pub fn fired(&mut self, now_ms: u64) -> Vec<JourneyId> {
        let mut due: Vec<(u64, JourneyId)> = self
            .deadlines
            .iter()
            .filter(|(_, at)| **at <= now_ms)
            .map(|(id, at)| (*at, *id))
            .collect();
        due.sort();
        for (_, id) in &due {
            self.deadlines.remove(id);
        }
        due.into_iter().map(|(_, id)| id).collect()
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
