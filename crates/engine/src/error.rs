// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine errors.
//!
//! Everything that goes wrong inside a single journey step is absorbed into
//! a journey state transition; the orchestrator never throws outward. These
//! variants classify the per-journey failures so logs and callers can tell
//! them apart. Interpreter and store failures keep their own error types
//! (`jx_ir::IrError`, `jx_storage::StoreError`) and are degraded at their
//! evaluation and persistence sites.

use jx_core::JourneyId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Operation addressed a journey that is terminal or unknown.
    #[error("journey {0} is not live")]
    NotLive(JourneyId),

    /// The journey points at a node the campaign no longer contains.
    #[error("node {node_id} not found in campaign {campaign_id}")]
    NodeNotFound {
        campaign_id: String,
        node_id: String,
    },

    /// The campaign backing a journey could not be resolved.
    #[error("campaign {0} not resolvable")]
    CampaignNotFound(String),
}
