// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Flow presentation capability.
//!
//! Presentation is advisory: the engine requests a flow and moves on (or
//! parks the journey); outcomes come back as ordinary tracked events
//! (`$paywall_shown`, `$transaction_complete`, ...).

use async_trait::async_trait;
use jx_core::JourneyId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from flow presentation.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("presentation failed: {0}")]
    PresentationFailed(String),
}

/// A request to present a flow on behalf of a journey node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowRequest {
    pub journey_id: JourneyId,
    pub campaign_id: String,
    pub node_id: String,
    pub flow_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experiment_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_key: Option<String>,
}

/// Flow presentation capability.
#[async_trait]
pub trait FlowAdapter: Clone + Send + Sync + 'static {
    async fn present(&self, request: FlowRequest) -> Result<(), FlowError>;
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Default)]
    struct FakeFlowState {
        presented: Vec<FlowRequest>,
        fail: bool,
    }

    /// Fake flow adapter recording presentation requests.
    #[derive(Clone, Default)]
    pub struct FakeFlowAdapter {
        inner: Arc<Mutex<FakeFlowState>>,
    }

    impl FakeFlowAdapter {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn presented(&self) -> Vec<FlowRequest> {
            self.inner.lock().presented.clone()
        }

        /// Make subsequent `present` calls fail.
        pub fn fail_presentations(&self) {
            self.inner.lock().fail = true;
        }
    }

    #[async_trait]
    impl FlowAdapter for FakeFlowAdapter {
        async fn present(&self, request: FlowRequest) -> Result<(), FlowError> {
            let mut state = self.inner.lock();
            if state.fail {
                return Err(FlowError::PresentationFailed("scripted failure".into()));
            }
            state.presented.push(request);
            Ok(())
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeFlowAdapter;
