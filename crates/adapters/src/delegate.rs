// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Application delegate capability: the `callDelegate` node posts
//! app-level notifications through this channel.

use async_trait::async_trait;
use thiserror::Error;

/// Errors from delegate posts.
#[derive(Debug, Error)]
pub enum DelegateError {
    #[error("post failed: {0}")]
    PostFailed(String),
}

/// Application-level notification capability.
#[async_trait]
pub trait DelegateAdapter: Clone + Send + Sync + 'static {
    /// Post a message with a payload to the host application.
    async fn post(&self, message: &str, payload: serde_json::Value) -> Result<(), DelegateError>;
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Recorded delegate post.
    #[derive(Debug, Clone)]
    pub struct DelegateCall {
        pub message: String,
        pub payload: serde_json::Value,
    }

    /// Fake delegate adapter recording posts.
    #[derive(Clone, Default)]
    pub struct FakeDelegateAdapter {
        calls: Arc<Mutex<Vec<DelegateCall>>>,
    }

    impl FakeDelegateAdapter {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn calls(&self) -> Vec<DelegateCall> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl DelegateAdapter for FakeDelegateAdapter {
        async fn post(
            &self,
            message: &str,
            payload: serde_json::Value,
        ) -> Result<(), DelegateError> {
            self.calls.lock().push(DelegateCall {
                message: message.to_string(),
                payload,
            });
            Ok(())
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{DelegateCall, FakeDelegateAdapter};
