// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Segment membership capability and the membership-change stream.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// One delivery on the segment-change stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentChange {
    pub distinct_id: String,
    #[serde(default)]
    pub entered: Vec<String>,
    #[serde(default)]
    pub exited: Vec<String>,
    #[serde(default)]
    pub remained: Vec<String>,
}

/// Segment membership capability.
///
/// Point lookups come from the [`jx_ir::SegmentSource`] supertrait; this
/// trait adds the change subscription. The subscription is single-consumer
/// and bound to the service lifetime; dropping the receiver cancels it.
pub trait SegmentAdapter: jx_ir::SegmentSource + Clone + Send + Sync + 'static {
    /// Subscribe to membership-change deliveries. Calling again replaces any
    /// prior subscription.
    fn subscribe(&self) -> mpsc::Receiver<SegmentChange>;
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::Arc;

    #[derive(Default)]
    struct FakeSegmentState {
        /// segment id → entered-at (epoch ms); presence means membership.
        members: HashMap<String, u64>,
        sender: Option<mpsc::Sender<SegmentChange>>,
    }

    /// Fake segment adapter with direct membership control.
    #[derive(Clone, Default)]
    pub struct FakeSegmentAdapter {
        inner: Arc<Mutex<FakeSegmentState>>,
    }

    impl FakeSegmentAdapter {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn join(&self, segment_id: impl Into<String>, entered_at_ms: u64) {
            self.inner.lock().members.insert(segment_id.into(), entered_at_ms);
        }

        pub fn leave(&self, segment_id: &str) {
            self.inner.lock().members.remove(segment_id);
        }

        /// Push a change delivery to the subscriber, if any.
        pub async fn push_change(&self, change: SegmentChange) {
            let sender = self.inner.lock().sender.clone();
            if let Some(sender) = sender {
                let _ = sender.send(change).await;
            }
        }
    }

    #[async_trait]
    impl jx_ir::SegmentSource for FakeSegmentAdapter {
        async fn is_member(&self, segment_id: &str) -> bool {
            self.inner.lock().members.contains_key(segment_id)
        }

        async fn entered_at(&self, segment_id: &str) -> Option<u64> {
            self.inner.lock().members.get(segment_id).copied()
        }
    }

    impl SegmentAdapter for FakeSegmentAdapter {
        fn subscribe(&self) -> mpsc::Receiver<SegmentChange> {
            let (tx, rx) = mpsc::channel(16);
            self.inner.lock().sender = Some(tx);
            rx
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeSegmentAdapter;
