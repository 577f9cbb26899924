// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Feature entitlement capability.

/// Feature entitlements: everything comes from the [`jx_ir::FeatureSource`]
/// supertrait; this trait only adds the engine's threading bounds.
pub trait FeatureAdapter: jx_ir::FeatureSource + Clone + Send + Sync + 'static {}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::{HashMap, HashSet};
    use std::sync::Arc;

    #[derive(Default)]
    struct FakeFeatureState {
        balances: HashMap<String, f64>,
        unlimited: HashSet<String>,
    }

    /// Fake feature adapter with direct balance control.
    #[derive(Clone, Default)]
    pub struct FakeFeatureAdapter {
        inner: Arc<Mutex<FakeFeatureState>>,
    }

    impl FakeFeatureAdapter {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn grant(&self, feature_id: impl Into<String>, balance: f64) {
            self.inner.lock().balances.insert(feature_id.into(), balance);
        }

        pub fn grant_unlimited(&self, feature_id: impl Into<String>) {
            let id = feature_id.into();
            let mut state = self.inner.lock();
            state.balances.insert(id.clone(), f64::INFINITY);
            state.unlimited.insert(id);
        }
    }

    #[async_trait]
    impl jx_ir::FeatureSource for FakeFeatureAdapter {
        async fn has(&self, feature_id: &str) -> bool {
            self.inner.lock().balances.contains_key(feature_id)
        }

        async fn is_unlimited(&self, feature_id: &str) -> bool {
            self.inner.lock().unlimited.contains(feature_id)
        }

        async fn balance(&self, feature_id: &str) -> Option<f64> {
            self.inner.lock().balances.get(feature_id).copied()
        }
    }

    impl FeatureAdapter for FakeFeatureAdapter {}
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeFeatureAdapter;
