// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Profile and identity capability.

use async_trait::async_trait;
use jx_core::Campaign;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// Errors from profile operations.
#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("profile fetch failed: {0}")]
    FetchFailed(String),
    #[error("profile update failed: {0}")]
    UpdateFailed(String),
}

/// Lifecycle state of an experiment assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentStatus {
    Running,
    Stopped,
}

/// The user's assignment into one experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentAssignment {
    pub variant_key: String,
    pub status: ExperimentStatus,
    #[serde(default)]
    pub is_holdout: bool,
}

/// Everything the server knows about a user that the engine cares about.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub campaigns: Vec<Campaign>,
    #[serde(default)]
    pub user_properties: BTreeMap<String, serde_json::Value>,
    /// experiment id → assignment
    #[serde(default)]
    pub experiments: HashMap<String, ExperimentAssignment>,
    /// Feature ids the user is entitled to.
    #[serde(default)]
    pub features: Vec<String>,
}

/// Profile and identity capability.
///
/// Also serves as the interpreter's user-property source: `user(op, key)`
/// predicates resolve through [`jx_ir::UserPropertySource::property`].
#[async_trait]
pub trait ProfileAdapter: jx_ir::UserPropertySource + Clone + Send + Sync + 'static {
    /// Fetch the user's profile. Callers treat failure as "no campaigns".
    async fn fetch_profile(&self, distinct_id: &str) -> Result<Profile, ProfileError>;

    /// The current (possibly anonymous) distinct id.
    fn distinct_id(&self) -> String;

    /// The authenticated distinct id, `None` when anonymous.
    fn raw_distinct_id(&self) -> Option<String>;

    /// Apply profile attribute updates (the `updateCustomer` node).
    async fn update_properties(
        &self,
        attributes: BTreeMap<String, serde_json::Value>,
    ) -> Result<(), ProfileError>;
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use jx_ir::Value;
    use parking_lot::Mutex;
    use std::sync::Arc;

    struct FakeProfileState {
        profile: Profile,
        distinct_id: String,
        raw_distinct_id: Option<String>,
        fail_fetch: bool,
        updates: Vec<BTreeMap<String, serde_json::Value>>,
    }

    /// Fake profile adapter for testing.
    #[derive(Clone)]
    pub struct FakeProfileAdapter {
        inner: Arc<Mutex<FakeProfileState>>,
    }

    impl Default for FakeProfileAdapter {
        fn default() -> Self {
            Self::new("user-1")
        }
    }

    impl FakeProfileAdapter {
        pub fn new(distinct_id: impl Into<String>) -> Self {
            let distinct_id = distinct_id.into();
            Self {
                inner: Arc::new(Mutex::new(FakeProfileState {
                    profile: Profile::default(),
                    raw_distinct_id: Some(distinct_id.clone()),
                    distinct_id,
                    fail_fetch: false,
                    updates: Vec::new(),
                })),
            }
        }

        pub fn set_profile(&self, profile: Profile) {
            self.inner.lock().profile = profile;
        }

        pub fn set_campaigns(&self, campaigns: Vec<Campaign>) {
            self.inner.lock().profile.campaigns = campaigns;
        }

        pub fn set_user_property(&self, key: impl Into<String>, value: serde_json::Value) {
            self.inner.lock().profile.user_properties.insert(key.into(), value);
        }

        pub fn set_experiment(&self, id: impl Into<String>, assignment: ExperimentAssignment) {
            self.inner.lock().profile.experiments.insert(id.into(), assignment);
        }

        pub fn set_distinct_id(&self, distinct_id: impl Into<String>) {
            let mut state = self.inner.lock();
            state.distinct_id = distinct_id.into();
            state.raw_distinct_id = Some(state.distinct_id.clone());
        }

        /// Make subsequent `fetch_profile` calls fail.
        pub fn fail_fetches(&self) {
            self.inner.lock().fail_fetch = true;
        }

        /// Recorded `update_properties` calls.
        pub fn updates(&self) -> Vec<BTreeMap<String, serde_json::Value>> {
            self.inner.lock().updates.clone()
        }
    }

    #[async_trait]
    impl jx_ir::UserPropertySource for FakeProfileAdapter {
        async fn property(&self, key: &str) -> Option<Value> {
            let state = self.inner.lock();
            state.profile.user_properties.get(key).map(Value::from_json)
        }
    }

    #[async_trait]
    impl ProfileAdapter for FakeProfileAdapter {
        async fn fetch_profile(&self, _distinct_id: &str) -> Result<Profile, ProfileError> {
            let state = self.inner.lock();
            if state.fail_fetch {
                return Err(ProfileError::FetchFailed("scripted failure".into()));
            }
            Ok(state.profile.clone())
        }

        fn distinct_id(&self) -> String {
            self.inner.lock().distinct_id.clone()
        }

        fn raw_distinct_id(&self) -> Option<String> {
            self.inner.lock().raw_distinct_id.clone()
        }

        async fn update_properties(
            &self,
            attributes: BTreeMap<String, serde_json::Value>,
        ) -> Result<(), ProfileError> {
            let mut state = self.inner.lock();
            for (key, value) in &attributes {
                state.profile.user_properties.insert(key.clone(), value.clone());
            }
            state.updates.push(attributes);
            Ok(())
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeProfileAdapter;
