// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! jx-adapters: contracts for the engine's external collaborators.
//!
//! The journey engine consumes profile, event, segment, feature, flow, and
//! delegate capabilities through the traits defined here. Host applications
//! provide the production implementations; fake implementations for tests
//! live behind the `test-support` feature.

pub mod delegate;
pub mod events;
pub mod features;
pub mod flows;
pub mod profile;
pub mod segments;

pub use delegate::{DelegateAdapter, DelegateError};
pub use events::{EventAdapter, EventError, RemoteError, RemoteExecution};
pub use features::FeatureAdapter;
pub use flows::{FlowAdapter, FlowError, FlowRequest};
pub use profile::{ExperimentAssignment, ExperimentStatus, Profile, ProfileAdapter, ProfileError};
pub use segments::{SegmentAdapter, SegmentChange};

#[cfg(any(test, feature = "test-support"))]
pub use delegate::FakeDelegateAdapter;
#[cfg(any(test, feature = "test-support"))]
pub use events::{FakeEventAdapter, StoredEvent, TrackedCall};
#[cfg(any(test, feature = "test-support"))]
pub use features::FakeFeatureAdapter;
#[cfg(any(test, feature = "test-support"))]
pub use flows::FakeFlowAdapter;
#[cfg(any(test, feature = "test-support"))]
pub use profile::FakeProfileAdapter;
#[cfg(any(test, feature = "test-support"))]
pub use segments::FakeSegmentAdapter;
