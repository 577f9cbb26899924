// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! jx-storage: durable state for the journey engine.
//!
//! One JSON file per live journey, an append-only completion ledger, and a
//! memory-resident cache. The write path is write-through: the in-memory
//! registry owned by the service is authoritative and disk is its backing
//! store.

pub mod store;

pub use store::{JourneyStore, StoreError};
