// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::journey::JourneyId;

#[test]
fn minted_ids_are_time_ordered() {
    let early = JourneyId::mint(1_000);
    let late = JourneyId::mint(2_000);
    assert!(early.as_str() < late.as_str());
    assert!(early < late);
}

#[test]
fn minted_ids_are_unique_within_a_millisecond() {
    let a = JourneyId::mint(1_000);
    let b = JourneyId::mint(1_000);
    assert_ne!(a, b);
}

#[test]
fn minted_ids_fill_the_buffer() {
    let id = JourneyId::mint(1_700_000_000_000);
    assert_eq!(id.as_str().len(), ID_MAX_LEN);
    assert!(id.as_str().starts_with(JourneyId::PREFIX));
}

#[test]
fn id_serde_is_transparent() {
    let id = JourneyId::from_string("jny-0000000001abcdefghij");
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, "\"jny-0000000001abcdefghij\"");
    let back: JourneyId = serde_json::from_str(&json).unwrap();
    assert_eq!(back, id);
}

#[test]
fn base36_is_fixed_width_and_ordered() {
    assert_eq!(base36_fixed(0, 9), "000000000");
    assert_eq!(base36_fixed(35, 9), "00000000z");
    assert_eq!(base36_fixed(36, 9), "000000010");
    assert!(base36_fixed(1_000, 9) < base36_fixed(1_001, 9));
}

mod properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// The fixed-width mint segment preserves numeric ordering, which is
        /// what makes journey ids sortable by creation time.
        #[test]
        fn base36_preserves_order(a in 0u64..100_000_000_000_000, b in 0u64..100_000_000_000_000) {
            let (ea, eb) = (base36_fixed(a, 9), base36_fixed(b, 9));
            prop_assert_eq!(a.cmp(&b), ea.cmp(&eb));
        }
    }
}

#[test]
fn id_buf_borrows_as_str() {
    use std::collections::HashMap;
    let id = JourneyId::from_string("jny-x");
    let mut map: HashMap<JourneyId, u32> = HashMap::new();
    map.insert(id, 7);
    // Borrow<str> lets string slices address JourneyId keys.
    assert_eq!(map.get("jny-x").copied(), Some(7));
    assert_eq!(map.get("jny-y").copied(), None);
}
