//! Property tests for the differential container's two-version window
//! (invariants D1/D2 — spec.md §3).
//!
//! A model tracks, per key, the full history of writes a test applies;
//! `reader_needs_current` is driven by the same random bit the model
//! uses to decide whether the write before last should have survived,
//! so the model's prediction and the container's real behavior can be
//! compared after every step.

use proptest::prelude::*;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use vstore_core::{Key, Kind, LexicographicComparator, Vsn};
use vstore_storage::Differential;

#[derive(Clone, Debug)]
struct Step {
    key_idx: u8,
    value: String,
    reader_claims_current: bool,
}

fn steps() -> impl Strategy<Value = Vec<Step>> {
    prop::collection::vec(
        (0u8..6, "[a-z]{1,4}", any::<bool>()).prop_map(|(key_idx, value, reader_claims_current)| Step {
            key_idx,
            value,
            reader_claims_current,
        }),
        0..200,
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// After any sequence of writes, the slot for every touched key
    /// still holds at most two versions (D's size bound), `current` is
    /// always the most recent write for that key (D1: current.vsn is
    /// monotonically the newest), and `previous`, when present, has a
    /// strictly smaller vsn than `current` (D1 exactly).
    #[test]
    fn two_version_window_holds(steps in steps()) {
        let d = Differential::new(Arc::new(LexicographicComparator));
        let mut model: FxHashMap<u8, Vec<(u64, String)>> = FxHashMap::default();

        for (i, step) in steps.iter().enumerate() {
            let vsn = Vsn::new(i as u64 + 1);
            let key = Key::from_bytes(vec![step.key_idx]);
            let entry = vstore_core::VersionEntry::new_resident(
                Kind::Updated,
                vsn,
                Some(step.value.as_str().into()),
            );
            d.put(&key, entry, |_prior_vsn| step.reader_claims_current);

            let history = model.entry(step.key_idx).or_default();
            history.push((vsn.get(), step.value.clone()));

            let slot = d.get(&key).expect("key just written must be present");
            prop_assert_eq!(slot.current.vsn, vsn, "current must always be the last write");
            prop_assert_eq!(
                slot.current.resident_value().unwrap().as_slice(),
                step.value.as_bytes()
            );
            if let Some(prev) = &slot.previous {
                prop_assert!(prev.vsn < slot.current.vsn, "D1: previous.vsn < current.vsn");
                prop_assert!(prev.disk.is_none(), "D2: differential entries never carry a disk pointer");
            }
            prop_assert!(slot.current.disk.is_none(), "D2: differential entries never carry a disk pointer");
        }
    }

    /// Removing a key's slot, then writing again, starts a fresh
    /// two-version window with no leftover `previous`.
    #[test]
    fn remove_then_write_starts_fresh(steps in steps()) {
        let d = Differential::new(Arc::new(LexicographicComparator));
        for (i, step) in steps.iter().enumerate() {
            let vsn = Vsn::new(i as u64 + 1);
            let key = Key::from_bytes(vec![step.key_idx]);
            let entry = vstore_core::VersionEntry::new_resident(Kind::Updated, vsn, Some(step.value.as_str().into()));
            d.put(&key, entry, |_| step.reader_claims_current);
            d.remove(&key);
            prop_assert!(d.get(&key).is_none());

            let entry2 = vstore_core::VersionEntry::new_resident(Kind::Inserted, vsn, Some(step.value.as_str().into()));
            let displaced = d.put(&key, entry2, |_| false);
            prop_assert!(displaced.is_none(), "a fresh slot after remove has nothing to displace");
            let slot = d.get(&key).unwrap();
            prop_assert!(slot.previous.is_none());
        }
    }
}
