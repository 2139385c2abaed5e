//! Property tests for the consolidated container's partitioned binary
//! search (spec.md §4.3: O(log n) lookup over sorted partitions).

use proptest::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;
use vstore_core::{DiskPointer, Key, Kind, LexicographicComparator, Vsn};
use vstore_storage::ConsolidatedBuilder;

fn unique_keyed_entries() -> impl Strategy<Value = Vec<(u32, u64)>> {
    prop::collection::btree_map(0u32..2000, 0u64..1_000_000, 0..300).prop_map(|m| m.into_iter().collect())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(150))]

    /// Every key pushed into the builder, in any insertion order once
    /// sorted, is found by `get` with its exact vsn; any key never
    /// pushed is absent. Partition boundaries (an implementation detail
    /// of `Consolidated`) must never leak into lookup results.
    #[test]
    fn get_matches_model_across_partitions(entries in unique_keyed_entries()) {
        let comparator = Arc::new(LexicographicComparator);
        let mut builder = ConsolidatedBuilder::new(comparator);
        let mut model: BTreeMap<Vec<u8>, u64> = BTreeMap::new();

        for (k, vsn) in &entries {
            let key_bytes = k.to_be_bytes().to_vec();
            let key = Key::from_bytes(key_bytes.clone());
            let entry = vstore_core::VersionEntry::new_disk_only(
                Kind::Inserted,
                Vsn::new(*vsn),
                DiskPointer { file_id: 1, offset: 0, length: 1 },
            );
            builder.push(key, entry);
            model.insert(key_bytes, *vsn);
        }
        let consolidated = builder.build();

        prop_assert_eq!(consolidated.len(), model.len());
        for (key_bytes, vsn) in &model {
            let key = Key::from_bytes(key_bytes.clone());
            let got = consolidated.get(&key).expect("key pushed into the builder must be found");
            prop_assert_eq!(got.vsn, Vsn::new(*vsn));
        }

        // A handful of keys guaranteed absent from the model.
        for probe in [2000u32, 2001, 2002] {
            let key = Key::from_bytes(probe.to_be_bytes().to_vec());
            prop_assert!(consolidated.get(&key).is_none());
        }
    }

    /// `range(lo, hi)` always returns keys in ascending order and
    /// exactly the model's `[lo, hi)` slice.
    #[test]
    fn range_matches_model_slice(
        entries in unique_keyed_entries(),
        lo in 0u32..2000,
        hi in 0u32..2000,
    ) {
        let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
        let comparator = Arc::new(LexicographicComparator);
        let mut builder = ConsolidatedBuilder::new(comparator);
        let mut model: BTreeMap<Vec<u8>, u64> = BTreeMap::new();

        for (k, vsn) in &entries {
            let key_bytes = k.to_be_bytes().to_vec();
            let key = Key::from_bytes(key_bytes.clone());
            let entry = vstore_core::VersionEntry::new_disk_only(
                Kind::Inserted,
                Vsn::new(*vsn),
                DiskPointer { file_id: 1, offset: 0, length: 1 },
            );
            builder.push(key, entry);
            model.insert(key_bytes, *vsn);
        }
        let consolidated = builder.build();

        let lo_key = Key::from_bytes(lo.to_be_bytes().to_vec());
        let hi_key = Key::from_bytes(hi.to_be_bytes().to_vec());
        let got = consolidated.range(Some(&lo_key), Some(&hi_key));

        let expected: Vec<(Vec<u8>, u64)> = model
            .range(lo.to_be_bytes().to_vec()..hi.to_be_bytes().to_vec())
            .map(|(k, v)| (k.clone(), *v))
            .collect();

        prop_assert_eq!(got.len(), expected.len());
        for ((got_key, got_entry), (exp_key, exp_vsn)) in got.iter().zip(expected.iter()) {
            prop_assert_eq!(got_key.as_slice(), exp_key.as_slice());
            prop_assert_eq!(got_entry.vsn, Vsn::new(*exp_vsn));
        }
    }
}
