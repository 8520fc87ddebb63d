//! Property-based coverage of the invariants the format relies on: uintvar
//! round-trips exactly, JSON scalar arrays survive import/export regardless
//! of shape, and packing a revision is idempotent no matter what was removed.

use carbon::{CarbonOptions, KeyHeader, KeyKind, KeyValue, MemFile, Mode, Record};
use proptest::prelude::*;
use serde_json::{json, Value};

fn uintvar_roundtrips(value: u64) {
    let mut mf = MemFile::with_capacity(16);
    mf.write_uintvar(value).expect("write_uintvar should succeed");
    mf.seek(0);
    let (decoded, consumed) = mf.read_uintvar().expect("read_uintvar should succeed");
    prop_assert_eq!(decoded, value);
    prop_assert_eq!(consumed, MemFile::uintvar_len(value));
}

fn scalar_json_array(len: usize) -> impl Strategy<Value = Value> {
    prop::collection::vec(any::<i32>(), 0..len).prop_map(|elems| {
        Value::Array(elems.into_iter().map(|n| json!(n)).collect())
    })
}

proptest! {
    #[test]
    fn uintvar_roundtrip_property(value in any::<u64>()) {
        uintvar_roundtrips(value)?;
    }

    #[test]
    fn uintvar_roundtrip_small_values_property(value in 0u64..300) {
        uintvar_roundtrips(value)?;
    }

    #[test]
    fn homogeneous_signed_array_roundtrips_through_json_property(value in scalar_json_array(64)) {
        let record = Record::from_json(&value, KeyHeader::none(), CarbonOptions::default(), Mode::Default)
            .expect("from_json should succeed for a flat int array");
        let out = record.to_json_compact().expect("to_json_compact should succeed");
        prop_assert_eq!(out, value);
    }

    #[test]
    fn pack_is_idempotent_after_arbitrary_removal_property(
        value in scalar_json_array(32),
        drop_index in 0usize..32,
    ) {
        prop_assume!(!value.as_array().unwrap().is_empty());
        let array = value.as_array().unwrap();
        let drop_index = drop_index % array.len();

        let key = KeyHeader {
            kind: KeyKind::UKey,
            value: KeyValue::Unsigned(1),
            commit_hash: Some(0),
        };
        let record = Record::from_json(&value, key, CarbonOptions::default(), Mode::Default)
            .expect("from_json should succeed");

        let mut revision = record.revise_begin().expect("revise_begin should succeed");
        let path = drop_index.to_string();
        prop_assert!(revision.remove(&path).expect("remove should succeed"));
        revision.pack().expect("pack should succeed");
        revision.shrink().expect("shrink should succeed");
        let once = revision.end().expect("end should succeed").into_vec();

        let repacked = Record::from_raw(once.clone()).expect("from_raw should succeed");
        let mut revision2 = repacked.revise_begin().expect("revise_begin should succeed");
        revision2.pack().expect("pack should succeed");
        revision2.shrink().expect("shrink should succeed");
        let twice = revision2.end().expect("end should succeed").into_vec();

        prop_assert_eq!(once, twice);
    }
}
