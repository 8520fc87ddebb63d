//! End-to-end coverage of the public API: JSON import/export, iteration,
//! the revision protocol (remove / pack / shrink / commit hash), and the
//! auto-key lifecycle. Mirrors the end-to-end scenarios in the format
//! spec's testable-properties section.

use carbon::{CarbonOptions, KeyHeader, KeyKind, KeyValue, Mode, Record};
use serde_json::json;

/// Route `tracing` output from the revision protocol's `debug!`/`instrument`
/// spans to stdout for this test binary. Safe to call from every test: a
/// second `try_init` after the first just returns an error we ignore.
fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

#[test]
fn object_round_trips_through_json_import_and_export() {
    init_tracing();
    let value = json!({"msg": "Hello"});
    let record = Record::from_json(&value, KeyHeader::none(), CarbonOptions::default(), Mode::Default).unwrap();
    assert_eq!(record.to_json_compact().unwrap(), value);
}

#[test]
fn small_unsigned_array_encodes_as_a_column_and_round_trips() {
    let value = json!([1, 2, 3]);
    let record = Record::from_json(&value, KeyHeader::none(), CarbonOptions::default(), Mode::Default).unwrap();
    assert_eq!(record.to_json_compact().unwrap(), value);
}

#[test]
fn mixed_number_array_stays_variable_and_round_trips() {
    let value = json!([1, -2, 3.5]);
    let record = Record::from_json(&value, KeyHeader::none(), CarbonOptions::default(), Mode::Default).unwrap();
    assert_eq!(record.to_json_compact().unwrap(), value);
}

#[test]
fn revise_remove_drops_an_array_element_and_changes_the_commit_hash() {
    init_tracing();
    let key = KeyHeader {
        kind: KeyKind::UKey,
        value: KeyValue::Unsigned(1),
        commit_hash: Some(0),
    };
    let record =
        Record::from_json(&json!({"a": [1, 2, 3]}), key, CarbonOptions::default(), Mode::Default).unwrap();
    let before = record.commit_hash().unwrap();

    let mut revision = record.revise_begin().unwrap();
    assert!(revision.remove("a.1").unwrap());
    let sealed = revision.end().unwrap();

    assert!(!record.is_latest());
    let revised = Record::from_raw(sealed.into_vec()).unwrap();
    assert_eq!(revised.to_json_compact().unwrap(), json!({"a": [1, 3]}));
    assert_ne!(revised.commit_hash().unwrap(), before);
}

#[test]
fn autokey_record_gets_a_nonzero_key_and_commit_hash() {
    let mut builder = Record::create_begin(
        KeyHeader {
            kind: KeyKind::AutoKey,
            value: KeyValue::Unsigned(0),
            commit_hash: Some(0),
        },
        CarbonOptions::default(),
        Mode::Default,
    );
    builder.session().insert_string("payload").unwrap();
    let record = builder.create_end().unwrap();

    assert_eq!(record.key_kind().unwrap(), KeyKind::AutoKey);

    let mut revision = record.revise_begin().unwrap();
    let generated = revision.key_generate().unwrap();
    assert_ne!(generated, 0);
    let sealed = revision.end().unwrap();

    let revised = Record::from_raw(sealed.into_vec()).unwrap();
    assert_eq!(revised.key_value().unwrap(), KeyValue::Unsigned(generated));
    assert!(revised.commit_hash().unwrap().unwrap() != 0);
}

#[test]
fn concurrent_revise_try_begin_only_lets_one_caller_in() {
    let record = Record::from_json(&json!([1, 2, 3]), KeyHeader::none(), CarbonOptions::default(), Mode::Default)
        .unwrap();

    let first = record.revise_try_begin().unwrap();
    assert!(first.is_some());
    let second = record.revise_try_begin().unwrap();
    assert!(second.is_none(), "a second concurrent revision must be rejected");

    first.unwrap().abort();
    let third = record.revise_try_begin().unwrap();
    assert!(third.is_some(), "abort must release the write lock");
}

#[test]
fn pack_and_shrink_are_idempotent_and_preserve_contents() {
    let key = KeyHeader::none();
    let mut builder = Record::create_begin(key, CarbonOptions::default(), Mode::Default);
    builder.session().begin_object(Some(64)).unwrap();
    builder.session().insert_prop_u8("x", 1).unwrap();
    builder.session().insert_prop_string("y", "hi").unwrap();
    builder.session().end().unwrap();
    let record = builder.create_end().unwrap();
    let expected = record.to_json_compact().unwrap();

    let mut revision = record.revise_begin().unwrap();
    revision.pack().unwrap();
    revision.shrink().unwrap();
    let once = revision.end().unwrap().into_vec();

    let packed_record = Record::from_raw(once.clone()).unwrap();
    assert_eq!(packed_record.to_json_compact().unwrap(), expected);

    let mut revision2 = packed_record.revise_begin().unwrap();
    revision2.pack().unwrap();
    revision2.shrink().unwrap();
    let twice = revision2.end().unwrap().into_vec();

    assert_eq!(once, twice, "packing an already-packed record must be a no-op");
}

#[test]
fn nested_object_and_array_survive_a_full_round_trip() {
    let value = json!({
        "name": "widget",
        "tags": ["a", "b", "c"],
        "scores": [1, 2, 3, 4],
        "meta": {"active": true, "owner": null},
    });
    let record = Record::from_json(&value, KeyHeader::none(), CarbonOptions::default(), Mode::Default).unwrap();
    assert_eq!(record.to_json_compact().unwrap(), value);
}

#[test]
fn from_json_optimize_mode_packs_before_computing_the_commit_hash() {
    let key = KeyHeader {
        kind: KeyKind::UKey,
        value: KeyValue::Unsigned(1),
        commit_hash: Some(0),
    };
    let value = json!({"a": [1, 2, 3]});
    let default_mode =
        Record::from_json(&value, key.clone(), CarbonOptions::default(), Mode::Default).unwrap();
    let optimized =
        Record::from_json(&value, key, CarbonOptions::default(), Mode::Optimize).unwrap();

    assert_eq!(optimized.to_json_compact().unwrap(), value);
    assert!(optimized.raw_data().len() <= default_mode.raw_data().len());
    assert_ne!(optimized.commit_hash().unwrap(), Some(0));
}

#[test]
fn unkeyed_record_has_no_commit_hash() {
    let record = Record::from_json(&json!([1]), KeyHeader::none(), CarbonOptions::default(), Mode::Default)
        .unwrap();
    assert_eq!(record.key_kind().unwrap(), KeyKind::NoKey);
    assert_eq!(record.commit_hash().unwrap(), None);
}
