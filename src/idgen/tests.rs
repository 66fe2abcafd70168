use super::{decode_string_id, encode_string_id, valid_string_id, IdGenerator};
use crate::config::settings::IdGenSettings;

fn settings() -> IdGenSettings {
    IdGenSettings {
        node: 1,
        epoch_time_in_seconds: 1_577_836_800,
        node_bits: 8,
    }
}

#[test]
fn test_ids_are_strictly_increasing() {
    let generator = IdGenerator::new(&settings()).unwrap();
    let mut last = 0;
    for _ in 0..10_000 {
        let id = generator.next();
        assert!(id > last, "expected {} > {}", id, last);
        last = id;
    }
}

#[test]
fn test_next_string_is_valid() {
    let generator = IdGenerator::new(&settings()).unwrap();
    for _ in 0..100 {
        let s = generator.next_string();
        assert_eq!(s.len(), 11);
        assert!(valid_string_id(&s));
    }
}

#[test]
fn test_encode_decode_roundtrip() {
    let generator = IdGenerator::new(&settings()).unwrap();
    for _ in 0..100 {
        let id = generator.next();
        assert_eq!(decode_string_id(&encode_string_id(id)), id);
    }
}

#[test]
fn test_encode_pads_small_ids() {
    assert_eq!(encode_string_id(0), "00000000000");
    assert_eq!(encode_string_id(61), "0000000000Z");
    assert_eq!(encode_string_id(62), "00000000010");
}

#[test]
fn test_decode_rejects_malformed_input() {
    assert_eq!(decode_string_id(""), -1);
    assert_eq!(decode_string_id("abc"), -1);
    assert_eq!(decode_string_id("abcdefghij!"), -1);
    assert_eq!(decode_string_id("abcdefghijkl"), -1);
    // 62^11 - 1 does not fit into an i64
    assert_eq!(decode_string_id("ZZZZZZZZZZZ"), -1);
}

#[test]
fn test_random_node_when_configured_zero() {
    let generator = IdGenerator::new(&IdGenSettings {
        node: 0,
        epoch_time_in_seconds: 1_577_836_800,
        node_bits: 8,
    })
    .unwrap();
    assert!(generator.node < 256);
}

#[test]
fn test_node_must_fit_node_bits() {
    let err = IdGenerator::new(&IdGenSettings {
        node: 300,
        epoch_time_in_seconds: 1_577_836_800,
        node_bits: 8,
    })
    .unwrap_err();
    assert_eq!(err.code, 500);
}
