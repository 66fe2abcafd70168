use super::{Recorder, RecorderError};
use crate::config::settings::KvSettings;

fn open_recorder() -> (tempfile::TempDir, Recorder) {
    let dir = tempfile::tempdir().unwrap();
    let cfg = KvSettings {
        enabled: true,
        dsn: dir.path().join("kv").to_string_lossy().into_owned(),
    };
    let recorder = Recorder::open(&cfg).unwrap();
    (dir, recorder)
}

#[test]
fn test_open_fails_when_disabled() {
    let cfg = KvSettings {
        enabled: false,
        dsn: "unused".to_string(),
    };
    assert!(matches!(
        Recorder::open(&cfg),
        Err(RecorderError::NotEnabled)
    ));
}

#[test]
fn test_set_get_roundtrip() {
    let (_dir, recorder) = open_recorder();
    recorder.set(b"key", b"value").unwrap();
    assert_eq!(recorder.get(b"key").unwrap(), b"value");
}

#[test]
fn test_get_missing_key_is_not_found() {
    let (_dir, recorder) = open_recorder();
    assert!(matches!(
        recorder.get(b"missing"),
        Err(RecorderError::NotFound)
    ));
}

#[test]
fn test_delete_removes_key() {
    let (_dir, recorder) = open_recorder();
    recorder.set(b"key", b"value").unwrap();
    recorder.delete(b"key").unwrap();
    assert!(matches!(recorder.get(b"key"), Err(RecorderError::NotFound)));
}

#[test]
fn test_delete_missing_key_is_ok() {
    let (_dir, recorder) = open_recorder();
    recorder.delete(b"missing").unwrap();
}

#[test]
fn test_list_keys_is_ordered() {
    let (_dir, recorder) = open_recorder();
    recorder.set(b"b", b"2").unwrap();
    recorder.set(b"a", b"1").unwrap();
    recorder.set(b"c", b"3").unwrap();
    let keys = recorder.list_keys().unwrap();
    assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
}

#[test]
fn test_close_flushes() {
    let (_dir, recorder) = open_recorder();
    recorder.set(b"key", b"value").unwrap();
    recorder.close().unwrap();
}
