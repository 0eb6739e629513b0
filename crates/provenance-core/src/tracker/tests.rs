use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use chrono::Utc;

use super::*;
use crate::record::{input_group_digest, UnknownCallRecord, ValueRecord};

fn build_info() -> BuildInfo {
    BuildInfo::new("commit-abc", "build-001", Utc::now())
}

fn tracker() -> ProvenanceStore<MemoryBlobStore> {
    ProvenanceStore::new(MemoryBlobStore::new(), build_info())
}

fn add_result<S: BlobStore>(tracker: &ProvenanceStore<S>) -> (ResultRecord, Digest) {
    let two = tracker.save_output_value(&2_i64).unwrap();
    let three = tracker.save_output_value(&3_i64).unwrap();
    let five = tracker.save_output_value(&5_i64).unwrap();

    let call = CallRecordWithInputs {
        function_name: "add".to_string(),
        function_version: Version::new("1.0"),
        output_class_name: ClassName::new("i64"),
        input_list: vec![
            ValueRecord::UnknownCall(UnknownCallRecord {
                output_class_name: ClassName::new("i64"),
                value_digest: two.clone(),
            }),
            ValueRecord::UnknownCall(UnknownCallRecord {
                output_class_name: ClassName::new("i64"),
                value_digest: three.clone(),
            }),
        ],
    };
    tracker.save_call_record(&call).unwrap();

    let record = ResultRecord {
        call: call.without_inputs().unwrap(),
        input_group_digest: input_group_digest(&[two, three]).unwrap(),
        output_digest: five,
        commit_id: "commit-abc".to_string(),
        build_id: "build-001".to_string(),
    };
    let digest = tracker.save_result_record(&record).unwrap();
    (record, digest)
}

#[test]
fn save_and_load_value() {
    let tracker = tracker();
    let digest = tracker.save_output_value(&5_i64).unwrap();
    assert_eq!(digest, Digest::of_bytes(b"5"));
    assert!(tracker.has_value(&digest).unwrap());
    assert_eq!(tracker.load_value::<i64>(&digest).unwrap(), 5);
}

#[test]
fn save_value_is_idempotent() {
    let tracker = tracker();
    let first = tracker.save_output_value(&"hello".to_string()).unwrap();
    let second = tracker.save_output_value(&"hello".to_string()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn load_missing_value_fails() {
    let tracker = tracker();
    let err = tracker.load_value::<i64>(&Digest::of_bytes(b"missing")).unwrap_err();
    assert!(matches!(err, TrackerError::ValueNotFound { .. }));
}

#[test]
fn load_value_with_codec_returns_class() {
    let tracker = tracker();
    let digest = tracker.save_output_value(&7_i64).unwrap();
    let (value, codec) = tracker.load_value_with_codec::<i64>(&digest).unwrap();
    assert_eq!(value, 7);
    assert_eq!(codec.class_name().as_str(), "i64");
}

#[test]
fn call_record_round_trip() {
    let tracker = tracker();
    let (record, _) = add_result(&tracker);
    let call_digest = record.call.digest_of_equivalent_with_inputs.clone();
    let loaded = tracker.load_call_record(&call_digest).unwrap().unwrap();
    assert_eq!(loaded.function_name, "add");
    assert_eq!(loaded.input_list.len(), 2);
    assert_eq!(loaded.digest().unwrap(), call_digest);
}

#[test]
fn result_record_round_trip() {
    let tracker = tracker();
    let (record, digest) = add_result(&tracker);
    let loaded = tracker.load_result_record(&digest).unwrap().unwrap();
    assert_eq!(loaded, record);
}

#[test]
fn find_result_hits_after_save() {
    let tracker = tracker();
    let (record, _) = add_result(&tracker);
    let hit = tracker
        .find_result(
            "add",
            &Version::new("1.0"),
            &record.input_group_digest,
        )
        .unwrap()
        .unwrap();
    assert_eq!(hit, record);
}

#[test]
fn find_result_misses_other_version() {
    let tracker = tracker();
    let (record, _) = add_result(&tracker);
    let miss = tracker
        .find_result("add", &Version::new("1.1"), &record.input_group_digest)
        .unwrap();
    assert!(miss.is_none());
}

#[test]
fn memo_survives_in_shared_store() {
    // A second tracker handle over the same blobs sees the memo entry, as a
    // fresh process would.
    let store = MemoryBlobStore::new();
    let first = ProvenanceStore::new(store.clone(), build_info());
    let two = first.save_output_value(&2_i64).unwrap();
    let three = first.save_output_value(&3_i64).unwrap();
    let group = input_group_digest(&[two, three]).unwrap();

    let call = CallRecordWithInputs {
        function_name: "add".to_string(),
        function_version: Version::new("1.0"),
        output_class_name: ClassName::new("i64"),
        input_list: Vec::new(),
    };
    let record = ResultRecord {
        call: call.without_inputs().unwrap(),
        input_group_digest: group.clone(),
        output_digest: first.save_output_value(&5_i64).unwrap(),
        commit_id: "commit-abc".to_string(),
        build_id: "build-001".to_string(),
    };
    first.save_result_record(&record).unwrap();

    let second = ProvenanceStore::new(store, build_info());
    let hit = second
        .find_result("add", &Version::new("1.0"), &group)
        .unwrap();
    assert_eq!(hit, Some(record));
}

#[test]
fn build_info_round_trip() {
    let tracker = tracker();
    tracker.save_build_info().unwrap();
    let loaded = tracker.load_build_info("build-001").unwrap().unwrap();
    assert_eq!(loaded, *tracker.current_build_info());
    assert_eq!(tracker.load_build_info("build-999").unwrap(), None);
}

#[test]
fn listings_cover_the_key_space() {
    let tracker = tracker();
    let (_, result_digest) = add_result(&tracker);
    tracker.save_build_info().unwrap();

    assert_eq!(tracker.list_calls().unwrap().len(), 1);
    assert_eq!(tracker.list_results().unwrap(), vec![result_digest]);
    assert_eq!(tracker.list_builds().unwrap(), vec!["build-001".to_string()]);
    let memo_keys = tracker.list_memo_keys("add").unwrap();
    assert_eq!(memo_keys.len(), 1);
    assert_eq!(memo_keys[0].0, "1.0");
}

#[test]
fn corrupt_value_is_detected() {
    let store = MemoryBlobStore::new();
    let tracker = ProvenanceStore::new(store.clone(), build_info());
    let digest = tracker.save_output_value(&5_i64).unwrap();

    // Overwrite the blob behind the tracker's back.
    store.put(&format!("data/{digest}"), b"6").unwrap();
    let err = tracker.load_value::<i64>(&digest).unwrap_err();
    assert!(matches!(err, TrackerError::CorruptBlob { .. }));
}

#[test]
fn fs_backed_tracker_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsBlobStore::open(dir.path()).unwrap();
    let tracker = ProvenanceStore::new(store, build_info());
    let (record, _) = add_result(&tracker);

    let reopened = ProvenanceStore::new(FsBlobStore::open(dir.path()).unwrap(), build_info());
    let hit = reopened
        .find_result("add", &Version::new("1.0"), &record.input_group_digest)
        .unwrap();
    assert_eq!(hit, Some(record));
}

/// A store that fails a fixed number of times before succeeding.
struct FlakyStore {
    inner: MemoryBlobStore,
    failures_left: Arc<AtomicU32>,
}

impl FlakyStore {
    fn new(failures: u32) -> Self {
        Self {
            inner: MemoryBlobStore::new(),
            failures_left: Arc::new(AtomicU32::new(failures)),
        }
    }

    fn maybe_fail(&self) -> Result<(), StorageError> {
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            return Err(StorageError::Backend {
                message: "transient failure".to_string(),
            });
        }
        Ok(())
    }
}

impl BlobStore for FlakyStore {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        self.maybe_fail()?;
        self.inner.put(key, bytes)
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        self.maybe_fail()?;
        self.inner.get(key)
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        self.maybe_fail()?;
        self.inner.list(prefix)
    }
}

#[test]
fn transient_storage_failures_are_retried() {
    let tracker = ProvenanceStore::new(FlakyStore::new(2), build_info());
    let digest = tracker.save_output_value(&5_i64).unwrap();
    assert_eq!(tracker.load_value::<i64>(&digest).unwrap(), 5);
}

#[test]
fn exhausted_retries_surface_the_storage_error() {
    let config = TrackerConfig {
        max_retries: 1,
        verify_on_read: true,
    };
    let tracker = ProvenanceStore::with_config(FlakyStore::new(10), build_info(), config);
    let err = tracker.save_output_value(&5_i64).unwrap_err();
    assert!(matches!(err, TrackerError::Storage(_)));
}
