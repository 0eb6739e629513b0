//! The shipped tracker over a [`BlobStore`].

use super::blob::{BlobStore, StorageError};
use super::{MemoEntry, ResultTracker, TrackerConfig, TrackerError};
use crate::build_info::BuildInfo;
use crate::canonical;
use crate::codec::ClassName;
use crate::digest::Digest;
use crate::record::{
    CallRecordWithInputs, RecordError, ResultRecord, UnknownResultRecord, ValueRecord,
};
use crate::version::Version;

const DATA_PREFIX: &str = "data";
const CALLS_PREFIX: &str = "calls";
const RESULTS_PREFIX: &str = "results";
const MEMO_PREFIX: &str = "memo";
const BUILDS_PREFIX: &str = "builds";

/// A [`ResultTracker`] over any blob store.
///
/// All writes are content-addressed, so retries and concurrent writers are
/// idempotent; the memoization entry for a result is always the last write
/// of its save.
#[derive(Debug, Clone)]
pub struct ProvenanceStore<S> {
    store: S,
    build_info: BuildInfo,
    config: TrackerConfig,
}

impl<S: BlobStore> ProvenanceStore<S> {
    /// Creates a tracker with the default configuration.
    pub fn new(store: S, build_info: BuildInfo) -> Self {
        Self::with_config(store, build_info, TrackerConfig::default())
    }

    /// Creates a tracker with an explicit configuration.
    pub fn with_config(store: S, build_info: BuildInfo, config: TrackerConfig) -> Self {
        Self {
            store,
            build_info,
            config,
        }
    }

    /// The underlying blob store.
    pub fn blob_store(&self) -> &S {
        &self.store
    }

    /// Digests of every stored call record.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError`] on storage failure.
    pub fn list_calls(&self) -> Result<Vec<Digest>, TrackerError> {
        self.list_digests(CALLS_PREFIX)
    }

    /// Digests of every stored result record.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError`] on storage failure.
    pub fn list_results(&self) -> Result<Vec<Digest>, TrackerError> {
        self.list_digests(RESULTS_PREFIX)
    }

    /// Build ids of every stored build-info blob.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError`] on storage failure.
    pub fn list_builds(&self) -> Result<Vec<String>, TrackerError> {
        let prefix = format!("{BUILDS_PREFIX}/");
        let keys = self.with_retries("list builds", || self.store.list(&prefix))?;
        Ok(keys
            .into_iter()
            .filter_map(|key| key.strip_prefix(&prefix).map(str::to_string))
            .collect())
    }

    /// Memo keys recorded for one function, as `(version, inputGroup)`
    /// digest pairs.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError`] on storage failure.
    pub fn list_memo_keys(
        &self,
        function_name: &str,
    ) -> Result<Vec<(String, String)>, TrackerError> {
        let prefix = format!("{MEMO_PREFIX}/{function_name}/");
        let keys = self.with_retries("list memo keys", || self.store.list(&prefix))?;
        Ok(keys
            .into_iter()
            .filter_map(|key| {
                let rest = key.strip_prefix(&prefix)?;
                let (version, group) = rest.split_once('/')?;
                Some((version.to_string(), group.to_string()))
            })
            .collect())
    }

    fn list_digests(&self, prefix: &str) -> Result<Vec<Digest>, TrackerError> {
        let prefix = format!("{prefix}/");
        let keys = self.with_retries("list records", || self.store.list(&prefix))?;
        let mut digests = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(hex) = key.strip_prefix(&prefix) {
                if let Ok(digest) = Digest::parse(hex) {
                    digests.push(digest);
                }
            }
        }
        Ok(digests)
    }

    fn with_retries<T>(
        &self,
        what: &str,
        op: impl Fn() -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let attempts = self.config.max_retries.saturating_add(1);
        let mut last = None;
        for attempt in 1..=attempts {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if attempt < attempts {
                        tracing::warn!(
                            operation = what,
                            attempt,
                            error = %e,
                            "storage operation failed, retrying"
                        );
                    }
                    last = Some(e);
                },
            }
        }
        Err(last.unwrap_or(StorageError::Backend {
            message: "retry loop ran zero attempts".to_string(),
        }))
    }

    fn put_blob(&self, key: &str, bytes: &[u8]) -> Result<(), TrackerError> {
        self.with_retries("put", || self.store.put(key, bytes))
            .map_err(TrackerError::from)
    }

    fn get_blob(&self, key: &str) -> Result<Option<Vec<u8>>, TrackerError> {
        self.with_retries("get", || self.store.get(key))
            .map_err(TrackerError::from)
    }

    fn load_record(&self, prefix: &str, digest: &Digest) -> Result<Option<ValueRecord>, TrackerError> {
        let key = format!("{prefix}/{digest}");
        let Some(bytes) = self.get_blob(&key)? else {
            return Ok(None);
        };
        if self.config.verify_on_read && Digest::of_bytes(&bytes) != *digest {
            return Err(TrackerError::CorruptBlob {
                digest: digest.clone(),
                message: "record bytes do not hash to their key".to_string(),
            });
        }
        Ok(Some(ValueRecord::decode(&bytes)?))
    }
}

impl<S: BlobStore> ResultTracker for ProvenanceStore<S> {
    fn current_build_info(&self) -> &BuildInfo {
        &self.build_info
    }

    fn save_build_info(&self) -> Result<Digest, TrackerError> {
        let bytes = canonical::canonical_bytes_of(&self.build_info)
            .map_err(|e| TrackerError::Record(RecordError::Canonical(e)))?;
        let digest = Digest::of_bytes(&bytes);
        let key = format!("{BUILDS_PREFIX}/{}", self.build_info.build_id);
        self.put_blob(&key, &bytes)?;
        tracing::debug!(build_id = %self.build_info.build_id, digest = %digest, "saved build info");
        Ok(digest)
    }

    fn load_build_info(&self, build_id: &str) -> Result<Option<BuildInfo>, TrackerError> {
        let key = format!("{BUILDS_PREFIX}/{build_id}");
        let Some(bytes) = self.get_blob(&key)? else {
            return Ok(None);
        };
        let info = serde_json::from_slice(&bytes).map_err(|e| {
            TrackerError::Record(RecordError::Malformed {
                message: e.to_string(),
            })
        })?;
        Ok(Some(info))
    }

    fn save_value_bytes(
        &self,
        class_name: &ClassName,
        bytes: &[u8],
    ) -> Result<Digest, TrackerError> {
        let digest = Digest::of_bytes(bytes);
        let key = format!("{DATA_PREFIX}/{digest}");
        self.put_blob(&key, bytes)?;
        tracing::debug!(class_name = %class_name, digest = %digest, "saved value bytes");
        Ok(digest)
    }

    fn load_value_bytes(&self, digest: &Digest) -> Result<Vec<u8>, TrackerError> {
        let key = format!("{DATA_PREFIX}/{digest}");
        let bytes = self
            .get_blob(&key)?
            .ok_or_else(|| TrackerError::ValueNotFound {
                digest: digest.clone(),
            })?;
        if self.config.verify_on_read && Digest::of_bytes(&bytes) != *digest {
            return Err(TrackerError::CorruptBlob {
                digest: digest.clone(),
                message: "value bytes do not hash to their key".to_string(),
            });
        }
        Ok(bytes)
    }

    fn has_value(&self, digest: &Digest) -> Result<bool, TrackerError> {
        let key = format!("{DATA_PREFIX}/{digest}");
        Ok(self.get_blob(&key)?.is_some())
    }

    fn save_call_record(&self, record: &CallRecordWithInputs) -> Result<Digest, TrackerError> {
        let wrapped = ValueRecord::CallWithInputs(record.clone());
        let bytes = wrapped.canonical_bytes()?;
        let digest = Digest::of_bytes(&bytes);
        let key = format!("{CALLS_PREFIX}/{digest}");
        self.put_blob(&key, &bytes)?;
        tracing::debug!(
            function_name = %record.function_name,
            digest = %digest,
            "saved call record"
        );
        Ok(digest)
    }

    fn load_call_record(
        &self,
        digest: &Digest,
    ) -> Result<Option<CallRecordWithInputs>, TrackerError> {
        match self.load_record(CALLS_PREFIX, digest)? {
            None => Ok(None),
            Some(ValueRecord::CallWithInputs(record)) => Ok(Some(record)),
            Some(other) => Err(TrackerError::Record(RecordError::Malformed {
                message: format!(
                    "expected a call record under {digest}, found {}",
                    record_kind(&other)
                ),
            })),
        }
    }

    fn save_result_record(&self, record: &ResultRecord) -> Result<Digest, TrackerError> {
        let wrapped = ValueRecord::Result(record.clone());
        let bytes = wrapped.canonical_bytes()?;
        let digest = Digest::of_bytes(&bytes);
        let key = format!("{RESULTS_PREFIX}/{digest}");
        self.put_blob(&key, &bytes)?;

        // Memo entry last: an interrupted save must never leave an entry
        // pointing at a missing record.
        let entry = MemoEntry {
            output_digest: record.output_digest.clone(),
            result_digest: digest.clone(),
        };
        let entry_bytes = canonical::canonical_bytes_of(&entry)
            .map_err(|e| TrackerError::Record(RecordError::Canonical(e)))?;
        let memo_key = memo_key(
            &record.call.function_name,
            &record.call.function_version,
            &record.input_group_digest,
        );
        self.put_blob(&memo_key, &entry_bytes)?;
        tracing::debug!(
            function_name = %record.call.function_name,
            function_version = %record.call.function_version,
            output_digest = %record.output_digest,
            "saved result record and memo entry"
        );
        Ok(digest)
    }

    fn save_unknown_result_record(
        &self,
        record: &UnknownResultRecord,
    ) -> Result<Digest, TrackerError> {
        let wrapped = ValueRecord::UnknownResult(record.clone());
        let bytes = wrapped.canonical_bytes()?;
        let digest = Digest::of_bytes(&bytes);
        let key = format!("{RESULTS_PREFIX}/{digest}");
        self.put_blob(&key, &bytes)?;
        Ok(digest)
    }

    fn load_result_record(&self, digest: &Digest) -> Result<Option<ResultRecord>, TrackerError> {
        match self.load_record(RESULTS_PREFIX, digest)? {
            None => Ok(None),
            Some(ValueRecord::Result(record)) => Ok(Some(record)),
            Some(other) => Err(TrackerError::Record(RecordError::Malformed {
                message: format!(
                    "expected a result record under {digest}, found {}",
                    record_kind(&other)
                ),
            })),
        }
    }

    fn find_result(
        &self,
        function_name: &str,
        version: &Version,
        input_group_digest: &Digest,
    ) -> Result<Option<ResultRecord>, TrackerError> {
        let key = memo_key(function_name, version, input_group_digest);
        let Some(bytes) = self.get_blob(&key)? else {
            tracing::debug!(
                function_name,
                function_version = %version,
                input_group_digest = %input_group_digest,
                "memo miss"
            );
            return Ok(None);
        };
        let entry: MemoEntry = serde_json::from_slice(&bytes).map_err(|e| {
            TrackerError::Record(RecordError::Malformed {
                message: format!("malformed memo entry: {e}"),
            })
        })?;
        let record = self.load_result_record(&entry.result_digest)?.ok_or_else(|| {
            TrackerError::CorruptBlob {
                digest: entry.result_digest.clone(),
                message: "memo entry points at a missing result record".to_string(),
            }
        })?;
        tracing::debug!(
            function_name,
            function_version = %version,
            output_digest = %entry.output_digest,
            "memo hit"
        );
        Ok(Some(record))
    }
}

fn memo_key(function_name: &str, version: &Version, input_group_digest: &Digest) -> String {
    format!("{MEMO_PREFIX}/{function_name}/{}/{input_group_digest}", version.id)
}

fn record_kind(record: &ValueRecord) -> &'static str {
    match record {
        ValueRecord::UnknownCall(_) => "an unknown-provenance call record",
        ValueRecord::CallWithInputs(_) => "a call record",
        ValueRecord::CallWithoutInputs(_) => "a call stub",
        ValueRecord::Result(_) => "a result record",
        ValueRecord::UnknownResult(_) => "an unknown-provenance result record",
    }
}
