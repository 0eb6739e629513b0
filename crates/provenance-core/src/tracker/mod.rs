//! The storage facade: blobs, records, and the memoization index.
//!
//! A [`ResultTracker`] is the only component that touches durable state. It
//! stores value payloads, call records, result records, and build-info
//! blobs in a content-addressed key space, and maintains the memoization
//! index `(functionName, functionVersion, inputGroupDigest) → outputDigest`
//! that lets a later resolution reuse an earlier result instead of
//! re-running the function.
//!
//! # Key space
//!
//! ```text
//! data/<digest>                                  value payloads
//! calls/<digest>                                 call records (WithInputs)
//! results/<digest>                               result records
//! memo/<functionName>/<version>/<inputGroup>     memo entries
//! builds/<buildId>                               build-info blobs
//! ```
//!
//! The shipped tracker is [`ProvenanceStore`], generic over any
//! [`BlobStore`]. The trait split keeps the engine testable against an
//! in-memory store and lets deployments bring their own object storage.

mod blob;
mod store;

#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use blob::{BlobStore, FsBlobStore, MemoryBlobStore, StorageError};
pub use store::ProvenanceStore;

use crate::build_info::BuildInfo;
use crate::codec::{ClassName, Codec, CodecError, Payload};
use crate::digest::Digest;
use crate::record::{CallRecordWithInputs, RecordError, ResultRecord, UnknownResultRecord};
use crate::version::Version;

/// Errors surfaced by tracker operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TrackerError {
    /// A storage operation failed after the configured retries.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A codec operation failed.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// A record failed to encode or decode.
    #[error(transparent)]
    Record(#[from] RecordError),

    /// No value blob exists for the digest.
    #[error("no value stored under digest {digest}")]
    ValueNotFound {
        /// The missing digest.
        digest: Digest,
    },

    /// Stored bytes do not hash back to the key they were stored under.
    #[error("corrupt blob under digest {digest}: {message}")]
    CorruptBlob {
        /// The digest the bytes were stored under.
        digest: Digest,
        /// Description of the corruption.
        message: String,
    },
}

/// Tuning knobs for a tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerConfig {
    /// Storage operations are retried this many times before the error is
    /// surfaced to the caller.
    pub max_retries: u32,

    /// Whether loads re-hash the bytes and compare against the key.
    pub verify_on_read: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            verify_on_read: true,
        }
    }
}

/// A memoization-index entry.
///
/// Maps the memo key to the output digest, with a pointer to the full
/// result record so a cache hit can recover the producing build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoEntry {
    /// Digest of the memoized output value.
    pub output_digest: Digest,

    /// Digest of the result record that produced the entry.
    pub result_digest: Digest,
}

/// The object-safe storage facade.
///
/// Typed conveniences live on [`ResultTrackerExt`], which is blanket
/// implemented for every tracker.
pub trait ResultTracker: Send + Sync {
    /// The build context attached to results produced through this tracker.
    fn current_build_info(&self) -> &BuildInfo;

    /// Writes the current build info under `builds/<buildId>`.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError`] on storage or serialization failure.
    fn save_build_info(&self) -> Result<Digest, TrackerError>;

    /// Loads a stored build-info blob.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError`] on storage or decode failure.
    fn load_build_info(&self, build_id: &str) -> Result<Option<BuildInfo>, TrackerError>;

    /// Writes value bytes under their digest; idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError`] on storage failure.
    fn save_value_bytes(
        &self,
        class_name: &ClassName,
        bytes: &[u8],
    ) -> Result<Digest, TrackerError>;

    /// Reads value bytes by digest.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::ValueNotFound`] if absent and
    /// [`TrackerError::CorruptBlob`] if verification is on and the bytes do
    /// not hash to the digest.
    fn load_value_bytes(&self, digest: &Digest) -> Result<Vec<u8>, TrackerError>;

    /// Whether a value blob exists for the digest.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError`] on storage failure.
    fn has_value(&self, digest: &Digest) -> Result<bool, TrackerError>;

    /// Writes a call record under its digest and returns the digest.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError`] on storage or serialization failure.
    fn save_call_record(&self, record: &CallRecordWithInputs) -> Result<Digest, TrackerError>;

    /// Loads a call record by digest.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError`] on storage or decode failure.
    fn load_call_record(
        &self,
        digest: &Digest,
    ) -> Result<Option<CallRecordWithInputs>, TrackerError>;

    /// Writes a result record and then its memoization entry.
    ///
    /// The memo entry is the final write, so an interrupted save can leave
    /// orphaned (harmless, content-addressed) blobs but never a memo entry
    /// pointing at missing data.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError`] on storage or serialization failure.
    fn save_result_record(&self, record: &ResultRecord) -> Result<Digest, TrackerError>;

    /// Writes the trivial result record for an unknown-provenance leaf.
    ///
    /// No memo entry is written; the leaf's resolution is its identity.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError`] on storage or serialization failure.
    fn save_unknown_result_record(
        &self,
        record: &UnknownResultRecord,
    ) -> Result<Digest, TrackerError>;

    /// Loads a result record by digest.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError`] on storage or decode failure.
    fn load_result_record(&self, digest: &Digest) -> Result<Option<ResultRecord>, TrackerError>;

    /// Probes the memoization index.
    ///
    /// A hit returns the full result record the memo entry points at.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::CorruptBlob`] if the entry points at a
    /// missing record, and storage/decode failures otherwise.
    fn find_result(
        &self,
        function_name: &str,
        version: &Version,
        input_group_digest: &Digest,
    ) -> Result<Option<ResultRecord>, TrackerError>;
}

/// Typed conveniences over any [`ResultTracker`].
pub trait ResultTrackerExt: ResultTracker {
    /// Serializes a value with its codec and stores the bytes.
    ///
    /// The codec consistency check runs before the write and is fatal: a
    /// value that cannot round-trip must never enter the store.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError`] on codec or storage failure.
    fn save_output_value<T: Payload>(&self, value: &T) -> Result<Digest, TrackerError> {
        let codec = Codec::<T>::resolve()?;
        let (bytes, digest) = codec.serialize_and_digest(value)?;
        codec.check_consistency(value, &bytes, &digest)?;
        self.save_value_bytes(codec.class_name(), &bytes)
    }

    /// Loads and decodes a value by digest.
    ///
    /// On a round-trip inconsistency the load is retried once against the
    /// re-serialized bytes; data that stabilizes on the second pass is
    /// accepted with a warning, since the store itself is intact.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError`] on storage, decode, or persistent
    /// consistency failure.
    fn load_value<T: Payload>(&self, digest: &Digest) -> Result<T, TrackerError> {
        Ok(self.load_value_with_codec(digest)?.0)
    }

    /// Loads a value and hands back the codec it was decoded with.
    ///
    /// # Errors
    ///
    /// As [`ResultTrackerExt::load_value`].
    fn load_value_with_codec<T: Payload>(
        &self,
        digest: &Digest,
    ) -> Result<(T, Codec<T>), TrackerError> {
        let codec = Codec::<T>::resolve()?;
        let bytes = self.load_value_bytes(digest)?;
        let value = codec.deserialize(&bytes)?;
        match codec.check_consistency(&value, &bytes, digest) {
            Ok(()) => Ok((value, codec)),
            Err(CodecError::Inconsistent { .. }) => {
                tracing::warn!(
                    digest = %digest,
                    class_name = %codec.class_name(),
                    "stored value did not round-trip; retrying against re-serialized bytes"
                );
                let second_bytes = codec.serialize(&value)?;
                let second = codec.deserialize(&second_bytes)?;
                let third_bytes = codec.serialize(&second)?;
                if second_bytes == third_bytes {
                    Ok((second, codec))
                } else {
                    Err(CodecError::Inconsistent {
                        digest: digest.clone(),
                    }
                    .into())
                }
            },
            Err(e) => Err(e.into()),
        }
    }
}

impl<R: ResultTracker + ?Sized> ResultTrackerExt for R {}
