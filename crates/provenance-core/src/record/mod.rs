//! The serializable mirror of the provenance graph.
//!
//! Every graph node has a storage-shaped twin here: a record that
//! round-trips through JSON and refers to other records only by [`Digest`].
//! The mirror is a closed sum tagged with a `_subclass` discriminator whose
//! values are the canonical record names, so one decoder covers every
//! record in the store.
//!
//! Two rules keep records small and identities stable:
//!
//! - Wherever one call's definition is embedded in another's input list,
//!   only a [`CallRecordWithoutInputs`] stub is embedded (name, version,
//!   output class, and the digest of the full form); the full
//!   [`CallRecordWithInputs`] form is written separately.
//! - A call's own digest is computed over the canonical bytes of its tagged
//!   WithInputs form, and the memoization key digests the ordered list of
//!   input output-digests.
//!
//! Submodules [`save`] and [`load`] convert between graph nodes and records.

pub mod load;
pub mod save;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::canonical::{self, CanonicalError};
use crate::codec::ClassName;
use crate::digest::Digest;
use crate::version::Version;

/// Discriminator key carried by every record.
pub const SUBCLASS_KEY: &str = "_subclass";

/// Discriminator for unknown-provenance call records.
pub const TAG_UNKNOWN_CALL: &str = "FunctionCallWithUnknownProvenanceSerializable";
/// Discriminator for full call records.
pub const TAG_CALL_WITH_INPUTS: &str = "FunctionCallWithKnownProvenanceSerializableWithInputs";
/// Discriminator for unexpanded call stubs.
pub const TAG_CALL_WITHOUT_INPUTS: &str =
    "FunctionCallWithKnownProvenanceSerializableWithoutInputs";
/// Discriminator for result records.
pub const TAG_RESULT: &str = "FunctionCallResultWithKnownProvenanceSerializable";
/// Discriminator for unknown-provenance result records.
pub const TAG_UNKNOWN_RESULT: &str = "FunctionCallResultWithUnknownProvenanceSerializable";

const KNOWN_TAGS: &[&str] = &[
    TAG_UNKNOWN_CALL,
    TAG_CALL_WITH_INPUTS,
    TAG_CALL_WITHOUT_INPUTS,
    TAG_RESULT,
    TAG_UNKNOWN_RESULT,
];

/// Errors raised while encoding or decoding records.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RecordError {
    /// Canonical serialization failed.
    #[error(transparent)]
    Canonical(#[from] CanonicalError),

    /// The record carries a `_subclass` this library does not know.
    #[error("unexpected record variant '{subclass}'")]
    UnexpectedVariant {
        /// The unknown discriminator value.
        subclass: String,
    },

    /// The record has no string `_subclass` field at all.
    #[error("record has no '{SUBCLASS_KEY}' discriminator")]
    MissingDiscriminator,

    /// The record body did not decode as its discriminated variant.
    #[error("malformed record: {message}")]
    Malformed {
        /// Description of the decode failure.
        message: String,
    },
}

/// A raw-value leaf: `{ outputClassName, valueDigest }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnknownCallRecord {
    /// Class name of the wrapped value.
    pub output_class_name: ClassName,

    /// Digest of the value's canonical bytes.
    pub value_digest: Digest,
}

/// A full call record with its input list expanded in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRecordWithInputs {
    /// Canonical function name.
    pub function_name: String,

    /// The resolved version the call runs at.
    pub function_version: Version,

    /// Class name of the call's output.
    pub output_class_name: ClassName,

    /// One record per input, in declared parameter order.
    pub input_list: Vec<ValueRecord>,
}

impl CallRecordWithInputs {
    /// The digest identifying this call: the hash of its tagged canonical
    /// bytes.
    ///
    /// # Errors
    ///
    /// Propagates canonicalization failures.
    pub fn digest(&self) -> Result<Digest, RecordError> {
        Ok(Digest::of_bytes(&tagged_bytes(TAG_CALL_WITH_INPUTS, self)?))
    }

    /// The unexpanded stub equivalent to this record.
    ///
    /// # Errors
    ///
    /// Propagates canonicalization failures from the digest computation.
    pub fn without_inputs(&self) -> Result<CallRecordWithoutInputs, RecordError> {
        Ok(CallRecordWithoutInputs {
            function_name: self.function_name.clone(),
            function_version: self.function_version.clone(),
            output_class_name: self.output_class_name.clone(),
            digest_of_equivalent_with_inputs: self.digest()?,
        })
    }
}

/// An unexpanded call stub: the full form is referenced by digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRecordWithoutInputs {
    /// Canonical function name.
    pub function_name: String,

    /// The resolved version the call runs at.
    pub function_version: Version,

    /// Class name of the call's output.
    pub output_class_name: ClassName,

    /// Digest of the corresponding [`CallRecordWithInputs`].
    pub digest_of_equivalent_with_inputs: Digest,
}

/// A result record for a call with known provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultRecord {
    /// The originating call, as an unexpanded stub.
    pub call: CallRecordWithoutInputs,

    /// Digest of the ordered list of input output-digests.
    pub input_group_digest: Digest,

    /// Digest of the output value's canonical bytes.
    pub output_digest: Digest,

    /// Commit the producing build was made from.
    pub commit_id: String,

    /// Identity of the producing build.
    pub build_id: String,
}

impl ResultRecord {
    /// The digest identifying this result record.
    ///
    /// # Errors
    ///
    /// Propagates canonicalization failures.
    pub fn digest(&self) -> Result<Digest, RecordError> {
        Ok(Digest::of_bytes(&tagged_bytes(TAG_RESULT, self)?))
    }
}

/// The trivial result record for an unknown-provenance leaf.
///
/// Its input group is empty by construction, so the `inputGroupDigest` is
/// the digest of the empty digest list and is not stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnknownResultRecord {
    /// The originating leaf record.
    pub call: UnknownCallRecord,

    /// Digest of the output value's canonical bytes.
    ///
    /// Always equal to the call's `valueDigest`; stored so result records
    /// have a uniform shape.
    pub output_digest: Digest,

    /// Commit the recording build was made from.
    pub commit_id: String,

    /// Identity of the recording build.
    pub build_id: String,
}

impl UnknownResultRecord {
    /// The digest identifying this result record.
    ///
    /// # Errors
    ///
    /// Propagates canonicalization failures.
    pub fn digest(&self) -> Result<Digest, RecordError> {
        Ok(Digest::of_bytes(&tagged_bytes(TAG_UNKNOWN_RESULT, self)?))
    }
}

/// The closed sum of every record shape in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "_subclass")]
pub enum ValueRecord {
    /// A raw-value leaf.
    #[serde(rename = "FunctionCallWithUnknownProvenanceSerializable")]
    UnknownCall(UnknownCallRecord),

    /// A full call with expanded inputs.
    #[serde(rename = "FunctionCallWithKnownProvenanceSerializableWithInputs")]
    CallWithInputs(CallRecordWithInputs),

    /// An unexpanded call stub.
    #[serde(rename = "FunctionCallWithKnownProvenanceSerializableWithoutInputs")]
    CallWithoutInputs(CallRecordWithoutInputs),

    /// A result for a call with known provenance.
    #[serde(rename = "FunctionCallResultWithKnownProvenanceSerializable")]
    Result(ResultRecord),

    /// A result for an unknown-provenance leaf.
    #[serde(rename = "FunctionCallResultWithUnknownProvenanceSerializable")]
    UnknownResult(UnknownResultRecord),
}

impl ValueRecord {
    /// The canonical byte form of the tagged record.
    ///
    /// # Errors
    ///
    /// Propagates canonicalization failures.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, RecordError> {
        Ok(canonical::canonical_bytes_of(self)?)
    }

    /// The digest of the tagged canonical bytes.
    ///
    /// # Errors
    ///
    /// Propagates canonicalization failures.
    pub fn digest(&self) -> Result<Digest, RecordError> {
        Ok(Digest::of_bytes(&self.canonical_bytes()?))
    }

    /// Class name of the value this record ultimately produces.
    #[must_use]
    pub fn output_class_name(&self) -> &ClassName {
        match self {
            Self::UnknownCall(r) => &r.output_class_name,
            Self::CallWithInputs(r) => &r.output_class_name,
            Self::CallWithoutInputs(r) => &r.output_class_name,
            Self::Result(r) => &r.call.output_class_name,
            Self::UnknownResult(r) => &r.call.output_class_name,
        }
    }

    /// Decodes a record from stored bytes.
    ///
    /// An unknown `_subclass` is reported as
    /// [`RecordError::UnexpectedVariant`] rather than a generic parse
    /// failure, so callers can distinguish schema evolution from corruption.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError`] on malformed bytes, a missing discriminator,
    /// or an unknown variant.
    pub fn decode(bytes: &[u8]) -> Result<Self, RecordError> {
        let tree = canonical::parse_canonical(bytes)?;
        let Some(subclass) = tree.get(SUBCLASS_KEY).and_then(Value::as_str) else {
            return Err(RecordError::MissingDiscriminator);
        };
        if !KNOWN_TAGS.contains(&subclass) {
            return Err(RecordError::UnexpectedVariant {
                subclass: subclass.to_string(),
            });
        }
        serde_json::from_value(tree).map_err(|e| RecordError::Malformed {
            message: e.to_string(),
        })
    }
}

/// Serializes a record body with its `_subclass` tag injected.
fn tagged_bytes<T: Serialize>(tag: &str, body: &T) -> Result<Vec<u8>, RecordError> {
    let mut tree = canonical::to_canonical_value(body)?;
    match &mut tree {
        Value::Object(map) => {
            map.insert(SUBCLASS_KEY.to_string(), Value::String(tag.to_string()));
        },
        _ => {
            return Err(RecordError::Malformed {
                message: "record body is not a JSON object".to_string(),
            })
        },
    }
    Ok(canonical::canonical_bytes(&tree))
}

/// Digests the ordered list of input output-digests.
///
/// This is the memoization-key component: permuting the inputs permutes the
/// list and changes the digest.
///
/// # Errors
///
/// Propagates canonicalization failures.
pub fn input_group_digest(digests: &[Digest]) -> Result<Digest, RecordError> {
    Ok(Digest::of_bytes(&canonical::canonical_bytes_of(digests)?))
}

/// The input-group digest of the empty input list.
///
/// # Errors
///
/// Propagates canonicalization failures.
pub fn empty_input_group_digest() -> Result<Digest, RecordError> {
    input_group_digest(&[])
}

#[cfg(test)]
mod tests;
