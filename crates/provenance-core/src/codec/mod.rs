//! Deterministic value serialization and content hashing.
//!
//! A [`Codec`] is the bridge between a typed value and its content-addressed
//! byte form: canonical JSON bytes plus a [`ClassName`] type tag carried out
//! of band in the records that reference the value. The class name must
//! round-trip — a name emitted by a writer resolves to the same type in any
//! reader that has that type linked in.
//!
//! Codecs are resolved through an explicit process-wide registry (see
//! [`registry`]): each payload type is registered once at module init, and
//! readers look types up by class name. A lookup miss is the
//! [`CodecError::ClassNotFound`] condition — the record can still be
//! transported and re-stored by digest, it just cannot be inflated to a
//! typed value in this process.
//!
//! # Example
//!
//! ```
//! use provenance_core::codec::Codec;
//!
//! let codec = Codec::<i64>::resolve().unwrap();
//! let (bytes, digest) = codec.serialize_and_digest(&5).unwrap();
//! assert_eq!(bytes, b"5");
//! assert_eq!(codec.deserialize(&bytes).unwrap(), 5);
//! codec.check_consistency(&5, &bytes, &digest).unwrap();
//! ```

mod registry;

use std::any::TypeId;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

pub use registry::{class_name_of, is_registered, lookup, register, ClassName, ErasedCodec};

use crate::canonical::{self, CanonicalError};
use crate::digest::Digest;

/// Marker for types that can be carried through the provenance graph.
///
/// Blanket-implemented; the real requirement is a serde round-trip plus
/// thread safety.
pub trait Payload: Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T: Serialize + DeserializeOwned + Send + Sync + 'static> Payload for T {}

/// Errors raised by serialization, deserialization, and codec lookup.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CodecError {
    /// A class name in a record does not resolve to a type in this process.
    #[error("no codec registered for class '{class_name}'")]
    ClassNotFound {
        /// The unresolvable class name.
        class_name: String,
    },

    /// A Rust type was used as a payload without being registered.
    #[error("type {type_name} has no registered class name")]
    UnregisteredType {
        /// The Rust type name (diagnostic only, not a wire identifier).
        type_name: &'static str,
    },

    /// A registration collided with an existing entry.
    #[error("class name '{class_name}' is already registered for another type")]
    DuplicateClassName {
        /// The contested class name.
        class_name: String,
    },

    /// `digest_object` was asked to wrap a raw byte payload.
    ///
    /// Raw bytes must be digested directly with [`Digest::of_bytes`];
    /// re-encoding them through a codec would silently change the digest.
    #[error("raw byte payloads must be digested directly, not re-serialized")]
    RawBytes,

    /// Canonical serialization failed.
    #[error(transparent)]
    Canonical(#[from] CanonicalError),

    /// Deserialization of stored bytes into the target type failed.
    #[error("cannot decode bytes as class '{class_name}': {message}")]
    Deserialize {
        /// The class the bytes were expected to decode as.
        class_name: String,
        /// Description of the decode failure.
        message: String,
    },

    /// A serialize/deserialize round trip did not reproduce the bytes.
    #[error("inconsistent serialization for digest {digest}")]
    Inconsistent {
        /// Digest of the offending bytes.
        digest: Digest,
    },
}

/// A typed encoder/decoder pair with a canonical class-name tag.
///
/// `Codec<T>` is a zero-sized handle (plus the class name) resolved from the
/// registry; it does not own any serialization state.
#[derive(Debug, Clone)]
pub struct Codec<T> {
    class_name: ClassName,
    _marker: PhantomData<fn(T) -> T>,
}

impl<T: Payload> Codec<T> {
    /// Resolves the codec for `T` from the registry.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::UnregisteredType`] if `T` was never registered.
    pub fn resolve() -> Result<Self, CodecError> {
        let class_name = registry::class_name_of::<T>()?;
        Ok(Self {
            class_name,
            _marker: PhantomData,
        })
    }

    /// The canonical class name for `T`.
    #[must_use]
    pub fn class_name(&self) -> &ClassName {
        &self.class_name
    }

    /// Serializes a value to canonical bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Canonical`] if the value has no canonical JSON
    /// form.
    pub fn serialize(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        Ok(canonical::canonical_bytes_of(value)?)
    }

    /// Deserializes canonical bytes back into a value.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Deserialize`] if the bytes do not decode as `T`.
    pub fn deserialize(&self, bytes: &[u8]) -> Result<T, CodecError> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::Deserialize {
            class_name: self.class_name.to_string(),
            message: e.to_string(),
        })
    }

    /// Digests a value by serializing it first.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::RawBytes`] for raw byte payloads and propagates
    /// serialization failures.
    pub fn digest_object(&self, value: &T) -> Result<Digest, CodecError> {
        if TypeId::of::<T>() == TypeId::of::<Vec<u8>>() {
            return Err(CodecError::RawBytes);
        }
        Ok(Digest::of_bytes(&self.serialize(value)?))
    }

    /// Serializes a value and digests the bytes in one step.
    ///
    /// # Errors
    ///
    /// Same as [`Codec::digest_object`].
    pub fn serialize_and_digest(&self, value: &T) -> Result<(Vec<u8>, Digest), CodecError> {
        if TypeId::of::<T>() == TypeId::of::<Vec<u8>>() {
            return Err(CodecError::RawBytes);
        }
        let bytes = self.serialize(value)?;
        let digest = Digest::of_bytes(&bytes);
        Ok((bytes, digest))
    }

    /// Verifies that a value, its bytes, and its digest agree.
    ///
    /// Deserializes the bytes, re-serializes the decoded value, and requires
    /// byte equality plus a digest match. Callers on the write path treat a
    /// failure as fatal; readers may retry once, since a round trip that
    /// stabilizes on the second pass is acceptable for already-stored data.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Inconsistent`] on any mismatch, or a decode
    /// error if the bytes do not parse at all.
    pub fn check_consistency(
        &self,
        value: &T,
        bytes: &[u8],
        digest: &Digest,
    ) -> Result<(), CodecError> {
        let decoded = self.deserialize(bytes)?;
        let reserialized = self.serialize(&decoded)?;
        if reserialized != bytes || Digest::of_bytes(&reserialized) != *digest {
            return Err(CodecError::Inconsistent {
                digest: digest.clone(),
            });
        }
        // The value itself must also reproduce the bytes.
        let direct = self.serialize(value)?;
        if direct != bytes {
            return Err(CodecError::Inconsistent {
                digest: digest.clone(),
            });
        }
        Ok(())
    }
}

/// Digests raw bytes directly.
///
/// This is the entry point for byte payloads; see [`CodecError::RawBytes`].
#[must_use]
pub fn digest_bytes(bytes: &[u8]) -> Digest {
    Digest::of_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Widget {
        name: String,
        weight: i64,
    }

    fn widget_codec() -> Codec<Widget> {
        let _ = register::<Widget>("test.codec.Widget");
        Codec::resolve().unwrap()
    }

    #[test]
    fn primitive_round_trip() {
        let codec = Codec::<i64>::resolve().unwrap();
        let bytes = codec.serialize(&42).unwrap();
        assert_eq!(bytes, b"42");
        assert_eq!(codec.deserialize(&bytes).unwrap(), 42);
    }

    #[test]
    fn struct_round_trip_with_sorted_keys() {
        let codec = widget_codec();
        let widget = Widget {
            name: "w".to_string(),
            weight: 3,
        };
        let bytes = codec.serialize(&widget).unwrap();
        assert_eq!(bytes, br#"{"name":"w","weight":3}"#);
        assert_eq!(codec.deserialize(&bytes).unwrap(), widget);
    }

    #[test]
    fn digest_object_matches_digest_of_bytes() {
        let codec = Codec::<String>::resolve().unwrap();
        let value = "hello".to_string();
        let bytes = codec.serialize(&value).unwrap();
        assert_eq!(codec.digest_object(&value).unwrap(), Digest::of_bytes(&bytes));
    }

    #[test]
    fn raw_bytes_are_refused() {
        let _ = register::<Vec<u8>>("test.codec.Bytes");
        let codec = Codec::<Vec<u8>>::resolve().unwrap();
        assert!(matches!(
            codec.digest_object(&vec![1, 2, 3]),
            Err(CodecError::RawBytes)
        ));
        assert!(matches!(
            codec.serialize_and_digest(&vec![1, 2, 3]),
            Err(CodecError::RawBytes)
        ));
    }

    #[test]
    fn unregistered_type_is_an_error() {
        #[derive(Serialize, Deserialize)]
        struct Unregistered;
        assert!(matches!(
            Codec::<Unregistered>::resolve(),
            Err(CodecError::UnregisteredType { .. })
        ));
    }

    #[test]
    fn consistency_accepts_honest_bytes() {
        let codec = widget_codec();
        let widget = Widget {
            name: "ok".to_string(),
            weight: 1,
        };
        let (bytes, digest) = codec.serialize_and_digest(&widget).unwrap();
        codec.check_consistency(&widget, &bytes, &digest).unwrap();
    }

    #[test]
    fn consistency_rejects_foreign_bytes() {
        let codec = widget_codec();
        let widget = Widget {
            name: "ok".to_string(),
            weight: 1,
        };
        let other = Widget {
            name: "other".to_string(),
            weight: 2,
        };
        let (bytes, digest) = codec.serialize_and_digest(&other).unwrap();
        assert!(matches!(
            codec.check_consistency(&widget, &bytes, &digest),
            Err(CodecError::Inconsistent { .. })
        ));
    }

    #[test]
    fn consistency_rejects_wrong_digest() {
        let codec = widget_codec();
        let widget = Widget {
            name: "ok".to_string(),
            weight: 1,
        };
        let (bytes, _) = codec.serialize_and_digest(&widget).unwrap();
        let wrong = Digest::of_bytes(b"something else");
        assert!(matches!(
            codec.check_consistency(&widget, &bytes, &wrong),
            Err(CodecError::Inconsistent { .. })
        ));
    }
}
