//! The process-wide class-name registry.
//!
//! Serialization tags every payload with a canonical class name so that a
//! reader can decide whether it holds the code for a stored value before
//! attempting to decode it. The mapping between Rust types and class names
//! is explicit: each payload type is registered once, usually at module
//! init, and both directions of the mapping are checked for collisions.
//!
//! Primitives (`i64`, `f64`, `bool`, `String`, `unit`) and the library's own
//! record types are pre-registered.

use std::any::TypeId;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, LazyLock, RwLock};

use serde::{Deserialize, Serialize};

use super::{CodecError, Payload};
use crate::build_info::{BuildInfo, BuildInfoBrief};
use crate::canonical;
use crate::digest::Digest;
use crate::version::Version;

/// A canonical type-tag string.
///
/// Class names are the out-of-band type information in every record: a name
/// emitted by a writer must resolve to the same type in a reader that has
/// it. They serialize as plain strings.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClassName(String);

impl ClassName {
    /// Wraps a class-name string.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The underlying string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClassName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClassName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// A type-erased view of a registered codec.
///
/// Carries enough behavior to re-serialize and verify stored bytes without
/// naming the concrete type, which is what transport-only processes need.
#[derive(Clone)]
pub struct ErasedCodec {
    class_name: ClassName,
    reserialize: Arc<dyn Fn(&[u8]) -> Result<Vec<u8>, CodecError> + Send + Sync>,
}

impl ErasedCodec {
    /// The class name this codec decodes.
    #[must_use]
    pub fn class_name(&self) -> &ClassName {
        &self.class_name
    }

    /// Decodes the bytes as the registered type and re-emits canonical bytes.
    ///
    /// # Errors
    ///
    /// Propagates decode and canonicalization failures.
    pub fn reserialize(&self, bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
        (self.reserialize)(bytes)
    }

    /// Checks that stored bytes round-trip to themselves and to the digest.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Inconsistent`] on any mismatch.
    pub fn check_consistency(&self, bytes: &[u8], digest: &Digest) -> Result<(), CodecError> {
        let reserialized = self.reserialize(bytes)?;
        if reserialized != bytes || Digest::of_bytes(&reserialized) != *digest {
            return Err(CodecError::Inconsistent {
                digest: digest.clone(),
            });
        }
        Ok(())
    }
}

impl fmt::Debug for ErasedCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErasedCodec")
            .field("class_name", &self.class_name)
            .finish_non_exhaustive()
    }
}

struct Entry {
    type_id: TypeId,
    codec: ErasedCodec,
}

#[derive(Default)]
struct RegistryState {
    by_name: BTreeMap<String, Entry>,
    by_type: HashMap<TypeId, ClassName>,
}

static REGISTRY: LazyLock<RwLock<RegistryState>> = LazyLock::new(|| {
    let mut state = RegistryState::default();
    builtin::<i64>(&mut state, "i64");
    builtin::<u64>(&mut state, "u64");
    builtin::<f64>(&mut state, "f64");
    builtin::<bool>(&mut state, "bool");
    builtin::<String>(&mut state, "String");
    builtin::<()>(&mut state, "unit");
    builtin::<Version>(&mut state, "Version");
    builtin::<BuildInfo>(&mut state, "BuildInfo");
    builtin::<BuildInfoBrief>(&mut state, "BuildInfoBrief");
    RwLock::new(state)
});

fn builtin<T: Payload>(state: &mut RegistryState, name: &str) {
    let class_name = ClassName::new(name);
    state.by_type.insert(TypeId::of::<T>(), class_name.clone());
    state.by_name.insert(
        name.to_string(),
        Entry {
            type_id: TypeId::of::<T>(),
            codec: erased::<T>(class_name),
        },
    );
}

fn erased<T: Payload>(class_name: ClassName) -> ErasedCodec {
    let name_for_errors = class_name.to_string();
    ErasedCodec {
        class_name,
        reserialize: Arc::new(move |bytes| {
            let value: T =
                serde_json::from_slice(bytes).map_err(|e| CodecError::Deserialize {
                    class_name: name_for_errors.clone(),
                    message: e.to_string(),
                })?;
            Ok(canonical::canonical_bytes_of(&value)?)
        }),
    }
}

/// Registers `T` under a canonical class name.
///
/// Registration is idempotent for an identical `(type, name)` pair, so
/// multiple modules may register the same payload.
///
/// # Errors
///
/// Returns [`CodecError::DuplicateClassName`] when the name is taken by a
/// different type or the type is already registered under a different name.
///
/// # Panics
///
/// Panics if the registry lock is poisoned.
pub fn register<T: Payload>(name: &str) -> Result<ClassName, CodecError> {
    let mut state = REGISTRY.write().expect("codec registry lock poisoned");
    let type_id = TypeId::of::<T>();

    if let Some(existing) = state.by_type.get(&type_id) {
        if existing.as_str() == name {
            return Ok(existing.clone());
        }
        return Err(CodecError::DuplicateClassName {
            class_name: name.to_string(),
        });
    }
    if let Some(entry) = state.by_name.get(name) {
        if entry.type_id != type_id {
            return Err(CodecError::DuplicateClassName {
                class_name: name.to_string(),
            });
        }
    }

    let class_name = ClassName::new(name);
    state.by_type.insert(type_id, class_name.clone());
    state.by_name.insert(
        name.to_string(),
        Entry {
            type_id,
            codec: erased::<T>(class_name.clone()),
        },
    );
    Ok(class_name)
}

/// Returns the class name registered for `T`.
///
/// # Errors
///
/// Returns [`CodecError::UnregisteredType`] if `T` was never registered.
///
/// # Panics
///
/// Panics if the registry lock is poisoned.
pub fn class_name_of<T: Payload>() -> Result<ClassName, CodecError> {
    let state = REGISTRY.read().expect("codec registry lock poisoned");
    state
        .by_type
        .get(&TypeId::of::<T>())
        .cloned()
        .ok_or(CodecError::UnregisteredType {
            type_name: std::any::type_name::<T>(),
        })
}

/// Looks up the erased codec for a class name.
///
/// # Errors
///
/// Returns [`CodecError::ClassNotFound`] when the name does not resolve in
/// this process.
///
/// # Panics
///
/// Panics if the registry lock is poisoned.
pub fn lookup(name: &str) -> Result<ErasedCodec, CodecError> {
    let state = REGISTRY.read().expect("codec registry lock poisoned");
    state
        .by_name
        .get(name)
        .map(|entry| entry.codec.clone())
        .ok_or_else(|| CodecError::ClassNotFound {
            class_name: name.to_string(),
        })
}

/// Whether a class name resolves in this process.
///
/// # Panics
///
/// Panics if the registry lock is poisoned.
#[must_use]
pub fn is_registered(name: &str) -> bool {
    let state = REGISTRY.read().expect("codec registry lock poisoned");
    state.by_name.contains_key(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    struct Gadget {
        id: u32,
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Gizmo {
        id: u32,
    }

    #[test]
    fn builtins_are_present() {
        assert!(is_registered("i64"));
        assert!(is_registered("String"));
        assert!(is_registered("Version"));
    }

    #[test]
    fn registration_is_idempotent() {
        let first = register::<Gadget>("test.registry.Gadget").unwrap();
        let second = register::<Gadget>("test.registry.Gadget").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn name_collision_is_rejected() {
        register::<Gizmo>("test.registry.Gizmo").unwrap();
        // Whether Gadget is already registered under its own name or not,
        // claiming Gizmo's name must fail.
        let err = register::<Gadget>("test.registry.Gizmo").unwrap_err();
        assert!(matches!(err, CodecError::DuplicateClassName { .. }));
    }

    #[test]
    fn lookup_miss_is_class_not_found() {
        let err = lookup("test.registry.NoSuchClass").unwrap_err();
        assert!(matches!(err, CodecError::ClassNotFound { .. }));
    }

    #[test]
    fn erased_codec_reserializes_canonically() {
        register::<Gizmo>("test.registry.Gizmo").unwrap();
        let codec = lookup("test.registry.Gizmo").unwrap();
        // Whitespace disappears under reserialization.
        let loose = b"{ \"id\": 7 }";
        assert_eq!(codec.reserialize(loose).unwrap(), br#"{"id":7}"#);
    }

    #[test]
    fn erased_consistency_check() {
        let codec = lookup("i64").unwrap();
        let bytes = b"41";
        let digest = Digest::of_bytes(bytes);
        codec.check_consistency(bytes, &digest).unwrap();

        let wrong = Digest::of_bytes(b"42");
        assert!(codec.check_consistency(bytes, &wrong).is_err());
    }
}
