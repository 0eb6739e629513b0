//! The output payload of a resolved node.

use serde_json::Value;

use crate::canonical;
use crate::digest::Digest;
use crate::tracker::{ResultTracker, TrackerError};

/// A value that may be held concretely, by digest, or both.
///
/// Results loaded from the memoization index carry only a digest — that is
/// enough for every downstream digest-of-inputs consumer, and the concrete
/// value can be loaded through the tracker on demand. Freshly executed
/// results carry both. The "at least one present" invariant holds by
/// construction.
#[derive(Debug, Clone, PartialEq)]
pub enum VirtualValue {
    /// Only the concrete canonical value is held.
    Concrete {
        /// The canonical JSON form of the value.
        value: Value,
    },

    /// Only the digest is held; the value lives in the store.
    Digest {
        /// Digest of the value's canonical bytes.
        digest: Digest,
    },

    /// Both forms are held.
    Both {
        /// The canonical JSON form of the value.
        value: Value,
        /// Digest of the value's canonical bytes.
        digest: Digest,
    },
}

impl VirtualValue {
    /// Wraps a concrete value, computing its digest eagerly.
    #[must_use]
    pub fn of(value: Value) -> Self {
        let bytes = canonical::canonical_bytes(&value);
        let digest = Digest::of_bytes(&bytes);
        Self::Both { value, digest }
    }

    /// Wraps a digest with no concrete value.
    #[must_use]
    pub fn from_digest(digest: Digest) -> Self {
        Self::Digest { digest }
    }

    /// The concrete value, if held.
    #[must_use]
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Concrete { value } | Self::Both { value, .. } => Some(value),
            Self::Digest { .. } => None,
        }
    }

    /// The digest, if held.
    #[must_use]
    pub fn digest(&self) -> Option<&Digest> {
        match self {
            Self::Digest { digest } | Self::Both { digest, .. } => Some(digest),
            Self::Concrete { .. } => None,
        }
    }

    /// The digest, computing it from the concrete value if necessary.
    #[must_use]
    pub fn resolve_digest(&self) -> Digest {
        match self {
            Self::Digest { digest } | Self::Both { digest, .. } => digest.clone(),
            Self::Concrete { value } => Digest::of_bytes(&canonical::canonical_bytes(value)),
        }
    }

    /// The concrete value, loading it through the tracker if necessary.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError`] if a digest-only value cannot be loaded.
    pub fn materialize(&self, tracker: &dyn ResultTracker) -> Result<Value, TrackerError> {
        match self {
            Self::Concrete { value } | Self::Both { value, .. } => Ok(value.clone()),
            Self::Digest { digest } => {
                let bytes = tracker.load_value_bytes(digest)?;
                canonical::parse_canonical(&bytes)
                    .map_err(|e| TrackerError::Record(crate::record::RecordError::Canonical(e)))
            },
        }
    }
}
