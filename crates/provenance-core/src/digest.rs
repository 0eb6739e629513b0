//! Content digests over canonical bytes.
//!
//! Every content-addressed object in the store is identified by a [`Digest`]:
//! the SHA-1 hash of its canonical byte serialization, rendered as 40
//! lowercase hex characters. Digest equality is the equality predicate for
//! values, call records, result records, and memoization keys alike.
//!
//! The wire form is `{"id": "<hex40>"}` so that digests embed uniformly in
//! the JSON record schemas.

use std::fmt;
use std::fmt::Write as _;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha1::{Digest as _, Sha1};
use thiserror::Error;

/// Number of raw hash bytes produced by SHA-1.
pub const DIGEST_SIZE: usize = 20;

/// Number of hex characters in the rendered form.
pub const DIGEST_HEX_LEN: usize = DIGEST_SIZE * 2;

/// Errors produced when parsing a digest from its hex form.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DigestParseError {
    /// The string is not exactly 40 characters long.
    #[error("digest must be {DIGEST_HEX_LEN} hex characters, got {len}")]
    BadLength {
        /// Length of the rejected string.
        len: usize,
    },

    /// The string contains a character outside `[0-9a-f]`.
    #[error("digest contains non-hex character {found:?} at position {position}")]
    BadCharacter {
        /// The offending character.
        found: char,
        /// Byte position of the offending character.
        position: usize,
    },
}

/// A SHA-1 content hash over a canonical byte serialization.
///
/// Digests are always lowercase hex. Two digests are equal exactly when the
/// canonical bytes they were computed over are equal.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Digest {
    id: String,
}

impl Digest {
    /// Computes the digest of a byte slice.
    #[must_use]
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let raw = Sha1::digest(bytes);
        Self {
            id: hex_encode(&raw),
        }
    }

    /// Parses a digest from its 40-char lowercase hex form.
    ///
    /// Uppercase hex is rejected: the canonical rendering is lowercase and
    /// digests are compared as strings in the store key space.
    ///
    /// # Errors
    ///
    /// Returns [`DigestParseError`] if the string is not exactly 40 lowercase
    /// hex characters.
    pub fn parse(s: &str) -> Result<Self, DigestParseError> {
        if s.len() != DIGEST_HEX_LEN {
            return Err(DigestParseError::BadLength { len: s.len() });
        }
        for (position, c) in s.chars().enumerate() {
            if !matches!(c, '0'..='9' | 'a'..='f') {
                return Err(DigestParseError::BadCharacter { found: c, position });
            }
        }
        Ok(Self { id: s.to_owned() })
    }

    /// Returns the hex form of the digest.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.id)
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        WireDigest { id: &self.id }.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = WireDigestOwned::deserialize(deserializer)?;
        Self::parse(&wire.id).map_err(D::Error::custom)
    }
}

#[derive(Serialize)]
struct WireDigest<'a> {
    id: &'a str,
}

#[derive(Deserialize)]
struct WireDigestOwned {
    id: String,
}

/// Encodes bytes as a lowercase hex string.
pub(crate) fn hex_encode(bytes: &[u8]) -> String {
    bytes
        .iter()
        .fold(String::with_capacity(bytes.len() * 2), |mut acc, b| {
            let _ = write!(acc, "{b:02x}");
            acc
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vector() {
        // SHA-1("abc")
        let digest = Digest::of_bytes(b"abc");
        assert_eq!(digest.id(), "a9993e364706816aba3e25717850c26c9cd0d89d");
    }

    #[test]
    fn empty_input() {
        let digest = Digest::of_bytes(b"");
        assert_eq!(digest.id(), "da39a3ee5e6b4b0d3255bfef95601890afd80709");
    }

    #[test]
    fn same_bytes_same_digest() {
        assert_eq!(Digest::of_bytes(b"payload"), Digest::of_bytes(b"payload"));
        assert_ne!(Digest::of_bytes(b"payload"), Digest::of_bytes(b"payloae"));
    }

    #[test]
    fn parse_round_trip() {
        let digest = Digest::of_bytes(b"round trip");
        let parsed = Digest::parse(digest.id()).unwrap();
        assert_eq!(digest, parsed);
    }

    #[test]
    fn parse_rejects_bad_length() {
        assert!(matches!(
            Digest::parse("abc123"),
            Err(DigestParseError::BadLength { len: 6 })
        ));
    }

    #[test]
    fn parse_rejects_uppercase() {
        let upper = "A9993E364706816ABA3E25717850C26C9CD0D89D";
        assert!(matches!(
            Digest::parse(upper),
            Err(DigestParseError::BadCharacter { position: 0, .. })
        ));
    }

    #[test]
    fn wire_form_is_id_object() {
        let digest = Digest::of_bytes(b"wire");
        let json = serde_json::to_string(&digest).unwrap();
        assert_eq!(json, format!(r#"{{"id":"{}"}}"#, digest.id()));

        let back: Digest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, digest);
    }

    #[test]
    fn deserialize_rejects_malformed_id() {
        let err = serde_json::from_str::<Digest>(r#"{"id":"zz"}"#);
        assert!(err.is_err());
    }
}
