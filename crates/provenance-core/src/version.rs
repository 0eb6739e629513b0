//! Semantic versions of function behavior.

use std::fmt;

use serde::{Deserialize, Serialize};

/// An opaque name for a semantic version of a function's behavior.
///
/// A version is part of every memoization key: changing the version of a
/// function invalidates its cached results even when the inputs are
/// unchanged. The string is opaque to the library; `"1.0"` and
/// `"2024-spline-fix"` are equally valid.
///
/// A version can itself be computed: the graph accepts a
/// `ValueWithProvenance<Version>` wherever a version is expected, so a
/// function's version may be the output of another tracked call.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version {
    /// The opaque version string.
    pub id: String,
}

impl Version {
    /// Creates a version from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

impl From<&str> for Version {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_form() {
        let version = Version::new("1.0");
        let json = serde_json::to_string(&version).unwrap();
        assert_eq!(json, r#"{"id":"1.0"}"#);
    }

    #[test]
    fn display_is_bare_id() {
        assert_eq!(Version::new("2.1").to_string(), "2.1");
    }
}
