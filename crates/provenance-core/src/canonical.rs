//! Canonical JSON serialization.
//!
//! Digests are only meaningful if the bytes under them are deterministic, so
//! every payload, call record, and result record is rendered through one
//! canonical JSON form before hashing or storage:
//!
//! - Object keys are sorted in lexicographic (byte) order.
//! - No whitespace between tokens.
//! - Strings use minimal escaping (only `"` and `\` and control characters).
//! - Numbers are emitted through `serde_json`'s shortest-round-trip
//!   formatting, so a given number value always renders to one byte string.
//! - Duplicate object keys are rejected on parse.
//! - Nesting deeper than [`MAX_DEPTH`] levels is rejected.
//!
//! # Example
//!
//! ```
//! use provenance_core::canonical;
//!
//! let bytes = canonical::canonical_bytes_of(&serde_json::json!({
//!     "z": 1,
//!     "a": 2,
//! }))
//! .unwrap();
//! assert_eq!(bytes, br#"{"a":2,"z":1}"#);
//! ```

use std::collections::BTreeSet;
use std::fmt::Write as _;

use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::Serialize;
use serde_json::{Map, Number, Value};
use thiserror::Error;

/// Maximum recursion depth accepted by the canonicalizer.
pub const MAX_DEPTH: usize = 128;

/// Errors that can occur while producing or parsing canonical JSON.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CanonicalError {
    /// The value could not be represented as a JSON tree.
    ///
    /// Non-finite floats are the usual culprit: `NaN` and infinities have no
    /// JSON rendering and therefore no canonical bytes.
    #[error("value is not representable as JSON: {message}")]
    NotRepresentable {
        /// Description of the failure.
        message: String,
    },

    /// A duplicate key was found in an object during parsing.
    #[error("duplicate key: '{key}' appears multiple times in object")]
    DuplicateKey {
        /// The duplicated key.
        key: String,
    },

    /// The maximum nesting depth was exceeded.
    #[error("max depth exceeded: JSON nested deeper than {MAX_DEPTH} levels")]
    MaxDepthExceeded,

    /// The input bytes are not valid JSON.
    #[error("JSON parse error: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
    },
}

/// Converts any serde value to a JSON tree, checking canonical constraints.
///
/// # Errors
///
/// Returns [`CanonicalError::NotRepresentable`] if serialization fails (for
/// example on non-finite floats) and [`CanonicalError::MaxDepthExceeded`] if
/// the tree nests deeper than [`MAX_DEPTH`].
pub fn to_canonical_value<T: Serialize + ?Sized>(value: &T) -> Result<Value, CanonicalError> {
    let tree = serde_json::to_value(value).map_err(|e| CanonicalError::NotRepresentable {
        message: e.to_string(),
    })?;
    check_depth(&tree, 0)?;
    Ok(tree)
}

/// Renders a JSON tree to its canonical byte form.
#[must_use]
pub fn canonical_bytes(value: &Value) -> Vec<u8> {
    let mut output = String::new();
    emit_value(value, &mut output);
    output.into_bytes()
}

/// Serializes a value straight to canonical bytes.
///
/// # Errors
///
/// Propagates the errors of [`to_canonical_value`].
pub fn canonical_bytes_of<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, CanonicalError> {
    Ok(canonical_bytes(&to_canonical_value(value)?))
}

/// Parses bytes into a JSON tree, rejecting duplicate keys.
///
/// Standard JSON parsers silently accept duplicate keys (last value wins),
/// which would let two different byte strings decode to the same tree. A
/// custom visitor checks keys after escape decoding so `"a"` and `"a"`
/// collide as they should.
///
/// # Errors
///
/// Returns [`CanonicalError::ParseError`] on malformed input,
/// [`CanonicalError::DuplicateKey`] on repeated object keys, and
/// [`CanonicalError::MaxDepthExceeded`] on overly deep nesting.
pub fn parse_canonical(bytes: &[u8]) -> Result<Value, CanonicalError> {
    let mut deserializer = serde_json::Deserializer::from_slice(bytes);
    let value = ValueWithDuplicateCheck::deserialize(&mut deserializer).map_err(|e| {
        let msg = e.to_string();
        if let Some(rest) = msg.strip_prefix("duplicate key: ") {
            // serde_json appends " at line X column Y"; strip it.
            let key = rest.split(" at line ").next().unwrap_or(rest).to_string();
            CanonicalError::DuplicateKey { key }
        } else {
            CanonicalError::ParseError { message: msg }
        }
    })?;
    check_depth(&value.0, 0)?;
    Ok(value.0)
}

/// Wrapper type that checks for duplicate object keys during deserialization.
struct ValueWithDuplicateCheck(Value);

impl<'de> Deserialize<'de> for ValueWithDuplicateCheck {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct ValueVisitor;

        impl<'de> Visitor<'de> for ValueVisitor {
            type Value = Value;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("any valid JSON value")
            }

            fn visit_bool<E>(self, v: bool) -> Result<Self::Value, E> {
                Ok(Value::Bool(v))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E> {
                Ok(Value::Number(v.into()))
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E> {
                Ok(Value::Number(v.into()))
            }

            fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Number::from_f64(v)
                    .map(Value::Number)
                    .ok_or_else(|| de::Error::custom("invalid float value"))
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E> {
                Ok(Value::String(v.to_owned()))
            }

            fn visit_string<E>(self, v: String) -> Result<Self::Value, E> {
                Ok(Value::String(v))
            }

            fn visit_none<E>(self) -> Result<Self::Value, E> {
                Ok(Value::Null)
            }

            fn visit_unit<E>(self) -> Result<Self::Value, E> {
                Ok(Value::Null)
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: SeqAccess<'de>,
            {
                let mut vec = Vec::new();
                while let Some(elem) = seq.next_element::<ValueWithDuplicateCheck>()? {
                    vec.push(elem.0);
                }
                Ok(Value::Array(vec))
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut seen_keys = BTreeSet::new();
                let mut obj = Map::new();

                while let Some(key) = map.next_key::<String>()? {
                    if !seen_keys.insert(key.clone()) {
                        return Err(de::Error::custom(format!("duplicate key: {key}")));
                    }
                    let value = map.next_value::<ValueWithDuplicateCheck>()?;
                    obj.insert(key, value.0);
                }
                Ok(Value::Object(obj))
            }
        }

        deserializer
            .deserialize_any(ValueVisitor)
            .map(ValueWithDuplicateCheck)
    }
}

/// Recursively checks the nesting depth of a JSON tree.
fn check_depth(value: &Value, depth: usize) -> Result<(), CanonicalError> {
    if depth > MAX_DEPTH {
        return Err(CanonicalError::MaxDepthExceeded);
    }
    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => Ok(()),
        Value::Array(arr) => {
            for item in arr {
                check_depth(item, depth + 1)?;
            }
            Ok(())
        },
        Value::Object(obj) => {
            for val in obj.values() {
                check_depth(val, depth + 1)?;
            }
            Ok(())
        },
    }
}

/// Emits a JSON value in canonical form.
fn emit_value(value: &Value, output: &mut String) {
    match value {
        Value::Null => output.push_str("null"),
        Value::Bool(b) => output.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => emit_number(n, output),
        Value::String(s) => emit_string(s, output),
        Value::Array(arr) => emit_array(arr, output),
        Value::Object(obj) => emit_object(obj, output),
    }
}

/// Emits a number in canonical form.
///
/// Integers render as plain decimals. Floats go through `serde_json`'s
/// shortest-round-trip formatter, which is a pure function of the `f64` bit
/// pattern.
fn emit_number(n: &Number, output: &mut String) {
    if let Some(i) = n.as_i64() {
        let _ = write!(output, "{i}");
    } else if let Some(u) = n.as_u64() {
        let _ = write!(output, "{u}");
    } else {
        let _ = write!(output, "{n}");
    }
}

/// Emits a string with minimal escaping.
///
/// Only the quotation mark, reverse solidus, and control characters U+0000
/// through U+001F are escaped. Control characters use the short escapes where
/// JSON defines them and `\uXXXX` otherwise.
fn emit_string(s: &str, output: &mut String) {
    output.push('"');
    for c in s.chars() {
        match c {
            '"' => output.push_str("\\\""),
            '\\' => output.push_str("\\\\"),
            '\u{0008}' => output.push_str("\\b"),
            '\u{000C}' => output.push_str("\\f"),
            '\n' => output.push_str("\\n"),
            '\r' => output.push_str("\\r"),
            '\t' => output.push_str("\\t"),
            c if ('\u{0000}'..='\u{001F}').contains(&c) => {
                let _ = write!(output, "\\u{:04x}", c as u32);
            },
            c => output.push(c),
        }
    }
    output.push('"');
}

/// Emits an array in canonical form; element order is preserved.
fn emit_array(arr: &[Value], output: &mut String) {
    output.push('[');
    for (i, item) in arr.iter().enumerate() {
        if i > 0 {
            output.push(',');
        }
        emit_value(item, output);
    }
    output.push(']');
}

/// Emits an object in canonical form with sorted keys.
fn emit_object(obj: &Map<String, Value>, output: &mut String) {
    let mut sorted_keys: Vec<&String> = obj.keys().collect();
    sorted_keys.sort();

    output.push('{');
    for (i, key) in sorted_keys.iter().enumerate() {
        if i > 0 {
            output.push(',');
        }
        emit_string(key, output);
        output.push(':');
        emit_value(&obj[*key], output);
    }
    output.push('}');
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canonical_str<T: Serialize>(value: &T) -> String {
        String::from_utf8(canonical_bytes_of(value).unwrap()).unwrap()
    }

    #[test]
    fn sorts_object_keys() {
        let value = serde_json::json!({"z": 1, "a": 2, "m": 3});
        assert_eq!(canonical_str(&value), r#"{"a":2,"m":3,"z":1}"#);
    }

    #[test]
    fn sorts_nested_keys() {
        let value = serde_json::json!({"outer": {"z": 1, "a": 2}});
        assert_eq!(canonical_str(&value), r#"{"outer":{"a":2,"z":1}}"#);
    }

    #[test]
    fn preserves_array_order() {
        let value = serde_json::json!([3, 1, 2]);
        assert_eq!(canonical_str(&value), "[3,1,2]");
    }

    #[test]
    fn minimal_string_escaping() {
        let value = serde_json::json!({"s": "a\"b\\c\nd\u{0001}e\u{007f}"});
        assert_eq!(canonical_str(&value), "{\"s\":\"a\\\"b\\\\c\\nd\\u0001e\u{007f}\"}");
    }

    #[test]
    fn float_rendering_is_shortest_round_trip() {
        assert_eq!(canonical_str(&serde_json::json!(0.1)), "0.1");
        assert_eq!(canonical_str(&serde_json::json!(1.0)), "1.0");
    }

    #[test]
    fn nan_is_not_representable() {
        let err = canonical_bytes_of(&f64::NAN).unwrap_err();
        assert!(matches!(err, CanonicalError::NotRepresentable { .. }));
    }

    #[test]
    fn parse_rejects_duplicate_keys() {
        let err = parse_canonical(br#"{"a": 1, "a": 2}"#).unwrap_err();
        assert_eq!(
            err,
            CanonicalError::DuplicateKey {
                key: "a".to_string()
            }
        );
    }

    #[test]
    fn parse_rejects_escaped_duplicate_keys() {
        // "\u0061" decodes to "a"; duplicates are detected on decoded keys.
        let err = parse_canonical(br#"{"\u0061": 1, "a": 2}"#).unwrap_err();
        assert_eq!(
            err,
            CanonicalError::DuplicateKey {
                key: "a".to_string()
            }
        );
    }

    #[test]
    fn parse_rejects_malformed_input() {
        let err = parse_canonical(b"{nope").unwrap_err();
        assert!(matches!(err, CanonicalError::ParseError { .. }));
    }

    #[test]
    fn deep_nesting_is_rejected() {
        let mut json = String::new();
        for _ in 0..=MAX_DEPTH {
            json.push('[');
        }
        json.push('1');
        for _ in 0..=MAX_DEPTH {
            json.push(']');
        }
        let err = parse_canonical(json.as_bytes()).unwrap_err();
        assert_eq!(err, CanonicalError::MaxDepthExceeded);
    }

    #[test]
    fn emit_parse_round_trip() {
        let value = serde_json::json!({
            "b": [1, 2, {"y": null, "x": true}],
            "a": "text",
        });
        let bytes = canonical_bytes_of(&value).unwrap();
        let reparsed = parse_canonical(&bytes).unwrap();
        assert_eq!(canonical_bytes(&reparsed), bytes);
    }
}
