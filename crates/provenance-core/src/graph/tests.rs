use super::*;
use crate::codec::ClassName;
use crate::digest::Digest;
use crate::function::{FunctionError, FunctionSpec};
use crate::version::Version;

fn add_spec() -> FunctionSpec {
    FunctionSpec::builder("add")
        .input::<i64>()
        .input::<i64>()
        .output::<i64>()
        .run(|inputs, _| {
            let a = inputs[0]
                .as_i64()
                .ok_or_else(|| FunctionError::new("bad input"))?;
            let b = inputs[1]
                .as_i64()
                .ok_or_else(|| FunctionError::new("bad input"))?;
            Ok(serde_json::json!(a + b))
        })
        .build()
        .unwrap()
}

#[test]
fn leaf_digest_matches_canonical_bytes() {
    let leaf = UnknownProvenance::new(&2_i64).unwrap();
    assert_eq!(leaf.value_digest(), Digest::of_bytes(b"2"));
    assert_eq!(leaf.class_name().as_str(), "i64");
}

#[test]
fn leaf_resolution_is_trivial() {
    let leaf = UnknownProvenance::new(&2_i64).unwrap();
    let resolved = leaf.resolve();
    assert_eq!(resolved.output_digest(), leaf.value_digest());
}

#[test]
fn track_builds_a_call() {
    let two = UnknownProvenance::new(&2_i64).unwrap();
    let three = UnknownProvenance::new(&3_i64).unwrap();
    let call = add_spec()
        .track::<i64>(Version::new("1.0"), vec![two.erase(), three.erase()])
        .unwrap();
    assert_eq!(call.function().name(), "add");
    assert_eq!(call.inputs().len(), 2);
    assert_eq!(call.node().output_class_name().as_str(), "i64");
    assert!(call.node().version_is_resolved());
    assert_eq!(call.node().version_value_local(), Some(Version::new("1.0")));
}

#[test]
fn track_rejects_wrong_arity() {
    let two = UnknownProvenance::new(&2_i64).unwrap();
    let err = add_spec()
        .track::<i64>(Version::new("1.0"), vec![two.erase()])
        .unwrap_err();
    assert!(matches!(
        err,
        GraphError::ArityMismatch {
            declared: 2,
            supplied: 1,
            ..
        }
    ));
}

#[test]
fn track_rejects_wrong_input_class() {
    let two = UnknownProvenance::new(&2_i64).unwrap();
    let text = UnknownProvenance::new(&"three".to_string()).unwrap();
    let err = add_spec()
        .track::<i64>(Version::new("1.0"), vec![two.erase(), text.erase()])
        .unwrap_err();
    assert!(matches!(err, GraphError::InputClassMismatch { index: 1, .. }));
}

#[test]
fn track_rejects_wrong_output_type() {
    let two = UnknownProvenance::new(&2_i64).unwrap();
    let three = UnknownProvenance::new(&3_i64).unwrap();
    let err = add_spec()
        .track::<String>(Version::new("1.0"), vec![two.erase(), three.erase()])
        .unwrap_err();
    assert!(matches!(err, GraphError::ClassMismatch { .. }));
}

#[test]
fn track_with_rejects_non_version_node() {
    let two = UnknownProvenance::new(&2_i64).unwrap();
    let three = UnknownProvenance::new(&3_i64).unwrap();
    let not_a_version = UnknownProvenance::new(&1_i64).unwrap();
    let err = add_spec()
        .track_with::<i64>(not_a_version.erase(), vec![two.erase(), three.erase()])
        .unwrap_err();
    assert!(matches!(err, GraphError::NotAVersion { .. }));
}

#[test]
fn erase_preserves_allocation_identity() {
    let leaf = UnknownProvenance::new(&2_i64).unwrap();
    assert!(leaf.erase().ptr_eq(&leaf.erase()));

    let other = UnknownProvenance::new(&2_i64).unwrap();
    assert!(!leaf.erase().ptr_eq(&other.erase()));
}

#[test]
fn retype_round_trip() {
    let leaf = UnknownProvenance::new(&2_i64).unwrap();
    let typed = ValueWithProvenance::<i64>::from_any(leaf.erase()).unwrap();
    assert!(matches!(typed, ValueWithProvenance::UnknownProvenance(_)));
    assert!(typed.erase().ptr_eq(&leaf.erase()));
}

#[test]
fn retype_rejects_wrong_class() {
    let leaf = UnknownProvenance::new(&2_i64).unwrap();
    let err = ValueWithProvenance::<String>::from_any(leaf.erase()).unwrap_err();
    assert!(matches!(
        err,
        GraphError::ClassMismatch { ref found, ref requested }
            if found == &ClassName::new("i64") && requested == &ClassName::new("String")
    ));
}

#[test]
fn resolved_nodes_report_output_digests() {
    let leaf = UnknownProvenance::new(&2_i64).unwrap();
    assert_eq!(leaf.erase().output_digest(), None);
    assert!(!leaf.erase().is_resolved());

    let resolved = leaf.resolve();
    assert!(resolved.erase().is_resolved());
    assert_eq!(
        resolved.erase().output_digest(),
        Some(Digest::of_bytes(b"2"))
    );
}

#[test]
fn nested_call_as_input() {
    let two = UnknownProvenance::new(&2_i64).unwrap();
    let three = UnknownProvenance::new(&3_i64).unwrap();
    let inner = add_spec()
        .track::<i64>(Version::new("1.0"), vec![two.erase(), three.erase()])
        .unwrap();
    let four = UnknownProvenance::new(&4_i64).unwrap();
    let outer = add_spec()
        .track::<i64>(Version::new("1.0"), vec![inner.erase(), four.erase()])
        .unwrap();
    assert!(matches!(
        outer.inputs()[0],
        AnyValueWithProvenance::Call(_)
    ));
    assert!(!outer.node().inputs()[0].is_resolved());
}
