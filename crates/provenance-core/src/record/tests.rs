use super::*;
use crate::codec::ClassName;
use crate::digest::Digest;
use crate::version::Version;

fn leaf(class: &str, seed: &[u8]) -> UnknownCallRecord {
    UnknownCallRecord {
        output_class_name: ClassName::new(class),
        value_digest: Digest::of_bytes(seed),
    }
}

fn add_call() -> CallRecordWithInputs {
    CallRecordWithInputs {
        function_name: "add".to_string(),
        function_version: Version::new("1.0"),
        output_class_name: ClassName::new("i64"),
        input_list: vec![
            ValueRecord::UnknownCall(leaf("i64", b"2")),
            ValueRecord::UnknownCall(leaf("i64", b"3")),
        ],
    }
}

#[test]
fn unknown_call_wire_shape() {
    let record = ValueRecord::UnknownCall(leaf("i64", b"2"));
    let json = serde_json::to_value(&record).unwrap();
    assert_eq!(json["_subclass"], TAG_UNKNOWN_CALL);
    assert_eq!(json["outputClassName"], "i64");
    assert!(json["valueDigest"]["id"].is_string());
}

#[test]
fn call_with_inputs_wire_shape() {
    let json = serde_json::to_value(ValueRecord::CallWithInputs(add_call())).unwrap();
    assert_eq!(json["_subclass"], TAG_CALL_WITH_INPUTS);
    assert_eq!(json["functionName"], "add");
    assert_eq!(json["functionVersion"]["id"], "1.0");
    assert_eq!(json["inputList"].as_array().unwrap().len(), 2);
}

#[test]
fn result_wire_shape() {
    let call = add_call();
    let record = ResultRecord {
        call: call.without_inputs().unwrap(),
        input_group_digest: input_group_digest(&[
            leaf("i64", b"2").value_digest,
            leaf("i64", b"3").value_digest,
        ])
        .unwrap(),
        output_digest: Digest::of_bytes(b"5"),
        commit_id: "commit-1".to_string(),
        build_id: "build-1".to_string(),
    };
    let json = serde_json::to_value(ValueRecord::Result(record)).unwrap();
    assert_eq!(json["_subclass"], TAG_RESULT);
    assert_eq!(json["commitId"], "commit-1");
    assert_eq!(json["buildId"], "build-1");
    assert_eq!(
        json["call"]["functionName"], "add",
        "the embedded call is an unexpanded stub"
    );
    assert!(json["call"]["digestOfEquivalentWithInputs"]["id"].is_string());
}

#[test]
fn decode_round_trip() {
    let record = ValueRecord::CallWithInputs(add_call());
    let bytes = record.canonical_bytes().unwrap();
    let decoded = ValueRecord::decode(&bytes).unwrap();
    assert_eq!(decoded, record);
    assert_eq!(decoded.canonical_bytes().unwrap(), bytes);
}

#[test]
fn decode_rejects_unknown_variant() {
    let bytes = br#"{"_subclass":"SomeFutureRecord","x":1}"#;
    let err = ValueRecord::decode(bytes).unwrap_err();
    assert!(
        matches!(err, RecordError::UnexpectedVariant { ref subclass } if subclass == "SomeFutureRecord")
    );
}

#[test]
fn decode_rejects_missing_discriminator() {
    let err = ValueRecord::decode(br#"{"outputClassName":"i64"}"#).unwrap_err();
    assert!(matches!(err, RecordError::MissingDiscriminator));
}

#[test]
fn decode_rejects_malformed_body() {
    let bytes = format!(r#"{{"_subclass":"{TAG_UNKNOWN_CALL}","outputClassName":7}}"#);
    let err = ValueRecord::decode(bytes.as_bytes()).unwrap_err();
    assert!(matches!(err, RecordError::Malformed { .. }));
}

#[test]
fn call_digest_is_stable_across_saves() {
    assert_eq!(add_call().digest().unwrap(), add_call().digest().unwrap());
}

#[test]
fn struct_digest_matches_enum_digest() {
    let call = add_call();
    let via_struct = call.digest().unwrap();
    let via_enum = ValueRecord::CallWithInputs(call).digest().unwrap();
    assert_eq!(via_struct, via_enum);
}

#[test]
fn stub_carries_full_form_digest() {
    let call = add_call();
    let stub = call.without_inputs().unwrap();
    assert_eq!(stub.digest_of_equivalent_with_inputs, call.digest().unwrap());
    assert_eq!(stub.function_name, call.function_name);
}

#[test]
fn input_order_changes_group_digest() {
    let a = Digest::of_bytes(b"2");
    let b = Digest::of_bytes(b"3");
    let forward = input_group_digest(&[a.clone(), b.clone()]).unwrap();
    let reversed = input_group_digest(&[b, a]).unwrap();
    assert_ne!(forward, reversed);
}

#[test]
fn empty_group_digest_is_digest_of_empty_list() {
    let empty = empty_input_group_digest().unwrap();
    assert_eq!(empty, Digest::of_bytes(b"[]"));
}

#[test]
fn version_changes_call_digest() {
    let mut newer = add_call();
    newer.function_version = Version::new("1.1");
    assert_ne!(add_call().digest().unwrap(), newer.digest().unwrap());
}

#[test]
fn input_order_changes_call_digest() {
    let mut swapped = add_call();
    swapped.input_list.reverse();
    assert_ne!(add_call().digest().unwrap(), swapped.digest().unwrap());
}
