//! Rebuilding graph nodes from stored records.
//!
//! Loading is registry-driven: a call record names its function, the
//! [`FunctionRegistry`] supplies the function object, and the node is
//! rebuilt with the spec's declared classes validated against the record.
//! Nested records come back as deflated stubs and digest-only leaves — the
//! subtree re-hydrates on demand, one inflation at a time.
//!
//! A record whose `outputClassName` is not registered in this process can
//! still be transported and re-stored; only the typed rebuild fails, with
//! [`CodecError::ClassNotFound`].

use std::sync::Arc;

use thiserror::Error;

use super::{CallRecordWithInputs, RecordError, ResultRecord, ValueRecord};
use crate::build_info::BuildInfoBrief;
use crate::codec::{self, CodecError};
use crate::digest::Digest;
use crate::graph::{
    AnyValueWithProvenance, CallNode, DeflatedCallNode, DeflatedResultNode, GraphError,
    ResultNode, UnknownNode, UnknownProvenance, VirtualValue,
};
use crate::registry::{FunctionRegistry, RegistryError};
use crate::tracker::{ResultTracker, TrackerError};

/// Errors raised while rebuilding nodes from records.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LoadError {
    /// The record names a function this process does not hold.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The record names a payload class this process does not hold.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// A tracker operation failed.
    #[error(transparent)]
    Tracker(#[from] TrackerError),

    /// The record is malformed.
    #[error(transparent)]
    Record(#[from] RecordError),

    /// The rebuilt node failed graph validation.
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// A referenced record is absent from the store.
    #[error("no record stored under digest {digest}")]
    MissingRecord {
        /// The dangling digest.
        digest: Digest,
    },
}

/// Rebuilds a call node from its WithInputs record.
///
/// # Errors
///
/// Returns [`RegistryError::UnknownFunction`] when the function is not
/// registered, [`CodecError::ClassNotFound`] when the output class is not
/// linked into this process, and [`GraphError`] when the record disagrees
/// with the function's declared shape.
pub fn load_call(
    record: &CallRecordWithInputs,
    registry: &FunctionRegistry,
) -> Result<Arc<CallNode>, LoadError> {
    let function = registry.get(&record.function_name)?;
    if !codec::is_registered(record.output_class_name.as_str()) {
        return Err(CodecError::ClassNotFound {
            class_name: record.output_class_name.to_string(),
        }
        .into());
    }

    let version = UnknownProvenance::new(&record.function_version)?.erase();

    let mut inputs = Vec::with_capacity(record.input_list.len());
    for input in &record.input_list {
        inputs.push(load_input(input, registry)?);
    }

    let node = CallNode::new(function, version, inputs)?;
    Ok(Arc::new(node))
}

/// Rebuilds a result node from its record, loading the full call form.
///
/// # Errors
///
/// As [`load_call`], plus [`LoadError::MissingRecord`] when the call record
/// the result points at is absent.
pub fn load_result(
    record: &ResultRecord,
    registry: &FunctionRegistry,
    tracker: &dyn ResultTracker,
) -> Result<Arc<ResultNode>, LoadError> {
    let call_digest = &record.call.digest_of_equivalent_with_inputs;
    let call_record =
        tracker
            .load_call_record(call_digest)?
            .ok_or_else(|| LoadError::MissingRecord {
                digest: call_digest.clone(),
            })?;
    let call = load_call(&call_record, registry)?;
    Ok(Arc::new(ResultNode::new(
        call,
        record.call.function_version.clone(),
        record.input_group_digest.clone(),
        VirtualValue::from_digest(record.output_digest.clone()),
        BuildInfoBrief::new(record.commit_id.clone(), record.build_id.clone()),
    )))
}

/// Rebuilds one input-list entry as a graph node.
///
/// Leaves come back digest-only; nested calls and results come back as
/// deflated stubs. Nothing here touches the store.
fn load_input(
    record: &ValueRecord,
    registry: &FunctionRegistry,
) -> Result<AnyValueWithProvenance, LoadError> {
    match record {
        ValueRecord::UnknownCall(leaf) => {
            Ok(AnyValueWithProvenance::Unknown(Arc::new(
                UnknownNode::from_digest(
                    leaf.output_class_name.clone(),
                    leaf.value_digest.clone(),
                ),
            )))
        },
        ValueRecord::CallWithoutInputs(stub) => Ok(AnyValueWithProvenance::DeflatedCall(
            Arc::new(DeflatedCallNode::new(stub.clone())),
        )),
        ValueRecord::CallWithInputs(call) => {
            let node = load_call(call, registry)?;
            Ok(AnyValueWithProvenance::Call(node))
        },
        ValueRecord::Result(result) => Ok(AnyValueWithProvenance::DeflatedResult(Arc::new(
            DeflatedResultNode::Known(result.clone()),
        ))),
        ValueRecord::UnknownResult(result) => Ok(AnyValueWithProvenance::DeflatedResult(
            Arc::new(DeflatedResultNode::Unknown(result.clone())),
        )),
    }
}
