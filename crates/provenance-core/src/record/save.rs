//! Depth-first save of graph nodes into records.
//!
//! Saving a call writes its WithInputs record and, transitively, everything
//! it references: value blobs for leaves, WithInputs records for nested
//! calls, and result records (plus memo entries) for inputs that are
//! already resolved.
//!
//! Input lists always carry the *call view* of each input — a leaf record
//! or an unexpanded stub — never a result form. Result records carry build
//! context, and embedding them would make a call's digest depend on which
//! build happened to resolve its inputs; the call's identity must depend
//! only on `(functionName, functionVersion, outputClassName, inputs)`.

use std::sync::Arc;

use thiserror::Error;

use super::{
    CallRecordWithInputs, CallRecordWithoutInputs, RecordError, ResultRecord, UnknownCallRecord,
    UnknownResultRecord, ValueRecord,
};
use crate::canonical;
use crate::digest::Digest;
use crate::graph::{
    AnyValueWithProvenance, CallNode, DeflatedResultNode, GraphError, ResultNode, UnknownNode,
    UnknownResolvedNode,
};
use crate::tracker::{ResultTracker, ResultTrackerExt as _, TrackerError};
use crate::version::Version;

/// Errors raised while saving graph nodes.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SaveError {
    /// The call's version is itself an unresolved call.
    ///
    /// Both record forms need a concrete `functionVersion`, so the save
    /// fails until the version call has been resolved.
    #[error("version of '{function_name}' is an unresolved call; resolve it before saving")]
    UnresolvedVersion {
        /// The function whose version is unresolved.
        function_name: String,
    },

    /// A tracker operation failed.
    #[error(transparent)]
    Tracker(#[from] TrackerError),

    /// Record encoding failed.
    #[error(transparent)]
    Record(#[from] RecordError),

    /// The graph node itself is malformed.
    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Saves a call graph depth-first and returns its WithInputs record with
/// the record digest.
///
/// # Errors
///
/// Returns [`SaveError::UnresolvedVersion`] when the call's version is an
/// unresolved call, and propagates tracker and encoding failures.
pub fn save_call(
    node: &Arc<CallNode>,
    tracker: &dyn ResultTracker,
) -> Result<(CallRecordWithInputs, Digest), SaveError> {
    let version = resolved_version(node, tracker)?;

    let mut input_list = Vec::with_capacity(node.inputs().len());
    for input in node.inputs() {
        input_list.push(input_call_form(input, tracker)?);
    }

    let record = CallRecordWithInputs {
        function_name: node.function().name().to_string(),
        function_version: version,
        output_class_name: node.output_class_name().clone(),
        input_list,
    };
    let digest = tracker.save_call_record(&record)?;
    tracing::debug!(
        function_name = %record.function_name,
        digest = %digest,
        "saved call graph"
    );
    Ok((record, digest))
}

/// Saves a result node and everything it references, memo entry last.
///
/// # Errors
///
/// Propagates [`SaveError`] from the call save and the tracker.
pub fn save_result(
    node: &Arc<ResultNode>,
    tracker: &dyn ResultTracker,
) -> Result<(ResultRecord, Digest), SaveError> {
    // Output blob first, so the digest in the record always resolves.
    if let Some(value) = node.output().value() {
        let bytes = canonical::canonical_bytes(value);
        tracker.save_value_bytes(node.call().output_class_name(), &bytes)?;
    }

    // Make the referenced build resolvable under builds/<buildId>.
    if *node.build() == tracker.current_build_info().brief() {
        tracker.save_build_info()?;
    }

    let (_, call_digest) = save_call(node.call(), tracker)?;
    let record = ResultRecord {
        call: CallRecordWithoutInputs {
            function_name: node.call().function().name().to_string(),
            function_version: node.resolved_version().clone(),
            output_class_name: node.call().output_class_name().clone(),
            digest_of_equivalent_with_inputs: call_digest,
        },
        input_group_digest: node.input_group_digest().clone(),
        output_digest: node.output_digest(),
        commit_id: node.build().commit_id.clone(),
        build_id: node.build().build_id.clone(),
    };
    let digest = tracker.save_result_record(&record)?;
    Ok((record, digest))
}

/// Saves a resolved leaf as its trivial result record.
///
/// # Errors
///
/// Propagates tracker failures.
pub fn save_leaf_result(
    node: &Arc<UnknownResolvedNode>,
    tracker: &dyn ResultTracker,
) -> Result<(UnknownResultRecord, Digest), SaveError> {
    let leaf_record = save_leaf(node.leaf(), tracker)?;
    let build = tracker.current_build_info().brief();
    let record = UnknownResultRecord {
        output_digest: leaf_record.value_digest.clone(),
        call: leaf_record,
        commit_id: build.commit_id,
        build_id: build.build_id,
    };
    let digest = tracker.save_unknown_result_record(&record)?;
    Ok((record, digest))
}

/// Saves a leaf's value blob (when held concretely) and returns its record.
fn save_leaf(
    node: &Arc<UnknownNode>,
    tracker: &dyn ResultTracker,
) -> Result<UnknownCallRecord, SaveError> {
    if let Some(value) = node.value().value() {
        let bytes = canonical::canonical_bytes(value);
        tracker.save_value_bytes(node.class_name(), &bytes)?;
    }
    Ok(UnknownCallRecord {
        output_class_name: node.class_name().clone(),
        value_digest: node.value_digest(),
    })
}

/// Converts one input node into the record embedded in a call's input list,
/// saving referenced data transitively.
fn input_call_form(
    input: &AnyValueWithProvenance,
    tracker: &dyn ResultTracker,
) -> Result<ValueRecord, SaveError> {
    match input {
        AnyValueWithProvenance::Unknown(leaf) => {
            Ok(ValueRecord::UnknownCall(save_leaf(leaf, tracker)?))
        },
        AnyValueWithProvenance::UnknownResolved(resolved) => {
            let (record, _) = save_leaf_result(resolved, tracker)?;
            Ok(ValueRecord::UnknownCall(record.call))
        },
        AnyValueWithProvenance::Call(call) => {
            let (record, digest) = save_call(call, tracker)?;
            Ok(ValueRecord::CallWithoutInputs(CallRecordWithoutInputs {
                function_name: record.function_name,
                function_version: record.function_version,
                output_class_name: record.output_class_name,
                digest_of_equivalent_with_inputs: digest,
            }))
        },
        AnyValueWithProvenance::Result(result) => {
            let (record, _) = save_result(result, tracker)?;
            Ok(ValueRecord::CallWithoutInputs(record.call))
        },
        AnyValueWithProvenance::DeflatedCall(deflated) => {
            Ok(ValueRecord::CallWithoutInputs(deflated.record().clone()))
        },
        AnyValueWithProvenance::DeflatedResult(deflated) => match deflated.as_ref() {
            DeflatedResultNode::Known(record) => {
                Ok(ValueRecord::CallWithoutInputs(record.call.clone()))
            },
            DeflatedResultNode::Unknown(record) => {
                Ok(ValueRecord::UnknownCall(record.call.clone()))
            },
        },
    }
}

/// The concrete version a call will be recorded at.
///
/// A version node counts as resolved when it is a leaf or a computed
/// result; the value is materialized through the tracker when only a digest
/// is in memory.
fn resolved_version(
    node: &Arc<CallNode>,
    tracker: &dyn ResultTracker,
) -> Result<Version, SaveError> {
    if !node.version_is_resolved() {
        return Err(SaveError::UnresolvedVersion {
            function_name: node.function().name().to_string(),
        });
    }
    if let Some(version) = node.version_value_local() {
        return Ok(version);
    }
    let digest = match node.version() {
        AnyValueWithProvenance::Unknown(leaf) => leaf.value_digest(),
        other => other.output_digest().ok_or_else(|| SaveError::UnresolvedVersion {
            function_name: node.function().name().to_string(),
        })?,
    };
    Ok(tracker.load_value::<Version>(&digest)?)
}
