//! The call-resolution and memoization engine.
//!
//! `resolve` drives a call toward a result:
//!
//! 1. Resolve every input recursively (per-input resolution is ordered;
//!    sibling order is not observable).
//! 2. Digest the ordered vector of input output-digests.
//! 3. Resolve the version, executing a version call if necessary.
//! 4. Probe the memoization index. A hit reconstructs the result with the
//!    stored build context and a digest-only output — the function is not
//!    invoked.
//! 5. On a miss, materialize the input values, invoke the function, and
//!    wrap the output.
//! 6. Record everything through the tracker, memo entry last.
//!
//! Deflation and inflation also live here: deflate saves a node and
//! returns the stub wrapping its record; inflate loads the record back
//! into a full node, which requires the function registry.
//!
//! Transformations obey the no-copy rule: resolving the inputs of a call
//! whose inputs are all resolved returns the original allocation.

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use crate::build_info::BuildInfoBrief;
use crate::codec::Payload;
use crate::digest::Digest;
use crate::function::FunctionError;
use crate::graph::{
    AnyValueWithProvenance, CallNode, DeflatedCallNode, DeflatedResultNode,
    FunctionCallResultWithProvenance, FunctionCallResultWithProvenanceDeflated,
    FunctionCallWithProvenance, FunctionCallWithProvenanceDeflated, GraphError, ResultNode,
    UnknownResolvedNode, VirtualValue,
};
use crate::record::load::{self, LoadError};
use crate::record::save::{self, SaveError};
use crate::record::{self, CallRecordWithoutInputs, RecordError};
use crate::registry::FunctionRegistry;
use crate::tracker::{ResultTracker, TrackerError};
use crate::version::Version;

/// Errors surfaced by resolution.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ResolveError {
    /// Recording the result failed.
    #[error(transparent)]
    Save(#[from] SaveError),

    /// A tracker operation failed.
    #[error(transparent)]
    Tracker(#[from] TrackerError),

    /// The graph is malformed.
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Record encoding failed.
    #[error(transparent)]
    Record(#[from] RecordError),

    /// The user function reported a failure.
    #[error("function '{function_name}' failed")]
    Function {
        /// The failing function.
        function_name: String,
        /// The reported failure.
        #[source]
        source: FunctionError,
    },

    /// A deflated call cannot be resolved directly; inflate it first.
    #[error("call '{function_name}' is deflated; inflate it before resolving")]
    DeflatedCall {
        /// The function named by the stub.
        function_name: String,
    },
}

/// A node known to be in resolved form.
enum ResolvedNode {
    Leaf(Arc<UnknownResolvedNode>),
    Result(Arc<ResultNode>),
    Stored(Arc<DeflatedResultNode>),
}

impl ResolvedNode {
    fn output_digest(&self) -> Digest {
        match self {
            Self::Leaf(node) => node.output_digest(),
            Self::Result(node) => node.output_digest(),
            Self::Stored(node) => node.output_digest().clone(),
        }
    }

    fn erase(&self) -> AnyValueWithProvenance {
        match self {
            Self::Leaf(node) => AnyValueWithProvenance::UnknownResolved(Arc::clone(node)),
            Self::Result(node) => AnyValueWithProvenance::Result(Arc::clone(node)),
            Self::Stored(node) => AnyValueWithProvenance::DeflatedResult(Arc::clone(node)),
        }
    }

    fn materialize(&self, tracker: &dyn ResultTracker) -> Result<Value, TrackerError> {
        match self {
            Self::Leaf(node) => node.leaf().value().materialize(tracker),
            Self::Result(node) => node.output().materialize(tracker),
            Self::Stored(node) => {
                VirtualValue::from_digest(node.output_digest().clone()).materialize(tracker)
            },
        }
    }
}

/// Resolves any node to its resolved form.
///
/// Already-resolved nodes come back as the same allocation.
///
/// # Errors
///
/// Returns [`ResolveError::DeflatedCall`] for deflated calls and
/// propagates execution and tracker failures for calls.
pub fn resolve_any(
    node: &AnyValueWithProvenance,
    tracker: &dyn ResultTracker,
) -> Result<AnyValueWithProvenance, ResolveError> {
    Ok(resolve_node(node, tracker)?.erase())
}

fn resolve_node(
    node: &AnyValueWithProvenance,
    tracker: &dyn ResultTracker,
) -> Result<ResolvedNode, ResolveError> {
    match node {
        AnyValueWithProvenance::Unknown(leaf) => Ok(ResolvedNode::Leaf(Arc::new(
            UnknownResolvedNode::new(Arc::clone(leaf)),
        ))),
        AnyValueWithProvenance::UnknownResolved(resolved) => {
            Ok(ResolvedNode::Leaf(Arc::clone(resolved)))
        },
        AnyValueWithProvenance::Result(result) => Ok(ResolvedNode::Result(Arc::clone(result))),
        AnyValueWithProvenance::DeflatedResult(stored) => {
            Ok(ResolvedNode::Stored(Arc::clone(stored)))
        },
        AnyValueWithProvenance::Call(call) => {
            Ok(ResolvedNode::Result(resolve_call_node(call, tracker)?))
        },
        AnyValueWithProvenance::DeflatedCall(stub) => Err(ResolveError::DeflatedCall {
            function_name: stub.record().function_name.clone(),
        }),
    }
}

/// Resolves a call node to a result node.
pub(crate) fn resolve_call_node(
    call: &Arc<CallNode>,
    tracker: &dyn ResultTracker,
) -> Result<Arc<ResultNode>, ResolveError> {
    let function_name = call.function().name().to_string();
    tracing::debug!(function_name = %function_name, "resolving call");

    // Inputs first; the function must never run before every input has an
    // output digest.
    let (resolved_call, resolved_inputs) = resolve_inputs_node(call, tracker)?;
    let input_digests: Vec<Digest> = resolved_inputs
        .iter()
        .map(ResolvedNode::output_digest)
        .collect();
    let input_group_digest = record::input_group_digest(&input_digests)?;

    let version = resolve_version(&resolved_call, tracker)?;

    if let Some(stored) = tracker.find_result(&function_name, &version, &input_group_digest)? {
        let result = Arc::new(ResultNode::new(
            Arc::clone(&resolved_call),
            version,
            input_group_digest,
            VirtualValue::from_digest(stored.output_digest.clone()),
            BuildInfoBrief::new(stored.commit_id, stored.build_id),
        ));
        return Ok(result);
    }

    // Miss: materialize inputs and execute.
    let mut input_values = Vec::with_capacity(resolved_inputs.len());
    for input in &resolved_inputs {
        input_values.push(input.materialize(tracker)?);
    }
    let output = resolved_call
        .function()
        .run(&input_values, &version)
        .map_err(|source| ResolveError::Function {
            function_name: function_name.clone(),
            source,
        })?;
    tracing::info!(
        function_name = %function_name,
        function_version = %version,
        "executed function"
    );

    let result = Arc::new(ResultNode::new(
        Arc::clone(&resolved_call),
        version,
        input_group_digest,
        VirtualValue::of(output),
        tracker.current_build_info().brief(),
    ));
    save::save_result(&result, tracker)?;
    Ok(result)
}

/// Resolves every input of a call, preserving allocation identity when
/// nothing changes.
fn resolve_inputs_node(
    call: &Arc<CallNode>,
    tracker: &dyn ResultTracker,
) -> Result<(Arc<CallNode>, Vec<ResolvedNode>), ResolveError> {
    let mut resolved = Vec::with_capacity(call.inputs().len());
    let mut unchanged = true;
    for input in call.inputs() {
        let node = resolve_node(input, tracker)?;
        if !node.erase().ptr_eq(input) {
            unchanged = false;
        }
        resolved.push(node);
    }

    if unchanged {
        return Ok((Arc::clone(call), resolved));
    }
    let inputs = resolved.iter().map(ResolvedNode::erase).collect();
    let node = CallNode::new(
        Arc::clone(call.function()),
        call.version().clone(),
        inputs,
    )?;
    Ok((Arc::new(node), resolved))
}

/// Resolves the call's version to a concrete value, executing a version
/// call when necessary.
fn resolve_version(
    call: &Arc<CallNode>,
    tracker: &dyn ResultTracker,
) -> Result<Version, ResolveError> {
    if let Some(version) = call.version_value_local() {
        return Ok(version);
    }
    let resolved = resolve_node(call.version(), tracker)?;
    let tree = resolved.materialize(tracker)?;
    serde_json::from_value(tree).map_err(|e| {
        ResolveError::Record(RecordError::Malformed {
            message: format!("version payload does not decode: {e}"),
        })
    })
}

/// Loads a stored call as a typed deflated stub, without expanding its
/// inputs.
///
/// # Errors
///
/// Returns [`GraphError::ClassMismatch`] when the record's output class is
/// not `T`'s, and propagates tracker failures.
pub fn load_call_by_id<T: Payload>(
    digest: &Digest,
    tracker: &dyn ResultTracker,
) -> Result<Option<FunctionCallWithProvenanceDeflated<T>>, LoadError> {
    let Some(record) = tracker.load_call_record(digest)? else {
        return Ok(None);
    };
    let codec = crate::codec::Codec::<T>::resolve()?;
    if codec.class_name() != &record.output_class_name {
        return Err(GraphError::ClassMismatch {
            found: record.output_class_name.clone(),
            requested: codec.class_name().clone(),
        }
        .into());
    }
    let stub = CallRecordWithoutInputs {
        function_name: record.function_name,
        function_version: record.function_version,
        output_class_name: record.output_class_name,
        digest_of_equivalent_with_inputs: digest.clone(),
    };
    Ok(Some(FunctionCallWithProvenanceDeflated::from_node(Arc::new(
        DeflatedCallNode::new(stub),
    ))))
}

impl<T: Payload> FunctionCallWithProvenance<T> {
    /// Resolves this call, reusing a memoized result when one exists.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] on execution, recording, or storage
    /// failure.
    pub fn resolve(
        &self,
        tracker: &dyn ResultTracker,
    ) -> Result<FunctionCallResultWithProvenance<T>, ResolveError> {
        let node = resolve_call_node(self.node(), tracker)?;
        Ok(FunctionCallResultWithProvenance::from_node(node))
    }

    /// Resolves every input, returning `self` unchanged (same allocation)
    /// when all inputs are already resolved.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] when an input fails to resolve.
    pub fn resolve_inputs(&self, tracker: &dyn ResultTracker) -> Result<Self, ResolveError> {
        let (node, _) = resolve_inputs_node(self.node(), tracker)?;
        Ok(Self::from_node(node))
    }

    /// Saves the call graph and returns the digest of its record.
    ///
    /// # Errors
    ///
    /// Returns [`SaveError::UnresolvedVersion`] when the version is an
    /// unresolved call.
    pub fn save(&self, tracker: &dyn ResultTracker) -> Result<Digest, SaveError> {
        let (_, digest) = save::save_call(self.node(), tracker)?;
        Ok(digest)
    }

    /// Saves the call and replaces it with the stub wrapping its record.
    ///
    /// # Errors
    ///
    /// As [`FunctionCallWithProvenance::save`].
    pub fn deflate(
        &self,
        tracker: &dyn ResultTracker,
    ) -> Result<FunctionCallWithProvenanceDeflated<T>, SaveError> {
        let (record, digest) = save::save_call(self.node(), tracker)?;
        let stub = CallRecordWithoutInputs {
            function_name: record.function_name,
            function_version: record.function_version,
            output_class_name: record.output_class_name,
            digest_of_equivalent_with_inputs: digest,
        };
        Ok(FunctionCallWithProvenanceDeflated::from_node(Arc::new(
            DeflatedCallNode::new(stub),
        )))
    }
}

impl<T: Payload> FunctionCallWithProvenanceDeflated<T> {
    /// Loads the full call back from the store.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::MissingRecord`] when the record is absent,
    /// `UnknownFunction` when the function is not registered, and
    /// `ClassNotFound` when the output class is not linked in.
    pub fn inflate(
        &self,
        tracker: &dyn ResultTracker,
        registry: &FunctionRegistry,
    ) -> Result<FunctionCallWithProvenance<T>, LoadError> {
        let digest = &self.record().digest_of_equivalent_with_inputs;
        let record = tracker
            .load_call_record(digest)?
            .ok_or_else(|| LoadError::MissingRecord {
                digest: digest.clone(),
            })?;
        let node = load::load_call(&record, registry)?;
        Ok(FunctionCallWithProvenance::from_node(node))
    }
}

impl<T: Payload> FunctionCallResultWithProvenance<T> {
    /// Saves the result and replaces it with the stub wrapping its record.
    ///
    /// # Errors
    ///
    /// Propagates [`SaveError`] from the underlying save.
    pub fn deflate(
        &self,
        tracker: &dyn ResultTracker,
    ) -> Result<FunctionCallResultWithProvenanceDeflated<T>, SaveError> {
        let (record, _) = save::save_result(self.node(), tracker)?;
        Ok(FunctionCallResultWithProvenanceDeflated::from_node(
            Arc::new(DeflatedResultNode::Known(record)),
        ))
    }
}

impl<T: Payload> FunctionCallResultWithProvenanceDeflated<T> {
    /// Loads the full result back from the store.
    ///
    /// # Errors
    ///
    /// As [`FunctionCallWithProvenanceDeflated::inflate`]; a stub wrapping
    /// an unknown-provenance record is reported as malformed.
    pub fn inflate(
        &self,
        tracker: &dyn ResultTracker,
        registry: &FunctionRegistry,
    ) -> Result<FunctionCallResultWithProvenance<T>, LoadError> {
        match self.node().as_ref() {
            DeflatedResultNode::Known(record) => {
                let node = load::load_result(record, registry, tracker)?;
                Ok(FunctionCallResultWithProvenance::from_node(node))
            },
            DeflatedResultNode::Unknown(record) => Err(LoadError::Record(RecordError::Malformed {
                message: format!(
                    "record for '{}' is an unknown-provenance result, not a call result",
                    record.call.output_class_name
                ),
            })),
        }
    }
}
