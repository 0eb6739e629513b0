//! Phantom-typed wrappers over the erased nodes.
//!
//! Application code works with these: the payload type rides along as a
//! phantom parameter, erasing is an `Arc` clone, and re-typing checks the
//! node's class name against the requested type's codec. The six variants
//! mirror the record shapes one-to-one.

use std::marker::PhantomData;
use std::sync::Arc;

use super::node::{
    AnyValueWithProvenance, CallNode, DeflatedCallNode, DeflatedResultNode, GraphError,
    ResultNode, UnknownNode, UnknownResolvedNode,
};
use super::virtual_value::VirtualValue;
use crate::build_info::BuildInfoBrief;
use crate::codec::{ClassName, Codec, Payload};
use crate::digest::Digest;
use crate::function::FunctionSpec;
use crate::record::RecordError;
use crate::tracker::{ResultTracker, TrackerError};
use crate::version::Version;

/// Decodes a canonical JSON tree as `T`, mapping failures onto a record
/// error.
fn decode_payload<T: Payload>(
    class_name: &ClassName,
    value: serde_json::Value,
) -> Result<T, TrackerError> {
    serde_json::from_value(value).map_err(|e| {
        TrackerError::Record(RecordError::Malformed {
            message: format!("stored '{class_name}' payload does not decode: {e}"),
        })
    })
}

/// Checks that `T`'s registered class matches the node's output class.
fn check_class<T: Payload>(found: &ClassName) -> Result<(), GraphError> {
    let codec = Codec::<T>::resolve()?;
    if codec.class_name() != found {
        return Err(GraphError::ClassMismatch {
            found: found.clone(),
            requested: codec.class_name().clone(),
        });
    }
    Ok(())
}

/// A raw value wrapped as a graph leaf.
#[derive(Debug)]
pub struct UnknownProvenance<T> {
    pub(crate) node: Arc<UnknownNode>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for UnknownProvenance<T> {
    fn clone(&self) -> Self {
        Self {
            node: Arc::clone(&self.node),
            _marker: PhantomData,
        }
    }
}

impl<T: Payload> UnknownProvenance<T> {
    /// Wraps a value as a leaf, digesting it eagerly.
    ///
    /// # Errors
    ///
    /// Propagates codec and canonicalization failures.
    pub fn new(value: &T) -> Result<Self, GraphError> {
        Ok(Self::from_node(Arc::new(UnknownNode::of(value)?)))
    }

    pub(crate) fn from_node(node: Arc<UnknownNode>) -> Self {
        Self {
            node,
            _marker: PhantomData,
        }
    }

    /// The leaf's trivial resolution.
    #[must_use]
    pub fn resolve(&self) -> UnknownProvenanceResolved<T> {
        UnknownProvenanceResolved::from_node(Arc::new(UnknownResolvedNode::new(Arc::clone(
            &self.node,
        ))))
    }

    /// Class name of the wrapped value.
    #[must_use]
    pub fn class_name(&self) -> &ClassName {
        self.node.class_name()
    }

    /// Digest of the wrapped value.
    #[must_use]
    pub fn value_digest(&self) -> Digest {
        self.node.value_digest()
    }

    /// The wrapped value, loading through the tracker when the leaf holds
    /// only a digest.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError`] on load or decode failure.
    pub fn value(&self, tracker: &dyn ResultTracker) -> Result<T, TrackerError> {
        let tree = self.node.value().materialize(tracker)?;
        decode_payload(self.node.class_name(), tree)
    }

    /// The erased form.
    #[must_use]
    pub fn erase(&self) -> AnyValueWithProvenance {
        AnyValueWithProvenance::Unknown(Arc::clone(&self.node))
    }
}

/// The resolved form of a leaf.
#[derive(Debug)]
pub struct UnknownProvenanceResolved<T> {
    pub(crate) node: Arc<UnknownResolvedNode>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for UnknownProvenanceResolved<T> {
    fn clone(&self) -> Self {
        Self {
            node: Arc::clone(&self.node),
            _marker: PhantomData,
        }
    }
}

impl<T: Payload> UnknownProvenanceResolved<T> {
    pub(crate) fn from_node(node: Arc<UnknownResolvedNode>) -> Self {
        Self {
            node,
            _marker: PhantomData,
        }
    }

    /// Digest of the leaf value, which is also the output digest.
    #[must_use]
    pub fn output_digest(&self) -> Digest {
        self.node.output_digest()
    }

    /// The underlying leaf.
    #[must_use]
    pub fn leaf(&self) -> UnknownProvenance<T> {
        UnknownProvenance::from_node(Arc::clone(self.node.leaf()))
    }

    /// The erased form.
    #[must_use]
    pub fn erase(&self) -> AnyValueWithProvenance {
        AnyValueWithProvenance::UnknownResolved(Arc::clone(&self.node))
    }
}

/// A not-yet-executed call with a typed output.
#[derive(Debug)]
pub struct FunctionCallWithProvenance<T> {
    pub(crate) node: Arc<CallNode>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for FunctionCallWithProvenance<T> {
    fn clone(&self) -> Self {
        Self {
            node: Arc::clone(&self.node),
            _marker: PhantomData,
        }
    }
}

impl<T: Payload> FunctionCallWithProvenance<T> {
    pub(crate) fn from_node(node: Arc<CallNode>) -> Self {
        Self {
            node,
            _marker: PhantomData,
        }
    }

    /// The underlying erased node.
    #[must_use]
    pub fn node(&self) -> &Arc<CallNode> {
        &self.node
    }

    /// The function this call invokes.
    #[must_use]
    pub fn function(&self) -> &Arc<FunctionSpec> {
        self.node.function()
    }

    /// The version node.
    #[must_use]
    pub fn version(&self) -> &AnyValueWithProvenance {
        self.node.version()
    }

    /// The ordered, type-erased inputs.
    #[must_use]
    pub fn inputs(&self) -> &[AnyValueWithProvenance] {
        self.node.inputs()
    }

    /// The erased form.
    #[must_use]
    pub fn erase(&self) -> AnyValueWithProvenance {
        AnyValueWithProvenance::Call(Arc::clone(&self.node))
    }
}

/// An executed call with a typed output.
#[derive(Debug)]
pub struct FunctionCallResultWithProvenance<T> {
    pub(crate) node: Arc<ResultNode>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for FunctionCallResultWithProvenance<T> {
    fn clone(&self) -> Self {
        Self {
            node: Arc::clone(&self.node),
            _marker: PhantomData,
        }
    }
}

impl<T: Payload> FunctionCallResultWithProvenance<T> {
    pub(crate) fn from_node(node: Arc<ResultNode>) -> Self {
        Self {
            node,
            _marker: PhantomData,
        }
    }

    /// The underlying erased node.
    #[must_use]
    pub fn node(&self) -> &Arc<ResultNode> {
        &self.node
    }

    /// The originating call with its resolved inputs.
    #[must_use]
    pub fn call(&self) -> FunctionCallWithProvenance<T> {
        FunctionCallWithProvenance::from_node(Arc::clone(self.node.call()))
    }

    /// The version the call ran at.
    #[must_use]
    pub fn resolved_version(&self) -> &Version {
        self.node.resolved_version()
    }

    /// Digest of the output value.
    #[must_use]
    pub fn output_digest(&self) -> Digest {
        self.node.output_digest()
    }

    /// The output payload.
    #[must_use]
    pub fn output_virtual(&self) -> &VirtualValue {
        self.node.output()
    }

    /// The output value, loading through the tracker when only the digest
    /// is held.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError`] on load or decode failure.
    pub fn output(&self, tracker: &dyn ResultTracker) -> Result<T, TrackerError> {
        let tree = self.node.output().materialize(tracker)?;
        decode_payload(self.node.call().output_class_name(), tree)
    }

    /// The build the result was produced under.
    #[must_use]
    pub fn build(&self) -> &BuildInfoBrief {
        self.node.build()
    }

    /// The erased form.
    #[must_use]
    pub fn erase(&self) -> AnyValueWithProvenance {
        AnyValueWithProvenance::Result(Arc::clone(&self.node))
    }
}

/// A typed stub for a call whose inputs are not loaded.
#[derive(Debug)]
pub struct FunctionCallWithProvenanceDeflated<T> {
    pub(crate) node: Arc<DeflatedCallNode>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for FunctionCallWithProvenanceDeflated<T> {
    fn clone(&self) -> Self {
        Self {
            node: Arc::clone(&self.node),
            _marker: PhantomData,
        }
    }
}

impl<T: Payload> FunctionCallWithProvenanceDeflated<T> {
    pub(crate) fn from_node(node: Arc<DeflatedCallNode>) -> Self {
        Self {
            node,
            _marker: PhantomData,
        }
    }

    /// The wrapped unexpanded record.
    #[must_use]
    pub fn record(&self) -> &crate::record::CallRecordWithoutInputs {
        self.node.record()
    }

    /// The erased form.
    #[must_use]
    pub fn erase(&self) -> AnyValueWithProvenance {
        AnyValueWithProvenance::DeflatedCall(Arc::clone(&self.node))
    }
}

/// A typed stub for a stored result.
#[derive(Debug)]
pub struct FunctionCallResultWithProvenanceDeflated<T> {
    pub(crate) node: Arc<DeflatedResultNode>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for FunctionCallResultWithProvenanceDeflated<T> {
    fn clone(&self) -> Self {
        Self {
            node: Arc::clone(&self.node),
            _marker: PhantomData,
        }
    }
}

impl<T: Payload> FunctionCallResultWithProvenanceDeflated<T> {
    pub(crate) fn from_node(node: Arc<DeflatedResultNode>) -> Self {
        Self {
            node,
            _marker: PhantomData,
        }
    }

    /// The wrapped record.
    #[must_use]
    pub fn node(&self) -> &Arc<DeflatedResultNode> {
        &self.node
    }

    /// Digest of the stored output.
    #[must_use]
    pub fn output_digest(&self) -> &Digest {
        self.node.output_digest()
    }

    /// The erased form.
    #[must_use]
    pub fn erase(&self) -> AnyValueWithProvenance {
        AnyValueWithProvenance::DeflatedResult(Arc::clone(&self.node))
    }
}

/// Any typed node in the provenance graph.
#[derive(Debug)]
pub enum ValueWithProvenance<T> {
    /// A raw-value leaf.
    UnknownProvenance(UnknownProvenance<T>),
    /// A resolved leaf.
    UnknownProvenanceResolved(UnknownProvenanceResolved<T>),
    /// An unexecuted call.
    Call(FunctionCallWithProvenance<T>),
    /// An executed call.
    Result(FunctionCallResultWithProvenance<T>),
    /// A deflated call stub.
    DeflatedCall(FunctionCallWithProvenanceDeflated<T>),
    /// A deflated result stub.
    DeflatedResult(FunctionCallResultWithProvenanceDeflated<T>),
}

impl<T> Clone for ValueWithProvenance<T> {
    fn clone(&self) -> Self {
        match self {
            Self::UnknownProvenance(v) => Self::UnknownProvenance(v.clone()),
            Self::UnknownProvenanceResolved(v) => Self::UnknownProvenanceResolved(v.clone()),
            Self::Call(v) => Self::Call(v.clone()),
            Self::Result(v) => Self::Result(v.clone()),
            Self::DeflatedCall(v) => Self::DeflatedCall(v.clone()),
            Self::DeflatedResult(v) => Self::DeflatedResult(v.clone()),
        }
    }
}

impl<T: Payload> ValueWithProvenance<T> {
    /// Re-types an erased node, checking its class against `T`.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::ClassMismatch`] when the node produces a
    /// different class.
    pub fn from_any(any: AnyValueWithProvenance) -> Result<Self, GraphError> {
        check_class::<T>(any.output_class_name())?;
        Ok(match any {
            AnyValueWithProvenance::Unknown(node) => {
                Self::UnknownProvenance(UnknownProvenance::from_node(node))
            },
            AnyValueWithProvenance::UnknownResolved(node) => {
                Self::UnknownProvenanceResolved(UnknownProvenanceResolved::from_node(node))
            },
            AnyValueWithProvenance::Call(node) => {
                Self::Call(FunctionCallWithProvenance::from_node(node))
            },
            AnyValueWithProvenance::Result(node) => {
                Self::Result(FunctionCallResultWithProvenance::from_node(node))
            },
            AnyValueWithProvenance::DeflatedCall(node) => {
                Self::DeflatedCall(FunctionCallWithProvenanceDeflated::from_node(node))
            },
            AnyValueWithProvenance::DeflatedResult(node) => {
                Self::DeflatedResult(FunctionCallResultWithProvenanceDeflated::from_node(node))
            },
        })
    }

    /// The erased form.
    #[must_use]
    pub fn erase(&self) -> AnyValueWithProvenance {
        match self {
            Self::UnknownProvenance(v) => v.erase(),
            Self::UnknownProvenanceResolved(v) => v.erase(),
            Self::Call(v) => v.erase(),
            Self::Result(v) => v.erase(),
            Self::DeflatedCall(v) => v.erase(),
            Self::DeflatedResult(v) => v.erase(),
        }
    }
}

impl<T> From<UnknownProvenance<T>> for ValueWithProvenance<T> {
    fn from(v: UnknownProvenance<T>) -> Self {
        Self::UnknownProvenance(v)
    }
}

impl<T> From<UnknownProvenanceResolved<T>> for ValueWithProvenance<T> {
    fn from(v: UnknownProvenanceResolved<T>) -> Self {
        Self::UnknownProvenanceResolved(v)
    }
}

impl<T> From<FunctionCallWithProvenance<T>> for ValueWithProvenance<T> {
    fn from(v: FunctionCallWithProvenance<T>) -> Self {
        Self::Call(v)
    }
}

impl<T> From<FunctionCallResultWithProvenance<T>> for ValueWithProvenance<T> {
    fn from(v: FunctionCallResultWithProvenance<T>) -> Self {
        Self::Result(v)
    }
}

impl FunctionSpec {
    /// Constructs a call at a fixed version.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError`] when the output type does not match the spec
    /// or the inputs are malformed.
    pub fn track<T: Payload>(
        &self,
        version: Version,
        inputs: Vec<AnyValueWithProvenance>,
    ) -> Result<FunctionCallWithProvenance<T>, GraphError> {
        let leaf = UnknownProvenance::new(&version)?;
        self.track_with(leaf.erase(), inputs)
    }

    /// Constructs a call whose version is itself a graph node.
    ///
    /// # Errors
    ///
    /// As [`FunctionSpec::track`], plus [`GraphError::NotAVersion`] when the
    /// version node does not produce a `Version`.
    pub fn track_with<T: Payload>(
        &self,
        version: AnyValueWithProvenance,
        inputs: Vec<AnyValueWithProvenance>,
    ) -> Result<FunctionCallWithProvenance<T>, GraphError> {
        check_class::<T>(self.output_class())?;
        let node = CallNode::new(Arc::new(self.clone()), version, inputs)?;
        Ok(FunctionCallWithProvenance::from_node(Arc::new(node)))
    }
}
