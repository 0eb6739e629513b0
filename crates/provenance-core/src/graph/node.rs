//! Type-erased graph nodes.
//!
//! The graph is heterogeneous — a call's inputs carry different payload
//! types — so the nodes themselves are erased: payloads live as canonical
//! JSON values tagged with class names, and the typed API in
//! [`super::typed`] is a thin phantom-typed layer over `Arc`s of these
//! structs. Sharing by `Arc` is what makes the no-copy rule observable:
//! a transformation that changes nothing returns the same allocation.

use std::sync::Arc;

use thiserror::Error;

use super::virtual_value::VirtualValue;
use crate::build_info::BuildInfoBrief;
use crate::canonical::{self, CanonicalError};
use crate::codec::{ClassName, Codec, CodecError, Payload};
use crate::digest::Digest;
use crate::function::FunctionSpec;
use crate::record::{CallRecordWithoutInputs, ResultRecord, UnknownResultRecord};
use crate::version::Version;

/// Class name of the version payload; calls validate their version node
/// against it.
pub const VERSION_CLASS: &str = "Version";

/// Errors raised while constructing or re-typing graph nodes.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GraphError {
    /// A codec operation failed.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Canonical serialization failed.
    #[error(transparent)]
    Canonical(#[from] CanonicalError),

    /// A call was given the wrong number of inputs.
    #[error("function '{function_name}' declares {declared} inputs, got {supplied}")]
    ArityMismatch {
        /// The function being called.
        function_name: String,
        /// Declared input count.
        declared: usize,
        /// Supplied input count.
        supplied: usize,
    },

    /// An input's class does not match the declared parameter class.
    #[error(
        "input {index} of '{function_name}' must be '{declared}', got '{supplied}'"
    )]
    InputClassMismatch {
        /// The function being called.
        function_name: String,
        /// Zero-based parameter index.
        index: usize,
        /// Declared class name.
        declared: ClassName,
        /// Supplied class name.
        supplied: ClassName,
    },

    /// A node was re-typed against the wrong payload type.
    #[error("node produces '{found}', requested '{requested}'")]
    ClassMismatch {
        /// Class the node produces.
        found: ClassName,
        /// Class the caller asked for.
        requested: ClassName,
    },

    /// The node supplied as a version does not produce a `Version`.
    #[error("version node produces '{found}', expected '{VERSION_CLASS}'")]
    NotAVersion {
        /// Class the node produces.
        found: ClassName,
    },
}

/// A raw-value leaf.
///
/// User-constructed leaves hold value and digest; leaves rebuilt from
/// records hold the digest alone. Either way the digest is always present.
#[derive(Debug)]
pub struct UnknownNode {
    class_name: ClassName,
    value: VirtualValue,
}

impl UnknownNode {
    /// Wraps a typed value as a leaf.
    ///
    /// # Errors
    ///
    /// Propagates codec resolution and serialization failures.
    pub fn of<T: Payload>(value: &T) -> Result<Self, GraphError> {
        let codec = Codec::<T>::resolve()?;
        let tree = canonical::to_canonical_value(value)?;
        Ok(Self {
            class_name: codec.class_name().clone(),
            value: VirtualValue::of(tree),
        })
    }

    /// Rebuilds a leaf from a stored record's class name and digest.
    #[must_use]
    pub fn from_digest(class_name: ClassName, digest: Digest) -> Self {
        Self {
            class_name,
            value: VirtualValue::from_digest(digest),
        }
    }

    /// Class name of the wrapped value.
    #[must_use]
    pub fn class_name(&self) -> &ClassName {
        &self.class_name
    }

    /// The wrapped value.
    #[must_use]
    pub fn value(&self) -> &VirtualValue {
        &self.value
    }

    /// Digest of the wrapped value's canonical bytes.
    #[must_use]
    pub fn value_digest(&self) -> Digest {
        self.value.resolve_digest()
    }
}

/// The trivial resolution of a leaf: the leaf is its own result.
#[derive(Debug)]
pub struct UnknownResolvedNode {
    leaf: Arc<UnknownNode>,
}

impl UnknownResolvedNode {
    /// Marks a leaf as resolved.
    #[must_use]
    pub fn new(leaf: Arc<UnknownNode>) -> Self {
        Self { leaf }
    }

    /// The underlying leaf.
    #[must_use]
    pub fn leaf(&self) -> &Arc<UnknownNode> {
        &self.leaf
    }

    /// Digest of the leaf value.
    #[must_use]
    pub fn output_digest(&self) -> Digest {
        self.leaf.value_digest()
    }
}

/// A not-yet-executed call.
#[derive(Debug)]
pub struct CallNode {
    function: Arc<FunctionSpec>,
    version: AnyValueWithProvenance,
    inputs: Vec<AnyValueWithProvenance>,
}

impl CallNode {
    /// Builds a call, validating arity and input classes against the spec.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::ArityMismatch`],
    /// [`GraphError::InputClassMismatch`], or [`GraphError::NotAVersion`] on
    /// a malformed call.
    pub fn new(
        function: Arc<FunctionSpec>,
        version: AnyValueWithProvenance,
        inputs: Vec<AnyValueWithProvenance>,
    ) -> Result<Self, GraphError> {
        if version.output_class_name().as_str() != VERSION_CLASS {
            return Err(GraphError::NotAVersion {
                found: version.output_class_name().clone(),
            });
        }
        if inputs.len() != function.arity() {
            return Err(GraphError::ArityMismatch {
                function_name: function.name().to_string(),
                declared: function.arity(),
                supplied: inputs.len(),
            });
        }
        for (index, (input, declared)) in
            inputs.iter().zip(function.input_classes()).enumerate()
        {
            if input.output_class_name() != declared {
                return Err(GraphError::InputClassMismatch {
                    function_name: function.name().to_string(),
                    index,
                    declared: declared.clone(),
                    supplied: input.output_class_name().clone(),
                });
            }
        }
        Ok(Self {
            function,
            version,
            inputs,
        })
    }

    /// The function this call invokes.
    #[must_use]
    pub fn function(&self) -> &Arc<FunctionSpec> {
        &self.function
    }

    /// The version node.
    #[must_use]
    pub fn version(&self) -> &AnyValueWithProvenance {
        &self.version
    }

    /// The ordered inputs.
    #[must_use]
    pub fn inputs(&self) -> &[AnyValueWithProvenance] {
        &self.inputs
    }

    /// Class name of the call's output.
    #[must_use]
    pub fn output_class_name(&self) -> &ClassName {
        self.function.output_class()
    }

    /// The version value, if the version node is already resolved locally.
    ///
    /// A version is locally resolved when it is a leaf or a resolved node
    /// whose concrete value is in memory. A resolved node holding only a
    /// digest returns `None` here; callers with a tracker can materialize
    /// it instead.
    #[must_use]
    pub fn version_value_local(&self) -> Option<Version> {
        let value = match &self.version {
            AnyValueWithProvenance::Unknown(leaf) => leaf.value().value()?.clone(),
            AnyValueWithProvenance::UnknownResolved(resolved) => {
                resolved.leaf().value().value()?.clone()
            },
            AnyValueWithProvenance::Result(result) => result.output().value()?.clone(),
            AnyValueWithProvenance::Call(_)
            | AnyValueWithProvenance::DeflatedCall(_)
            | AnyValueWithProvenance::DeflatedResult(_) => return None,
        };
        serde_json::from_value(value).ok()
    }

    /// Whether the version node counts as resolved for saving purposes.
    #[must_use]
    pub fn version_is_resolved(&self) -> bool {
        matches!(
            &self.version,
            AnyValueWithProvenance::Unknown(_)
                | AnyValueWithProvenance::UnknownResolved(_)
                | AnyValueWithProvenance::Result(_)
        )
    }
}

/// An executed call.
#[derive(Debug)]
pub struct ResultNode {
    call: Arc<CallNode>,
    resolved_version: Version,
    input_group_digest: Digest,
    output: VirtualValue,
    build: BuildInfoBrief,
}

impl ResultNode {
    /// Assembles a result.
    ///
    /// Only the resolution engine constructs these; the constructor is
    /// crate-visible on purpose.
    pub(crate) fn new(
        call: Arc<CallNode>,
        resolved_version: Version,
        input_group_digest: Digest,
        output: VirtualValue,
        build: BuildInfoBrief,
    ) -> Self {
        Self {
            call,
            resolved_version,
            input_group_digest,
            output,
            build,
        }
    }

    /// The originating call, with resolved inputs.
    #[must_use]
    pub fn call(&self) -> &Arc<CallNode> {
        &self.call
    }

    /// The version the call ran at.
    #[must_use]
    pub fn resolved_version(&self) -> &Version {
        &self.resolved_version
    }

    /// Digest of the ordered input output-digests.
    #[must_use]
    pub fn input_group_digest(&self) -> &Digest {
        &self.input_group_digest
    }

    /// The produced output.
    #[must_use]
    pub fn output(&self) -> &VirtualValue {
        &self.output
    }

    /// Digest of the output value.
    #[must_use]
    pub fn output_digest(&self) -> Digest {
        self.output.resolve_digest()
    }

    /// The build the result was produced under.
    #[must_use]
    pub fn build(&self) -> &BuildInfoBrief {
        &self.build
    }
}

/// A call stub carrying its serializable form.
#[derive(Debug)]
pub struct DeflatedCallNode {
    record: CallRecordWithoutInputs,
}

impl DeflatedCallNode {
    /// Wraps an unexpanded call record.
    #[must_use]
    pub fn new(record: CallRecordWithoutInputs) -> Self {
        Self { record }
    }

    /// The wrapped record.
    #[must_use]
    pub fn record(&self) -> &CallRecordWithoutInputs {
        &self.record
    }

    /// Class name of the call's output.
    #[must_use]
    pub fn output_class_name(&self) -> &ClassName {
        &self.record.output_class_name
    }
}

/// A result stub carrying its serializable form.
#[derive(Debug)]
pub enum DeflatedResultNode {
    /// A result of a call with known provenance.
    Known(ResultRecord),
    /// A trivial result of an unknown-provenance leaf.
    Unknown(UnknownResultRecord),
}

impl DeflatedResultNode {
    /// Class name of the output.
    #[must_use]
    pub fn output_class_name(&self) -> &ClassName {
        match self {
            Self::Known(record) => &record.call.output_class_name,
            Self::Unknown(record) => &record.call.output_class_name,
        }
    }

    /// Digest of the output value.
    #[must_use]
    pub fn output_digest(&self) -> &Digest {
        match self {
            Self::Known(record) => &record.output_digest,
            Self::Unknown(record) => &record.output_digest,
        }
    }
}

/// A type-erased reference to any node in the graph.
///
/// Clones are `Arc` clones; two references can be compared for allocation
/// identity with [`AnyValueWithProvenance::ptr_eq`].
#[derive(Debug, Clone)]
pub enum AnyValueWithProvenance {
    /// A raw-value leaf.
    Unknown(Arc<UnknownNode>),
    /// A resolved leaf.
    UnknownResolved(Arc<UnknownResolvedNode>),
    /// An unexecuted call.
    Call(Arc<CallNode>),
    /// An executed call.
    Result(Arc<ResultNode>),
    /// A deflated call stub.
    DeflatedCall(Arc<DeflatedCallNode>),
    /// A deflated result stub.
    DeflatedResult(Arc<DeflatedResultNode>),
}

impl AnyValueWithProvenance {
    /// Class name of the value this node produces.
    #[must_use]
    pub fn output_class_name(&self) -> &ClassName {
        match self {
            Self::Unknown(node) => node.class_name(),
            Self::UnknownResolved(node) => node.leaf().class_name(),
            Self::Call(node) => node.output_class_name(),
            Self::Result(node) => node.call().output_class_name(),
            Self::DeflatedCall(node) => node.output_class_name(),
            Self::DeflatedResult(node) => node.output_class_name(),
        }
    }

    /// Whether this node is a resolved form.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        matches!(
            self,
            Self::UnknownResolved(_) | Self::Result(_) | Self::DeflatedResult(_)
        )
    }

    /// Digest of the node's output, for resolved forms.
    #[must_use]
    pub fn output_digest(&self) -> Option<Digest> {
        match self {
            Self::UnknownResolved(node) => Some(node.output_digest()),
            Self::Result(node) => Some(node.output_digest()),
            Self::DeflatedResult(node) => Some(node.output_digest().clone()),
            Self::Unknown(_) | Self::Call(_) | Self::DeflatedCall(_) => None,
        }
    }

    /// Whether two references point at the same allocation.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Unknown(a), Self::Unknown(b)) => Arc::ptr_eq(a, b),
            (Self::UnknownResolved(a), Self::UnknownResolved(b)) => Arc::ptr_eq(a, b),
            (Self::Call(a), Self::Call(b)) => Arc::ptr_eq(a, b),
            (Self::Result(a), Self::Result(b)) => Arc::ptr_eq(a, b),
            (Self::DeflatedCall(a), Self::DeflatedCall(b)) => Arc::ptr_eq(a, b),
            (Self::DeflatedResult(a), Self::DeflatedResult(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}
