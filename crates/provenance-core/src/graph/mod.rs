//! The provenance graph algebra.
//!
//! A computation is described as a DAG of [`ValueWithProvenance`] nodes:
//! raw-value leaves ([`UnknownProvenance`]), unexecuted calls
//! ([`FunctionCallWithProvenance`]), executed calls
//! ([`FunctionCallResultWithProvenance`]), and deflated stubs that stand in
//! for stored records. The resolution engine in [`crate::resolve`] walks
//! this graph; the mirror in [`crate::record`] serializes it.
//!
//! Nodes are immutable once constructed and shared by `Arc`. A
//! transformation that would produce a structurally identical node returns
//! the original allocation instead, so object identity survives
//! resolve/deflate round trips on already-settled subgraphs.
//!
//! # Example
//!
//! ```
//! use provenance_core::function::{FunctionError, FunctionSpec};
//! use provenance_core::graph::UnknownProvenance;
//! use provenance_core::version::Version;
//!
//! let add = FunctionSpec::builder("add")
//!     .input::<i64>()
//!     .input::<i64>()
//!     .output::<i64>()
//!     .run(|inputs, _| {
//!         let a = inputs[0].as_i64().ok_or_else(|| FunctionError::new("bad input"))?;
//!         let b = inputs[1].as_i64().ok_or_else(|| FunctionError::new("bad input"))?;
//!         Ok(serde_json::json!(a + b))
//!     })
//!     .build()
//!     .unwrap();
//!
//! let two = UnknownProvenance::new(&2_i64).unwrap();
//! let three = UnknownProvenance::new(&3_i64).unwrap();
//! let call = add
//!     .track::<i64>(Version::new("1.0"), vec![two.erase(), three.erase()])
//!     .unwrap();
//! assert_eq!(call.function().name(), "add");
//! ```

mod node;
mod typed;
mod virtual_value;

#[cfg(test)]
mod tests;

pub use node::{
    AnyValueWithProvenance, CallNode, DeflatedCallNode, DeflatedResultNode, GraphError,
    ResultNode, UnknownNode, UnknownResolvedNode, VERSION_CLASS,
};
pub use typed::{
    FunctionCallResultWithProvenance, FunctionCallResultWithProvenanceDeflated,
    FunctionCallWithProvenance, FunctionCallWithProvenanceDeflated, UnknownProvenance,
    UnknownProvenanceResolved, ValueWithProvenance,
};
pub use virtual_value::VirtualValue;
