//! # provenance-core
//!
//! Reproducible computation provenance: express computations as a DAG of
//! function calls, record every call, its inputs, its output, and the
//! producing build in a content-addressed store, and reuse cached outputs
//! when the same call is resolved again.
//!
//! ## Architecture
//!
//! ```text
//! FunctionSpec.track(version, inputs)
//!        |
//!        v
//! FunctionCallWithProvenance ----resolve----> FunctionCallResultWithProvenance
//!        |                                          |
//!      save                                       deflate
//!        |                                          |
//!        v                                          v
//! CallRecordWithInputs (calls/<digest>)      ResultRecord (results/<digest>)
//!                                                   |
//!                                                   v
//!                              memo/<fn>/<version>/<inputGroup> -> outputDigest
//! ```
//!
//! Every payload, call record, and result record is serialized through one
//! canonical JSON form and identified by the SHA-1 digest of those bytes.
//! Resolution probes the memoization index before executing; a hit
//! reconstructs the result with the stored build context and never invokes
//! the function.
//!
//! ## Example
//!
//! ```
//! use chrono::Utc;
//! use provenance_core::build_info::BuildInfo;
//! use provenance_core::function::{FunctionError, FunctionSpec};
//! use provenance_core::graph::UnknownProvenance;
//! use provenance_core::tracker::{MemoryBlobStore, ProvenanceStore};
//! use provenance_core::version::Version;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let tracker = ProvenanceStore::new(
//!     MemoryBlobStore::new(),
//!     BuildInfo::new("commit-1", "build-1", Utc::now()),
//! );
//!
//! let add = FunctionSpec::builder("add")
//!     .input::<i64>()
//!     .input::<i64>()
//!     .output::<i64>()
//!     .run(|inputs, _version| {
//!         let a = inputs[0].as_i64().ok_or_else(|| FunctionError::new("bad input"))?;
//!         let b = inputs[1].as_i64().ok_or_else(|| FunctionError::new("bad input"))?;
//!         Ok(serde_json::json!(a + b))
//!     })
//!     .build()?;
//!
//! let two = UnknownProvenance::new(&2_i64)?;
//! let three = UnknownProvenance::new(&3_i64)?;
//! let call = add.track::<i64>(Version::new("1.0"), vec![two.erase(), three.erase()])?;
//!
//! let result = call.resolve(&tracker)?;
//! assert_eq!(result.output(&tracker)?, 5);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod build_info;
pub mod canonical;
pub mod codec;
pub mod digest;
pub mod function;
pub mod graph;
pub mod record;
pub mod registry;
pub mod resolve;
pub mod tracker;
pub mod version;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::build_info::{BuildInfo, BuildInfoBrief};
    pub use crate::codec::{Codec, Payload};
    pub use crate::digest::Digest;
    pub use crate::function::{FunctionError, FunctionSpec};
    pub use crate::graph::{
        FunctionCallResultWithProvenance, FunctionCallWithProvenance, UnknownProvenance,
        ValueWithProvenance,
    };
    pub use crate::registry::FunctionRegistry;
    pub use crate::tracker::{
        BlobStore, FsBlobStore, MemoryBlobStore, ProvenanceStore, ResultTracker,
        ResultTrackerExt,
    };
    pub use crate::version::Version;
}

pub use build_info::BuildInfo;
pub use digest::Digest;
pub use function::FunctionSpec;
pub use graph::{FunctionCallResultWithProvenance, FunctionCallWithProvenance, UnknownProvenance};
pub use registry::FunctionRegistry;
pub use tracker::{ProvenanceStore, ResultTracker};
pub use version::Version;
