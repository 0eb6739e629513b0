//! Tracked function definitions.
//!
//! A [`FunctionSpec`] is the durable identity of a computation: a canonical
//! name, a declared arity with input class names, an output class name, and
//! the run closure that executes it. Calls reference their spec by `Arc`, so
//! the resolution engine can execute a call without any global lookup; the
//! name is what goes into records and memoization keys.
//!
//! The run closure works over canonical JSON values. Typed signatures are
//! deliberately not part of the core — decode the inputs with the codecs the
//! spec declares:
//!
//! ```
//! use provenance_core::function::{FunctionError, FunctionSpec};
//!
//! let add = FunctionSpec::builder("add")
//!     .input::<i64>()
//!     .input::<i64>()
//!     .output::<i64>()
//!     .run(|inputs, _version| {
//!         let a = inputs[0].as_i64().ok_or_else(|| FunctionError::new("a: not an i64"))?;
//!         let b = inputs[1].as_i64().ok_or_else(|| FunctionError::new("b: not an i64"))?;
//!         Ok(serde_json::json!(a + b))
//!     })
//!     .build()
//!     .unwrap();
//! assert_eq!(add.arity(), 2);
//! ```

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use crate::codec::{self, ClassName, CodecError, Payload};
use crate::version::Version;

/// A failure reported by a user-supplied run closure.
#[derive(Debug, Error, Clone)]
#[error("{message}")]
pub struct FunctionError {
    /// Description of the failure.
    message: String,
}

impl FunctionError {
    /// Creates a function failure with the given description.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Errors raised while building a [`FunctionSpec`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FunctionSpecError {
    /// The builder was finished without an output type.
    #[error("function '{name}' has no output class")]
    MissingOutput {
        /// The function name.
        name: String,
    },

    /// The builder was finished without a run closure.
    #[error("function '{name}' has no run closure")]
    MissingRun {
        /// The function name.
        name: String,
    },

    /// An input or output type had no registered codec.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

type RunFn = Arc<dyn Fn(&[Value], &Version) -> Result<Value, FunctionError> + Send + Sync>;

/// The identity and behavior of a tracked function.
#[derive(Clone)]
pub struct FunctionSpec {
    name: String,
    input_classes: Vec<ClassName>,
    output_class: ClassName,
    run: RunFn,
}

impl FunctionSpec {
    /// Starts building a function spec.
    pub fn builder(name: impl Into<String>) -> FunctionSpecBuilder {
        FunctionSpecBuilder {
            name: name.into(),
            input_classes: Vec::new(),
            output_class: None,
            run: None,
            deferred_error: None,
        }
    }

    /// The canonical function name used in records and memo keys.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The declared number of inputs.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.input_classes.len()
    }

    /// Class names of the declared inputs, in parameter order.
    #[must_use]
    pub fn input_classes(&self) -> &[ClassName] {
        &self.input_classes
    }

    /// Class name of the output.
    #[must_use]
    pub fn output_class(&self) -> &ClassName {
        &self.output_class
    }

    /// Invokes the run closure on materialized input values.
    ///
    /// # Errors
    ///
    /// Propagates whatever the closure reports.
    pub fn run(&self, inputs: &[Value], version: &Version) -> Result<Value, FunctionError> {
        (self.run)(inputs, version)
    }
}

impl fmt::Debug for FunctionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionSpec")
            .field("name", &self.name)
            .field("input_classes", &self.input_classes)
            .field("output_class", &self.output_class)
            .finish_non_exhaustive()
    }
}

/// Builder for [`FunctionSpec`].
pub struct FunctionSpecBuilder {
    name: String,
    input_classes: Vec<ClassName>,
    output_class: Option<ClassName>,
    run: Option<RunFn>,
    deferred_error: Option<CodecError>,
}

impl FunctionSpecBuilder {
    /// Declares the next input parameter by payload type.
    ///
    /// The type must already be registered with the codec registry; a
    /// missing registration surfaces from [`Self::build`].
    #[must_use]
    pub fn input<T: Payload>(mut self) -> Self {
        match codec::class_name_of::<T>() {
            Ok(class_name) => self.input_classes.push(class_name),
            Err(e) => {
                self.deferred_error.get_or_insert(e);
            },
        }
        self
    }

    /// Declares the next input parameter by class name.
    #[must_use]
    pub fn input_class(mut self, class_name: ClassName) -> Self {
        self.input_classes.push(class_name);
        self
    }

    /// Declares the output by payload type.
    #[must_use]
    pub fn output<T: Payload>(mut self) -> Self {
        match codec::class_name_of::<T>() {
            Ok(class_name) => self.output_class = Some(class_name),
            Err(e) => {
                self.deferred_error.get_or_insert(e);
            },
        }
        self
    }

    /// Declares the output by class name.
    #[must_use]
    pub fn output_class(mut self, class_name: ClassName) -> Self {
        self.output_class = Some(class_name);
        self
    }

    /// Supplies the run closure.
    #[must_use]
    pub fn run(
        mut self,
        f: impl Fn(&[Value], &Version) -> Result<Value, FunctionError> + Send + Sync + 'static,
    ) -> Self {
        self.run = Some(Arc::new(f));
        self
    }

    /// Finishes the spec.
    ///
    /// # Errors
    ///
    /// Returns [`FunctionSpecError`] if the output or run closure is missing
    /// or an input/output type was not registered.
    pub fn build(self) -> Result<FunctionSpec, FunctionSpecError> {
        if let Some(e) = self.deferred_error {
            return Err(e.into());
        }
        let output_class = self
            .output_class
            .ok_or_else(|| FunctionSpecError::MissingOutput {
                name: self.name.clone(),
            })?;
        let run = self.run.ok_or_else(|| FunctionSpecError::MissingRun {
            name: self.name.clone(),
        })?;
        Ok(FunctionSpec {
            name: self.name,
            input_classes: self.input_classes,
            output_class,
            run,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn double() -> FunctionSpec {
        FunctionSpec::builder("double")
            .input::<i64>()
            .output::<i64>()
            .run(|inputs, _| {
                let x = inputs[0]
                    .as_i64()
                    .ok_or_else(|| FunctionError::new("not an i64"))?;
                Ok(serde_json::json!(x * 2))
            })
            .build()
            .unwrap()
    }

    #[test]
    fn builder_produces_spec() {
        let spec = double();
        assert_eq!(spec.name(), "double");
        assert_eq!(spec.arity(), 1);
        assert_eq!(spec.output_class().as_str(), "i64");
    }

    #[test]
    fn run_invokes_closure() {
        let spec = double();
        let out = spec
            .run(&[serde_json::json!(21)], &Version::new("1.0"))
            .unwrap();
        assert_eq!(out, serde_json::json!(42));
    }

    #[test]
    fn missing_run_is_rejected() {
        let err = FunctionSpec::builder("f").output::<i64>().build().unwrap_err();
        assert!(matches!(err, FunctionSpecError::MissingRun { .. }));
    }

    #[test]
    fn missing_output_is_rejected() {
        let err = FunctionSpec::builder("f")
            .run(|_, _| Ok(Value::Null))
            .build()
            .unwrap_err();
        assert!(matches!(err, FunctionSpecError::MissingOutput { .. }));
    }

    #[test]
    fn unregistered_input_surfaces_at_build() {
        #[derive(serde::Serialize, serde::Deserialize)]
        struct NotRegistered;
        let err = FunctionSpec::builder("f")
            .input::<NotRegistered>()
            .output::<i64>()
            .run(|_, _| Ok(Value::Null))
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            FunctionSpecError::Codec(CodecError::UnregisteredType { .. })
        ));
    }
}
