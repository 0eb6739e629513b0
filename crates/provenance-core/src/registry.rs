//! Name → function lookup for processes that hold the code.
//!
//! Deserializing a call record requires finding the function object the
//! record names. There is no reflection here: every concrete function is
//! registered explicitly, duplicate names are rejected, and an unknown name
//! fails with [`RegistryError::UnknownFunction`]. A process that cannot
//! resolve a name can still transport the record; it just cannot inflate it
//! into an executable call.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use thiserror::Error;

use crate::function::FunctionSpec;

/// Errors raised by function lookup and registration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RegistryError {
    /// No function is registered under the given name.
    #[error("unknown function '{name}'")]
    UnknownFunction {
        /// The unresolvable function name.
        name: String,
    },

    /// A function with this name is already registered.
    #[error("function '{name}' is already registered")]
    DuplicateFunction {
        /// The contested function name.
        name: String,
    },
}

/// A threaded (non-global) mapping from function name to function object.
///
/// Cloning a registry yields a second handle to the same underlying map, so
/// one registry can be shared between the loader and application code.
#[derive(Debug, Default, Clone)]
pub struct FunctionRegistry {
    map: Arc<RwLock<BTreeMap<String, Arc<FunctionSpec>>>>,
}

impl FunctionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a function spec under its own name.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateFunction`] if the name is taken.
    ///
    /// # Panics
    ///
    /// Panics if the registry lock is poisoned.
    pub fn register(&self, spec: FunctionSpec) -> Result<Arc<FunctionSpec>, RegistryError> {
        let mut map = self.map.write().expect("function registry lock poisoned");
        let name = spec.name().to_string();
        if map.contains_key(&name) {
            return Err(RegistryError::DuplicateFunction { name });
        }
        let spec = Arc::new(spec);
        map.insert(name, Arc::clone(&spec));
        Ok(spec)
    }

    /// Finds a function by its canonical name.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownFunction`] if the name does not
    /// resolve.
    ///
    /// # Panics
    ///
    /// Panics if the registry lock is poisoned.
    pub fn get(&self, name: &str) -> Result<Arc<FunctionSpec>, RegistryError> {
        let map = self.map.read().expect("function registry lock poisoned");
        map.get(name)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownFunction {
                name: name.to_string(),
            })
    }

    /// Whether a name resolves in this registry.
    ///
    /// # Panics
    ///
    /// Panics if the registry lock is poisoned.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        let map = self.map.read().expect("function registry lock poisoned");
        map.contains_key(name)
    }

    /// All registered names, sorted.
    ///
    /// # Panics
    ///
    /// Panics if the registry lock is poisoned.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let map = self.map.read().expect("function registry lock poisoned");
        map.keys().cloned().collect()
    }
}
