//! Registry for operations.

use crate::dispatch::dispatch;
use crate::error::{Error, Result};
use crate::monitor::Monitor;
use crate::signature::{Callable, OpSignature};
use crate::value::Value;
use indexmap::IndexMap;
use tracing::debug;

/// A registered operation: its signature and body.
#[derive(Debug, Clone)]
pub struct Operation {
    signature: OpSignature,
    callable: Callable,
}

impl Operation {
    pub fn signature(&self) -> &OpSignature {
        &self.signature
    }

    pub fn callable(&self) -> &Callable {
        &self.callable
    }

    pub fn name(&self) -> &str {
        &self.signature.name
    }

    /// Validate the arguments and run the operation.
    pub fn call(
        &self,
        positional: Vec<Value>,
        keyword: IndexMap<String, Value>,
        monitor: &mut dyn Monitor,
    ) -> Result<IndexMap<String, Value>> {
        dispatch(&self.signature, &self.callable, positional, keyword, monitor)
    }
}

/// Catalog of available operations, keyed by name.
///
/// Populated once at startup and then shared read-only.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    operations: IndexMap<String, Operation>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an operation.
    ///
    /// Registering the same name again with an identical signature is a
    /// no-op that keeps the first callable; a different signature is a
    /// conflict.
    pub fn register(&mut self, mut signature: OpSignature, callable: Callable) -> Result<()> {
        signature.accepts_monitor = callable.accepts_monitor();
        signature.validate().map_err(Error::InvalidSignature)?;

        if let Some(existing) = self.operations.get(&signature.name) {
            if existing.signature == signature {
                debug!(operation = %signature.name, "operation already registered");
                return Ok(());
            }
            return Err(Error::Conflict(signature.name));
        }

        debug!(
            operation = %signature.name,
            inputs = signature.inputs.len(),
            "registered operation"
        );
        self.operations.insert(
            signature.name.clone(),
            Operation {
                signature,
                callable,
            },
        );
        Ok(())
    }

    /// Look up an operation by name.
    pub fn get(&self, name: &str) -> Result<&Operation> {
        self.operations
            .get(name)
            .ok_or_else(|| Error::not_found("operation", name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.operations.contains_key(name)
    }

    /// Registered names, in registration order.
    ///
    /// The iterator is lazy and can be cloned to restart it.
    pub fn list(&self) -> impl Iterator<Item = &str> + Clone + '_ {
        self.operations.keys().map(String::as_str)
    }

    /// Iterate over all signatures.
    pub fn signatures(&self) -> impl Iterator<Item = &OpSignature> {
        self.operations.values().map(|op| &op.signature)
    }

    /// Signatures carrying `tag`.
    pub fn tagged<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a OpSignature> + 'a {
        self.signatures().filter(move |sig| sig.has_tag(tag))
    }

    /// Look up an operation and run it.
    pub fn call(
        &self,
        name: &str,
        positional: Vec<Value>,
        keyword: IndexMap<String, Value>,
        monitor: &mut dyn Monitor,
    ) -> Result<IndexMap<String, Value>> {
        self.get(name)?.call(positional, keyword, monitor)
    }

    /// Number of registered operations.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Check if registry is empty.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}
