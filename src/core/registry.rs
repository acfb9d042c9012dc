use crate::core::error::{OrchestratorError, Result};
use crate::core::prototype::NodePrototype;
use std::collections::HashMap;
use std::sync::Arc;

/// A name-keyed table of prototypes.
///
/// Registries are plain values handed to whoever builds graphs, so several
/// independent tables can coexist (one per test, per tenant, ...).
#[derive(Debug, Clone, Default)]
pub struct NodeRegistry {
    nodes: HashMap<String, Arc<NodePrototype>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a prototype under its own name.
    pub fn register(
        &mut self,
        prototype: impl Into<Arc<NodePrototype>>,
    ) -> Result<Arc<NodePrototype>> {
        let prototype = prototype.into();
        if self.nodes.contains_key(prototype.name()) {
            log::error!("Node {} already declared", prototype.name());
            return Err(OrchestratorError::Connection(format!(
                "node '{}' already declared",
                prototype.name()
            )));
        }
        log::debug!("Registered node {}", prototype.name());
        self.nodes
            .insert(prototype.name().to_string(), Arc::clone(&prototype));
        Ok(prototype)
    }

    pub fn get(&self, name: &str) -> Option<Arc<NodePrototype>> {
        self.nodes.get(name).cloned()
    }

    /// Like [`NodeRegistry::get`], failing when the name is unknown.
    pub fn require(&self, name: &str) -> Result<Arc<NodePrototype>> {
        self.get(name).ok_or_else(|| {
            OrchestratorError::Connection(format!("node '{}' is not registered", name))
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.nodes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
