use crate::core::descriptor::TypeDescriptor;
use crate::core::prototype::NodePrototype;
use crate::core::FieldMap;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Handle to an invocation inside one specific graph.
///
/// Ids carry the identity of the graph that issued them, so handing an id to
/// another graph is caught instead of silently addressing the wrong node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InvocationId {
    graph: Uuid,
    index: usize,
}

impl InvocationId {
    pub(crate) fn new(graph: Uuid, index: usize) -> Self {
        Self { graph, index }
    }

    /// Position of the invocation in its graph's registration order.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn graph(&self) -> Uuid {
        self.graph
    }
}

/// One placement of a prototype in a graph, with the upstream invocations feeding it.
#[derive(Debug, Clone)]
pub struct NodeInvocation {
    id: InvocationId,
    prototype: Arc<NodePrototype>,
    inputs: Vec<InvocationId>,
    alias: Option<String>,
}

impl NodeInvocation {
    pub(crate) fn new(
        id: InvocationId,
        prototype: Arc<NodePrototype>,
        inputs: Vec<InvocationId>,
        alias: Option<String>,
    ) -> Self {
        Self {
            id,
            prototype,
            inputs,
            alias,
        }
    }

    pub fn id(&self) -> InvocationId {
        self.id
    }

    pub fn prototype(&self) -> &Arc<NodePrototype> {
        &self.prototype
    }

    /// Upstream dependencies, in declaration order.
    pub fn inputs(&self) -> &[InvocationId] {
        &self.inputs
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    pub fn input_descriptor(&self) -> &TypeDescriptor {
        self.prototype.input_descriptor()
    }

    pub fn output_descriptor(&self) -> &TypeDescriptor {
        self.prototype.output_descriptor()
    }

    /// The name this invocation is known by inside its graph.
    pub fn label(&self) -> String {
        match &self.alias {
            Some(alias) => format!("{} as {}", self.prototype.name(), alias),
            None => self.prototype.name().to_string(),
        }
    }

    /// Output keys as they appear in the graph result, alias-prefixed when aliased.
    pub fn effective_output_keys(&self) -> BTreeSet<String> {
        self.prototype
            .output_keys()
            .into_iter()
            .map(|key| self.output_key(key))
            .collect()
    }

    fn output_key(&self, key: String) -> String {
        match &self.alias {
            Some(alias) => format!("{}_{}", alias, key),
            None => key,
        }
    }

    /// Rewrites every key of a produced mapping with the alias prefix.
    pub(crate) fn apply_alias(&self, outputs: FieldMap) -> FieldMap {
        if self.alias.is_none() {
            return outputs;
        }
        outputs
            .into_iter()
            .map(|(key, value)| (self.output_key(key), value))
            .collect()
    }

    pub(crate) fn push_input(&mut self, upstream: InvocationId) {
        self.inputs.push(upstream);
    }
}

impl fmt::Display for NodeInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.alias {
            Some(alias) => write!(f, "<{} as '{}'>", self.prototype.name(), alias),
            None => write!(f, "<{}>", self.prototype.name()),
        }
    }
}
