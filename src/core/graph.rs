use crate::core::error::{OrchestratorError, Result};
use crate::core::invocation::{InvocationId, NodeInvocation};
use crate::core::prototype::NodePrototype;
use crate::core::registry::NodeRegistry;
use crate::core::telemetry::{Telemetry, TraceEntry};
use crate::core::validation::ValidationResult;
use crate::core::{FieldMap, NodeValue};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// What happens when two invocations declare the same effective output key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollisionPolicy {
    /// Refuse the second invocation with a connection error.
    #[default]
    Reject,
    /// Accept it; the value produced last wins in the merged result.
    Overwrite,
}

/// Tunables of a [`Graph`].
#[derive(Debug, Clone, Default)]
pub struct GraphConfig {
    pub collision_policy: CollisionPolicy,
    /// Seed the merged result with the initial inputs before node outputs.
    pub include_initial_inputs: bool,
}

impl GraphConfig {
    pub fn collision_policy(mut self, policy: CollisionPolicy) -> Self {
        self.collision_policy = policy;
        self
    }

    pub fn include_initial_inputs(mut self, include: bool) -> Self {
        self.include_initial_inputs = include;
        self
    }
}

/// Lifecycle of a [`Graph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphState {
    Building,
    Validated,
    Executing,
    Completed,
    Failed,
}

/// Owns a set of node invocations and runs them in dependency order.
///
/// Nodes are placed with [`Graph::apply`] / [`Graph::apply_as`], which return
/// ids scoped to this graph; extra edges can be declared with
/// [`Graph::connect`]. [`Graph::finalize`] checks for cycles and orphans, and
/// [`Graph::run`] executes every node once, feeding each the merged outputs of
/// its upstream nodes (or the initial inputs for sources). A graph that was
/// never finalized is finalized by its first run; a graph whose structure was
/// rejected does not run until it is changed.
pub struct Graph {
    id: Uuid,
    name: String,
    config: GraphConfig,
    nodes: Vec<NodeInvocation>,
    labels: HashMap<String, InvocationId>,
    produced: HashMap<String, InvocationId>,
    state: GraphState,
    // Set when `finalize` rejected the current structure.
    structure_rejected: bool,
    telemetry: Option<Arc<dyn Telemetry>>,
}

impl Graph {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, GraphConfig::default())
    }

    pub fn with_config(name: impl Into<String>, config: GraphConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            config,
            nodes: Vec::new(),
            labels: HashMap::new(),
            produced: HashMap::new(),
            state: GraphState::Building,
            structure_rejected: false,
            telemetry: None,
        }
    }

    /// Creates a graph, lets `build` populate it and finalizes the result.
    pub fn build<F>(name: impl Into<String>, build: F) -> Result<Graph>
    where
        F: FnOnce(&mut Graph) -> Result<()>,
    {
        let mut graph = Graph::new(name);
        build(&mut graph)?;
        graph.finalize()?;
        Ok(graph)
    }

    /// Records one trace entry per dispatched node.
    pub fn with_telemetry(mut self, telemetry: Arc<dyn Telemetry>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    pub fn state(&self) -> GraphState {
        self.state
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Invocations in registration order.
    pub fn nodes(&self) -> &[NodeInvocation] {
        &self.nodes
    }

    pub fn node(&self, id: InvocationId) -> Option<&NodeInvocation> {
        if id.graph() != self.id {
            return None;
        }
        self.nodes.get(id.index())
    }

    /// Looks an invocation up by its label.
    pub fn find(&self, label: &str) -> Option<InvocationId> {
        self.labels.get(label).copied()
    }

    // ------------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------------

    /// Places `prototype` downstream of `upstream` (a source when empty).
    pub fn apply(
        &mut self,
        prototype: &Arc<NodePrototype>,
        upstream: &[InvocationId],
    ) -> Result<InvocationId> {
        self.apply_as(prototype, upstream, None)
    }

    /// Like [`Graph::apply`], prefixing every output key with `alias_`.
    pub fn apply_as(
        &mut self,
        prototype: &Arc<NodePrototype>,
        upstream: &[InvocationId],
        alias: Option<&str>,
    ) -> Result<InvocationId> {
        self.ensure_mutable()?;
        if alias.is_some_and(|a| a.trim().is_empty()) {
            return Err(OrchestratorError::Configuration(format!(
                "alias for '{}' cannot be empty",
                prototype.name()
            )));
        }

        let id = InvocationId::new(self.id, self.nodes.len());
        let invocation = NodeInvocation::new(
            id,
            Arc::clone(prototype),
            upstream.to_vec(),
            alias.map(str::to_string),
        );
        let label = invocation.label();
        log::debug!("Adding node {} to graph {}", label, self.name);

        if self.labels.contains_key(&label) {
            log::error!("Node {} already exists in graph {}", label, self.name);
            return Err(OrchestratorError::Connection(format!(
                "node '{}' already added to graph '{}'",
                label, self.name
            )));
        }

        if !upstream.is_empty() {
            let mut provided = BTreeSet::new();
            let mut sources = Vec::with_capacity(upstream.len());
            for up in upstream {
                let source = &self.nodes[self.resolve(*up)?];
                provided.extend(source.effective_output_keys());
                sources.push(source.label());
            }
            prototype.check_provided_keys(&sources.join(" + "), &provided)?;
        }

        self.claim_outputs(&invocation)?;
        self.labels.insert(label, id);
        self.nodes.push(invocation);
        self.reopen();
        Ok(id)
    }

    /// Places a prototype taken from `registry` by name.
    pub fn place(
        &mut self,
        registry: &NodeRegistry,
        name: &str,
        upstream: &[InvocationId],
    ) -> Result<InvocationId> {
        let prototype = registry.require(name)?;
        self.apply(&prototype, upstream)
    }

    /// Declares an additional edge `from -> to`.
    pub fn connect(&mut self, from: InvocationId, to: InvocationId) -> Result<()> {
        self.ensure_mutable()?;
        let (from_index, to_index) = match (self.resolve(from), self.resolve(to)) {
            (Ok(f), Ok(t)) => (f, t),
            _ => {
                log::error!("Both nodes must be added before connecting");
                return Err(OrchestratorError::Connection(format!(
                    "both nodes must be added to graph '{}' before connecting",
                    self.name
                )));
            }
        };

        let source = &self.nodes[from_index];
        let target = &self.nodes[to_index];
        log::debug!(
            "Connecting {} -> {} in graph {}",
            source.label(),
            target.label(),
            self.name
        );
        target
            .prototype()
            .check_provided_keys(&source.label(), &source.effective_output_keys())?;

        if target.inputs().contains(&from) {
            log::warn!(
                "Edge {} -> {} already declared, ignoring",
                source.label(),
                target.label()
            );
            return Ok(());
        }
        self.nodes[to_index].push_input(from);
        self.reopen();
        Ok(())
    }

    fn ensure_mutable(&self) -> Result<()> {
        match self.state {
            GraphState::Validated | GraphState::Completed | GraphState::Executing => {
                Err(OrchestratorError::Connection(format!(
                    "graph '{}' is sealed ({:?}); build a new graph to change its structure",
                    self.name, self.state
                )))
            }
            GraphState::Building | GraphState::Failed => Ok(()),
        }
    }

    /// A changed structure has to be checked again.
    fn reopen(&mut self) {
        self.state = GraphState::Building;
        self.structure_rejected = false;
    }

    fn resolve(&self, id: InvocationId) -> Result<usize> {
        if id.graph() == self.id && id.index() < self.nodes.len() {
            return Ok(id.index());
        }
        Err(OrchestratorError::Connection(format!(
            "node #{} is not part of graph '{}'",
            id.index(),
            self.name
        )))
    }

    fn claim_outputs(&mut self, invocation: &NodeInvocation) -> Result<()> {
        let keys = invocation.effective_output_keys();
        let conflicts: Vec<&str> = keys
            .iter()
            .filter(|key| self.produced.contains_key(*key))
            .map(String::as_str)
            .collect();
        if !conflicts.is_empty() {
            match self.config.collision_policy {
                CollisionPolicy::Reject => {
                    log::error!("Output key conflicts: [{}]", conflicts.join(", "));
                    return Err(OrchestratorError::Connection(format!(
                        "output key(s) already produced in graph '{}': [{}]",
                        self.name,
                        conflicts.join(", ")
                    )));
                }
                CollisionPolicy::Overwrite => log::warn!(
                    "Node {} overwrites output key(s) [{}]",
                    invocation.label(),
                    conflicts.join(", ")
                ),
            }
        }
        for key in keys {
            self.produced.insert(key, invocation.id());
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Structure analysis
    // ------------------------------------------------------------------------

    /// Downstream neighbours of every node, by index, in declaration order.
    fn adjacency(&self) -> Vec<Vec<usize>> {
        let mut adjacency = vec![Vec::new(); self.nodes.len()];
        for (index, node) in self.nodes.iter().enumerate() {
            for up in node.inputs() {
                adjacency[up.index()].push(index);
            }
        }
        adjacency
    }

    /// Downstream invocations of `id`.
    pub fn downstream(&self, id: InvocationId) -> Vec<InvocationId> {
        let Ok(index) = self.resolve(id) else {
            return Vec::new();
        };
        self.adjacency()[index]
            .iter()
            .map(|i| self.nodes[*i].id())
            .collect()
    }

    /// Orders nodes so that each follows all of its dependencies (Kahn's algorithm).
    ///
    /// Ties are broken by registration order.
    pub fn topological_order(&self) -> Result<Vec<InvocationId>> {
        let adjacency = self.adjacency();
        let mut in_degree: Vec<usize> = self.nodes.iter().map(|n| n.inputs().len()).collect();
        let mut queue: VecDeque<usize> = (0..self.nodes.len())
            .filter(|index| in_degree[*index] == 0)
            .collect();
        let mut ordered = Vec::with_capacity(self.nodes.len());

        while let Some(index) = queue.pop_front() {
            ordered.push(self.nodes[index].id());
            for &next in &adjacency[index] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    queue.push_back(next);
                }
            }
        }

        if ordered.len() != self.nodes.len() {
            let stuck: Vec<String> = self
                .nodes
                .iter()
                .zip(&in_degree)
                .filter(|(_, degree)| **degree > 0)
                .map(|(node, _)| node.label())
                .collect();
            log::error!("Cycle detected in graph {}", self.name);
            return Err(OrchestratorError::Connection(format!(
                "cycle detected in graph '{}' among [{}]",
                self.name,
                stuck.join(", ")
            )));
        }
        Ok(ordered)
    }

    /// Nodes that neither depend on anything nor feed anything.
    pub fn orphans(&self) -> Vec<InvocationId> {
        let adjacency = self.adjacency();
        self.nodes
            .iter()
            .enumerate()
            .filter(|(index, node)| node.inputs().is_empty() && adjacency[*index].is_empty())
            .map(|(_, node)| node.id())
            .collect()
    }

    /// Checks the structure once: no cycle, no orphan. Seals the graph on success.
    pub fn finalize(&mut self) -> Result<()> {
        if let Err(err) = self.topological_order() {
            self.state = GraphState::Failed;
            self.structure_rejected = true;
            return Err(OrchestratorError::Connection(format!(
                "validation of graph '{}' failed: {}",
                self.name,
                err.detail()
            )));
        }

        let orphans: Vec<String> = self
            .orphans()
            .into_iter()
            .map(|id| self.nodes[id.index()].label())
            .collect();
        if !orphans.is_empty() {
            self.state = GraphState::Failed;
            self.structure_rejected = true;
            log::error!("Orphan nodes detected in graph {}: {:?}", self.name, orphans);
            return Err(OrchestratorError::Connection(format!(
                "orphan nodes detected in graph '{}': [{}]",
                self.name,
                orphans.join(", ")
            )));
        }

        self.state = GraphState::Validated;
        self.structure_rejected = false;
        log::info!("Graph {} validated with {} nodes", self.name, self.nodes.len());
        Ok(())
    }

    /// Static data-flow check: are all required inputs reachable from `initial_keys` and upstreams?
    pub fn check<I, K>(&self, initial_keys: I) -> ValidationResult
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let mut result = ValidationResult::new();
        let order = match self.topological_order() {
            Ok(order) => order,
            Err(err) => {
                result.add_error(err.detail());
                return result;
            }
        };
        let initial: BTreeSet<String> = initial_keys.into_iter().map(Into::into).collect();

        for id in order {
            let node = &self.nodes[id.index()];
            let available: BTreeSet<String> = if node.inputs().is_empty() {
                initial.clone()
            } else {
                node.inputs()
                    .iter()
                    .flat_map(|up| self.nodes[up.index()].effective_output_keys())
                    .collect()
            };
            for key in node.input_descriptor().required().keys() {
                if !available.contains(key) {
                    result.add_error(format!(
                        "Node '{}' requires input '{}' which nothing upstream provides.",
                        node.label(),
                        key
                    ));
                }
            }
            for key in node.input_descriptor().optional().keys() {
                if !available.contains(key) {
                    result.add_warning(format!(
                        "Node '{}' reads optional input '{}' which nothing upstream provides.",
                        node.label(),
                        key
                    ));
                }
            }
        }

        for id in self.orphans() {
            result.add_warning(format!(
                "Node '{}' is an orphan: it has no dependencies and no dependents.",
                self.nodes[id.index()].label()
            ));
        }
        result
    }

    // ------------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------------

    /// Executes every node once in topological order and returns the merged outputs.
    ///
    /// Either every node succeeds and the complete mapping is returned, or the
    /// first failure aborts the run and is returned alone. A graph still being
    /// built is finalized first; no node runs when its structure is rejected.
    pub fn run(&mut self, initial_inputs: &FieldMap) -> Result<FieldMap> {
        if self.state == GraphState::Building {
            self.finalize()?;
        }
        if self.structure_rejected {
            log::error!("Graph {} has an invalid structure, refusing to run", self.name);
            return Err(OrchestratorError::Connection(format!(
                "graph '{}' failed structural validation and cannot run",
                self.name
            )));
        }

        log::info!(
            "Starting graph {} with initial inputs: {:?}",
            self.name,
            initial_inputs
        );
        let order = match self.topological_order() {
            Ok(order) => order,
            Err(err) => {
                self.state = GraphState::Failed;
                return Err(err);
            }
        };

        self.state = GraphState::Executing;
        let outcome = self.execute(&order, initial_inputs);
        if let Some(telemetry) = &self.telemetry {
            telemetry.flush();
        }

        match outcome {
            Ok(results) => {
                self.state = GraphState::Completed;
                log::info!("Graph {} completed with results: {:?}", self.name, results);
                Ok(results)
            }
            Err(err) => {
                self.state = GraphState::Failed;
                log::error!("Graph {} failed: {}", self.name, err);
                Err(err)
            }
        }
    }

    fn execute(&self, order: &[InvocationId], initial_inputs: &FieldMap) -> Result<FieldMap> {
        let mut memo: Vec<Option<FieldMap>> = vec![None; self.nodes.len()];

        for id in order {
            let node = &self.nodes[id.index()];
            let label = node.label();
            let inputs = Self::gather_inputs(node, &memo, initial_inputs);

            if let Err(err) = node.input_descriptor().validate_required(&inputs) {
                log::error!("Node {} rejected before dispatch: {}", label, err);
                return Err(OrchestratorError::Validation(format!(
                    "node '{}' cannot run: {}",
                    label,
                    err.detail()
                )));
            }

            log::debug!("Running node {}", label);
            let started = Instant::now();
            let outcome = node.prototype().run(&inputs);
            let elapsed = started.elapsed();

            let outputs = match outcome {
                Ok(outputs) => node.apply_alias(outputs),
                Err(err) => {
                    log::error!("Node {} failed: {}", label, err);
                    self.trace(node, &inputs, None, elapsed.as_millis(), Some(err.to_string()));
                    return Err(OrchestratorError::invocation(label, err));
                }
            };
            self.trace(node, &inputs, Some(&outputs), elapsed.as_millis(), None);
            memo[id.index()] = Some(outputs);
        }

        let mut results = if self.config.include_initial_inputs {
            initial_inputs.clone()
        } else {
            FieldMap::new()
        };
        for id in order {
            let Some(outputs) = memo[id.index()].take() else {
                continue;
            };
            for (key, value) in outputs {
                if results.insert(key.clone(), value).is_some() {
                    log::warn!(
                        "Output key {} from {} overwrote an earlier value",
                        key,
                        self.nodes[id.index()].label()
                    );
                }
            }
        }
        Ok(results)
    }

    /// Merged outputs of the upstream nodes, or the initial inputs for a source.
    fn gather_inputs(
        node: &NodeInvocation,
        memo: &[Option<FieldMap>],
        initial_inputs: &FieldMap,
    ) -> FieldMap {
        if node.inputs().is_empty() {
            return initial_inputs.clone();
        }
        let mut inputs = FieldMap::new();
        for up in node.inputs() {
            if let Some(outputs) = &memo[up.index()] {
                inputs.extend(outputs.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
        }
        inputs
    }

    fn trace(
        &self,
        node: &NodeInvocation,
        inputs: &FieldMap,
        outputs: Option<&FieldMap>,
        duration_ms: u128,
        error: Option<String>,
    ) {
        let Some(telemetry) = &self.telemetry else {
            return;
        };
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        telemetry.record(TraceEntry {
            timestamp,
            graph: self.name.clone(),
            node: node.label(),
            prototype: node.prototype().name().to_string(),
            inputs: to_object(inputs),
            outputs: outputs.map(to_object).unwrap_or(NodeValue::Null),
            duration_ms: u64::try_from(duration_ms).unwrap_or(u64::MAX),
            error,
        });
    }

    // ------------------------------------------------------------------------
    // Diagnostics
    // ------------------------------------------------------------------------

    /// Renders the dependency structure as an ASCII tree, one tree per root.
    ///
    /// ```text
    /// load
    /// ├── translate
    /// │   └── count
    /// └── summarize
    /// ```
    pub fn pretty_print(&self) -> String {
        let adjacency = self.adjacency();
        let mut out = String::new();
        for (index, root) in self.nodes.iter().enumerate() {
            if !root.inputs().is_empty() {
                continue;
            }
            out.push_str(&root.label());
            out.push('\n');
            let visited = HashSet::from([index]);
            let children = &adjacency[index];
            for (position, &child) in children.iter().enumerate() {
                let is_last = position + 1 == children.len();
                self.render_branch(&adjacency, child, "", is_last, visited.clone(), &mut out);
            }
        }
        out
    }

    fn render_branch(
        &self,
        adjacency: &[Vec<usize>],
        index: usize,
        prefix: &str,
        is_last: bool,
        mut visited: HashSet<usize>,
        out: &mut String,
    ) {
        let branch = if is_last { "└── " } else { "├── " };
        let label = self.nodes[index].label();
        if !visited.insert(index) {
            out.push_str(&format!("{}{}{} (cycle)\n", prefix, branch, label));
            return;
        }
        out.push_str(&format!("{}{}{}\n", prefix, branch, label));

        let child_prefix = format!("{}{}", prefix, if is_last { "    " } else { "│   " });
        let children = &adjacency[index];
        for (position, &child) in children.iter().enumerate() {
            let last_child = position + 1 == children.len();
            self.render_branch(
                adjacency,
                child,
                &child_prefix,
                last_child,
                visited.clone(),
                out,
            );
        }
    }
}

fn to_object(fields: &FieldMap) -> NodeValue {
    NodeValue::Object(
        fields
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    )
}

impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pretty_print())
    }
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("nodes", &self.nodes.iter().map(|n| n.label()).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
