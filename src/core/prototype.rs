use crate::core::descriptor::TypeDescriptor;
use crate::core::error::{OrchestratorError, Result};
use crate::core::{BoxError, FieldMap};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Defines the behavior of a node: a function from an input mapping to an output mapping.
///
/// Closures of the shape `Fn(&FieldMap) -> Result<FieldMap, BoxError>` implement
/// this trait already; implement it by hand for logic that carries state.
pub trait NodeLogic: Send + Sync + 'static {
    /// Execute the core logic of the node.
    fn exec(&self, inputs: &FieldMap) -> std::result::Result<FieldMap, BoxError>;
}

impl<F> NodeLogic for F
where
    F: Fn(&FieldMap) -> std::result::Result<FieldMap, BoxError> + Send + Sync + 'static,
{
    fn exec(&self, inputs: &FieldMap) -> std::result::Result<FieldMap, BoxError> {
        self(inputs)
    }
}

/// An immutable unit of work: a name, typed input and output contracts, and a body.
///
/// Prototypes are shared (usually behind an `Arc`) between every graph
/// position that uses them; the body itself is reference counted so cloning
/// a prototype never copies the logic.
#[derive(Clone)]
pub struct NodePrototype {
    name: String,
    inputs: TypeDescriptor,
    outputs: TypeDescriptor,
    logic: Arc<dyn NodeLogic>,
}

impl NodePrototype {
    /// Creates a prototype from a closure body.
    pub fn new<F>(
        name: impl Into<String>,
        inputs: TypeDescriptor,
        outputs: TypeDescriptor,
        body: F,
    ) -> Self
    where
        F: Fn(&FieldMap) -> std::result::Result<FieldMap, BoxError> + Send + Sync + 'static,
    {
        Self::from_logic(name, inputs, outputs, body)
    }

    /// Creates a prototype from any [`NodeLogic`] implementation.
    pub fn from_logic<L: NodeLogic>(
        name: impl Into<String>,
        inputs: TypeDescriptor,
        outputs: TypeDescriptor,
        logic: L,
    ) -> Self {
        Self::from_shared_logic(name, inputs, outputs, Arc::new(logic))
    }

    pub(crate) fn from_shared_logic(
        name: impl Into<String>,
        inputs: TypeDescriptor,
        outputs: TypeDescriptor,
        logic: Arc<dyn NodeLogic>,
    ) -> Self {
        Self {
            name: name.into(),
            inputs,
            outputs,
            logic,
        }
    }

    /// A placeholder node that hands its inputs straight back as outputs.
    pub fn passthrough(
        name: impl Into<String>,
        inputs: TypeDescriptor,
        outputs: TypeDescriptor,
    ) -> Self {
        Self::new(name, inputs, outputs, |inputs: &FieldMap| Ok(inputs.clone()))
    }

    pub fn builder(name: impl Into<String>) -> NodePrototypeBuilder {
        NodePrototypeBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn input_descriptor(&self) -> &TypeDescriptor {
        &self.inputs
    }

    pub fn output_descriptor(&self) -> &TypeDescriptor {
        &self.outputs
    }

    pub fn input_keys(&self) -> BTreeSet<String> {
        self.inputs.all_keys()
    }

    pub fn output_keys(&self) -> BTreeSet<String> {
        self.outputs.all_keys()
    }

    /// Checks that `upstream` produces every input this node requires.
    pub fn validate_connection(&self, upstream: &NodePrototype) -> Result<()> {
        self.check_provided_keys(&upstream.name, &upstream.output_keys())
    }

    pub(crate) fn check_provided_keys(
        &self,
        upstream: &str,
        provided: &BTreeSet<String>,
    ) -> Result<()> {
        let missing: Vec<&str> = self
            .inputs
            .required()
            .keys()
            .filter(|key| !provided.contains(*key))
            .map(String::as_str)
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        log::error!(
            "Connection error {} -> {}: missing [{}]",
            upstream,
            self.name,
            missing.join(", ")
        );
        Err(OrchestratorError::Connection(format!(
            "cannot connect {} -> {}: missing keys [{}]",
            upstream,
            self.name,
            missing.join(", ")
        )))
    }

    /// Executes the node: validate inputs, run the body, validate outputs.
    pub fn run(&self, inputs: &FieldMap) -> Result<FieldMap> {
        log::debug!("Node {} starting with inputs: {:?}", self.name, inputs);

        if let Err(err) = self.inputs.validate(inputs) {
            log::error!("Input validation failed for {}: {}", self.name, err);
            return Err(OrchestratorError::Validation(format!(
                "input validation for '{}' failed: {}",
                self.name,
                err.detail()
            )));
        }

        let outputs = match self.logic.exec(inputs) {
            Ok(outputs) => outputs,
            Err(err) => return Err(self.classify_failure(err)),
        };

        if let Err(err) = self.outputs.validate(&outputs) {
            log::error!("Output validation failed for {}: {}", self.name, err);
            return Err(OrchestratorError::Validation(format!(
                "output validation for '{}' failed: {}",
                self.name,
                err.detail()
            )));
        }

        log::debug!("Node {} completed with outputs: {:?}", self.name, outputs);
        Ok(outputs)
    }

    /// Typed errors raised by the body keep their kind; anything else is an execution failure.
    fn classify_failure(&self, err: BoxError) -> OrchestratorError {
        match err.downcast::<OrchestratorError>() {
            Ok(typed) => match *typed {
                OrchestratorError::Validation(msg) => {
                    log::error!("Node {} rejected its inputs: {}", self.name, msg);
                    OrchestratorError::Validation(format!("node '{}': {}", self.name, msg))
                }
                other => {
                    log::error!("Execution error in {}: {}", self.name, other);
                    other
                }
            },
            Err(untyped) => {
                log::error!("Execution error in {}: {}", self.name, untyped);
                OrchestratorError::execution(self.name.clone(), untyped)
            }
        }
    }

    /// Returns a copy with the same contracts and body under a new name.
    pub fn clone_as(&self, name: impl Into<String>) -> NodePrototype {
        NodePrototype {
            name: name.into(),
            inputs: self.inputs.clone(),
            outputs: self.outputs.clone(),
            logic: Arc::clone(&self.logic),
        }
    }
}

impl fmt::Debug for NodePrototype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodePrototype")
            .field("name", &self.name)
            .field("inputs", &self.inputs.to_string())
            .field("outputs", &self.outputs.to_string())
            .finish_non_exhaustive()
    }
}

/// Builder for [`NodePrototype`], for declarations assembled in several steps.
pub struct NodePrototypeBuilder {
    name: String,
    inputs: TypeDescriptor,
    outputs: TypeDescriptor,
    logic: Option<Arc<dyn NodeLogic>>,
}

impl NodePrototypeBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inputs: TypeDescriptor::new(),
            outputs: TypeDescriptor::new(),
            logic: None,
        }
    }

    pub fn inputs(mut self, inputs: TypeDescriptor) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn outputs(mut self, outputs: TypeDescriptor) -> Self {
        self.outputs = outputs;
        self
    }

    pub fn body<F>(mut self, body: F) -> Self
    where
        F: Fn(&FieldMap) -> std::result::Result<FieldMap, BoxError> + Send + Sync + 'static,
    {
        let logic: Arc<dyn NodeLogic> = Arc::new(body);
        self.logic = Some(logic);
        self
    }

    pub fn logic<L: NodeLogic>(mut self, logic: L) -> Self {
        let logic: Arc<dyn NodeLogic> = Arc::new(logic);
        self.logic = Some(logic);
        self
    }

    pub fn build(self) -> Result<NodePrototype> {
        if self.name.trim().is_empty() {
            return Err(OrchestratorError::Configuration(
                "node name cannot be empty".to_string(),
            ));
        }
        let logic = self.logic.ok_or_else(|| {
            OrchestratorError::Configuration(format!(
                "a body must be provided for node '{}'",
                self.name
            ))
        })?;
        Ok(NodePrototype::from_shared_logic(
            self.name,
            self.inputs,
            self.outputs,
            logic,
        ))
    }
}
