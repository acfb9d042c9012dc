use crate::core::descriptor::TypeDescriptor;
use crate::core::error::{OrchestratorError, Result};
use crate::core::prototype::{NodeLogic, NodePrototype};
use crate::core::{BoxError, FieldMap, NodeValue};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Input field a generation-backed node reads its conversation from.
pub const MESSAGES_FIELD: &str = "messages";

/// Author of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A message in a conversation handed to a generation capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Options for a single generation call.
///
/// `extra` carries every node input other than the conversation itself.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationOptions {
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub extra: FieldMap,
}

impl GenerationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the model for this call (overrides the capability default)
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the sampling temperature
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the maximum number of tokens to generate
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Anything able to turn a conversation into text.
///
/// Calls are synchronous and may block; there is no built-in timeout.
pub trait GenerationCapability: Send + Sync {
    fn generate(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> std::result::Result<String, BoxError>;
}

impl<F> GenerationCapability for F
where
    F: Fn(&[Message], &GenerationOptions) -> std::result::Result<String, BoxError> + Send + Sync,
{
    fn generate(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> std::result::Result<String, BoxError> {
        self(messages, options)
    }
}

/// A failure reported by the generation capability.
#[derive(Debug, Error)]
#[error("generation failed: {0}")]
pub struct GenerationFailed(#[source] pub BoxError);

/// Node logic that delegates to a generation capability.
#[derive(Clone)]
struct GenerationLogic {
    output_key: String,
    capability: Arc<dyn GenerationCapability>,
    options: GenerationOptions,
}

impl GenerationLogic {
    fn read_messages(raw: &NodeValue) -> Result<Vec<Message>> {
        if let Some(text) = raw.as_str() {
            return Ok(vec![Message::user(text)]);
        }
        serde_json::from_value(raw.clone()).map_err(|err| {
            OrchestratorError::Validation(format!(
                "'{}' must be a list of {{role, content}} messages: {}",
                MESSAGES_FIELD, err
            ))
        })
    }
}

impl NodeLogic for GenerationLogic {
    fn exec(&self, inputs: &FieldMap) -> std::result::Result<FieldMap, BoxError> {
        let raw = inputs.get(MESSAGES_FIELD).ok_or_else(|| {
            OrchestratorError::Validation(format!(
                "expected '{}' to call the generation capability",
                MESSAGES_FIELD
            ))
        })?;
        let messages = Self::read_messages(raw)?;

        let mut options = self.options.clone();
        options.extra = inputs
            .iter()
            .filter(|(key, _)| key.as_str() != MESSAGES_FIELD)
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        let text = self
            .capability
            .generate(&messages, &options)
            .map_err(GenerationFailed)?;

        let mut outputs = FieldMap::new();
        outputs.insert(self.output_key.clone(), NodeValue::String(text));
        Ok(outputs)
    }
}

impl fmt::Debug for GenerationLogic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationLogic")
            .field("output_key", &self.output_key)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Builder for prototypes whose body is a generation call.
pub struct GenerationNodeBuilder {
    name: String,
    inputs: TypeDescriptor,
    outputs: TypeDescriptor,
    capability: Arc<dyn GenerationCapability>,
    options: GenerationOptions,
}

impl GenerationNodeBuilder {
    pub fn new(name: impl Into<String>, capability: Arc<dyn GenerationCapability>) -> Self {
        Self {
            name: name.into(),
            inputs: TypeDescriptor::new(),
            outputs: TypeDescriptor::new(),
            capability,
            options: GenerationOptions::default(),
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

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.options.model = Some(model.into());
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.options.temperature = Some(temperature);
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.options.max_tokens = Some(max_tokens);
        self
    }

    /// Builds the prototype; exactly one output field must be declared.
    pub fn build(self) -> Result<NodePrototype> {
        let output_keys = self.outputs.all_keys();
        if output_keys.len() != 1 {
            return Err(OrchestratorError::Configuration(format!(
                "generation node '{}' must declare exactly 1 output, found [{}]",
                self.name,
                output_keys.into_iter().collect::<Vec<_>>().join(", ")
            )));
        }
        let output_key = output_keys.into_iter().next().unwrap_or_default();
        let logic = GenerationLogic {
            output_key,
            capability: self.capability,
            options: self.options,
        };
        Ok(NodePrototype::from_logic(
            self.name,
            self.inputs,
            self.outputs,
            logic,
        ))
    }
}

impl NodePrototype {
    /// A prototype whose body asks `capability` for text and returns it under its
    /// single output key.
    pub fn generation(
        name: impl Into<String>,
        inputs: TypeDescriptor,
        outputs: TypeDescriptor,
        capability: Arc<dyn GenerationCapability>,
    ) -> Result<NodePrototype> {
        GenerationNodeBuilder::new(name, capability)
            .inputs(inputs)
            .outputs(outputs)
            .build()
    }
}
