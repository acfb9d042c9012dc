//! Ollama LLM client for local inference

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::generation::{GenerationOptions, Message};
use crate::llm::error::LlmError;

/// Configuration for Ollama client
#[derive(Clone, Debug, PartialEq)]
pub struct OllamaConfig {
    /// Ollama server URL (default: http://localhost:11434)
    pub host: String,
    /// Default model to use (default: phi4)
    pub default_model: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost:11434".to_string(),
            default_model: "phi4".to_string(),
        }
    }
}

impl OllamaConfig {
    /// Reads `OLLAMA_HOST` and `OLLAMA_MODEL`, falling back to the defaults.
    pub fn from_env() -> Self {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    pub fn from_env_with(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            host: lookup("OLLAMA_HOST").unwrap_or(defaults.host),
            default_model: lookup("OLLAMA_MODEL").unwrap_or(defaults.default_model),
        }
    }
}

/// Request structure for Ollama chat completions
#[derive(Debug, Serialize)]
pub struct OllamaChatRequest {
    pub model: String,
    pub messages: Vec<OllamaMessage>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<OllamaOptions>,
}

/// A message in Ollama's chat format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaMessage {
    pub role: String,
    pub content: String,
}

impl From<&Message> for OllamaMessage {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role.as_str().to_string(),
            content: message.content.clone(),
        }
    }
}

/// Options for Ollama generation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_predict: Option<u32>,
}

/// Response from Ollama's chat endpoint
#[derive(Debug, Deserialize)]
pub struct OllamaChatResponse {
    pub model: String,
    pub created_at: DateTime<Utc>,
    pub message: OllamaMessage,
    pub done: bool,
    #[serde(default)]
    pub total_duration: u64,
    #[serde(default)]
    pub eval_count: u32,
}

pub(crate) fn build_request(
    config: &OllamaConfig,
    messages: &[Message],
    options: &GenerationOptions,
) -> OllamaChatRequest {
    let sampling = OllamaOptions {
        temperature: options.temperature,
        num_predict: options.max_tokens,
    };
    let has_sampling = sampling.temperature.is_some() || sampling.num_predict.is_some();
    OllamaChatRequest {
        model: options
            .model
            .clone()
            .unwrap_or_else(|| config.default_model.clone()),
        messages: messages.iter().map(OllamaMessage::from).collect(),
        stream: false,
        options: has_sampling.then_some(sampling),
    }
}

/// Call Ollama's chat endpoint and return the reply text
pub(crate) fn chat(
    http: &reqwest::blocking::Client,
    config: &OllamaConfig,
    messages: &[Message],
    options: &GenerationOptions,
) -> Result<String, LlmError> {
    let request = build_request(config, messages, options);
    log::debug!("Ollama chat with model {}", request.model);

    let response = http
        .post(format!("{}/api/chat", config.host))
        .json(&request)
        .send()?;

    if !response.status().is_success() {
        let status = response.status();
        let error_text = response.text().unwrap_or_default();
        return Err(LlmError::OllamaError(format!(
            "HTTP {}: {}",
            status, error_text
        )));
    }

    let chat_response: OllamaChatResponse = response.json()?;
    if !chat_response.done {
        return Err(LlmError::InvalidResponse(
            "Ollama returned an unfinished response".to_string(),
        ));
    }
    Ok(chat_response.message.content)
}
