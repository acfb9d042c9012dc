//! DeepSeek LLM client
//!
//! DeepSeek uses an OpenAI-compatible API, making integration straightforward.

use serde::{Deserialize, Serialize};

use crate::core::generation::{GenerationOptions, Message};
use crate::llm::error::LlmError;

/// Configuration for DeepSeek client
#[derive(Clone, Debug, PartialEq)]
pub struct DeepSeekConfig {
    /// API key for authentication
    pub api_key: String,
    /// Base URL (default: https://api.deepseek.com)
    pub base_url: String,
    /// Default model to use (default: deepseek-chat)
    pub default_model: String,
}

impl Default for DeepSeekConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.deepseek.com".to_string(),
            default_model: "deepseek-chat".to_string(),
        }
    }
}

impl DeepSeekConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Default::default()
        }
    }

    /// Reads `DEEPSEEK_API_KEY` (required), `DEEPSEEK_BASE_URL` and `DEEPSEEK_MODEL`.
    pub fn from_env() -> Result<Self, LlmError> {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    pub fn from_env_with(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, LlmError> {
        let api_key = lookup("DEEPSEEK_API_KEY")
            .filter(|key| !key.is_empty())
            .ok_or(LlmError::MissingApiKey("DEEPSEEK_API_KEY"))?;
        let defaults = Self::default();
        Ok(Self {
            api_key,
            base_url: lookup("DEEPSEEK_BASE_URL").unwrap_or(defaults.base_url),
            default_model: lookup("DEEPSEEK_MODEL").unwrap_or(defaults.default_model),
        })
    }
}

/// Request structure for DeepSeek chat completions
#[derive(Debug, Serialize)]
pub struct DeepSeekRequest {
    pub model: String,
    pub messages: Vec<DeepSeekMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    pub stream: bool,
}

/// A message in DeepSeek's chat format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeepSeekMessage {
    pub role: String,
    pub content: String,
}

impl From<&Message> for DeepSeekMessage {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role.as_str().to_string(),
            content: message.content.clone(),
        }
    }
}

/// Response from DeepSeek chat completions
#[derive(Debug, Deserialize)]
pub struct DeepSeekResponse {
    pub id: String,
    pub model: String,
    pub choices: Vec<DeepSeekChoice>,
    pub usage: Option<DeepSeekUsage>,
}

#[derive(Debug, Deserialize)]
pub struct DeepSeekChoice {
    pub index: u32,
    pub message: DeepSeekMessage,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeepSeekUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

pub(crate) fn build_request(
    config: &DeepSeekConfig,
    messages: &[Message],
    options: &GenerationOptions,
) -> DeepSeekRequest {
    DeepSeekRequest {
        model: options
            .model
            .clone()
            .unwrap_or_else(|| config.default_model.clone()),
        messages: messages.iter().map(DeepSeekMessage::from).collect(),
        temperature: options.temperature,
        max_tokens: options.max_tokens,
        stream: false,
    }
}

/// Call DeepSeek's chat completion API and return the first choice
pub(crate) fn chat(
    http: &reqwest::blocking::Client,
    config: &DeepSeekConfig,
    messages: &[Message],
    options: &GenerationOptions,
) -> Result<String, LlmError> {
    let request = build_request(config, messages, options);
    log::debug!("DeepSeek chat with model {}", request.model);

    let response = http
        .post(format!("{}/v1/chat/completions", config.base_url))
        .header("Authorization", format!("Bearer {}", config.api_key))
        .header("Content-Type", "application/json")
        .json(&request)
        .send()?;

    if !response.status().is_success() {
        let status = response.status();
        let error_text = response.text().unwrap_or_default();
        return Err(LlmError::DeepSeekError(format!(
            "HTTP {}: {}",
            status, error_text
        )));
    }

    let deepseek_response: DeepSeekResponse = response.json()?;
    first_choice(deepseek_response)
}

fn first_choice(response: DeepSeekResponse) -> Result<String, LlmError> {
    response
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content)
        .ok_or_else(|| LlmError::InvalidResponse("DeepSeek returned no choices".to_string()))
}
