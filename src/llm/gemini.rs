//! Google Gemini LLM client
//!
//! Supports the Gemini API for text generation.

use serde::{Deserialize, Serialize};

use crate::core::generation::{GenerationOptions, Message, Role};
use crate::llm::error::LlmError;

/// Configuration for Gemini client
#[derive(Clone, Debug, PartialEq)]
pub struct GeminiConfig {
    /// API key for authentication
    pub api_key: String,
    /// Base URL (default: https://generativelanguage.googleapis.com)
    pub base_url: String,
    /// Default model to use (default: gemini-2.0-flash)
    pub default_model: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            default_model: "gemini-2.0-flash".to_string(),
        }
    }
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Default::default()
        }
    }

    /// Reads `GEMINI_API_KEY` (required), `GEMINI_BASE_URL` and `GEMINI_MODEL`.
    pub fn from_env() -> Result<Self, LlmError> {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    pub fn from_env_with(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, LlmError> {
        let api_key = lookup("GEMINI_API_KEY")
            .filter(|key| !key.is_empty())
            .ok_or(LlmError::MissingApiKey("GEMINI_API_KEY"))?;
        let defaults = Self::default();
        Ok(Self {
            api_key,
            base_url: lookup("GEMINI_BASE_URL").unwrap_or(defaults.base_url),
            default_model: lookup("GEMINI_MODEL").unwrap_or(defaults.default_model),
        })
    }
}

/// Request structure for Gemini generate content
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiRequest {
    pub contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GeminiGenerationConfig>,
}

/// Content structure for Gemini
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub parts: Vec<GeminiPart>,
}

/// A part of content (text, image, etc.)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiPart {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl GeminiContent {
    fn with_role(role: Option<&str>, text: impl Into<String>) -> Self {
        Self {
            role: role.map(str::to_string),
            parts: vec![GeminiPart {
                text: Some(text.into()),
            }],
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::with_role(Some("user"), text)
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self::with_role(Some("model"), text)
    }

    pub fn system(text: impl Into<String>) -> Self {
        // System instructions don't have a role
        Self::with_role(None, text)
    }

    /// Concatenated text of every part.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| part.text.as_deref())
            .collect()
    }
}

/// Generation configuration for Gemini
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
}

/// Response from Gemini generate content
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiResponse {
    #[serde(default)]
    pub candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    pub usage_metadata: Option<GeminiUsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiCandidate {
    pub content: GeminiContent,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiUsageMetadata {
    #[serde(default)]
    pub prompt_token_count: u32,
    #[serde(default)]
    pub candidates_token_count: u32,
    #[serde(default)]
    pub total_token_count: u32,
}

/// System messages become the system instruction; assistant turns use the `model` role.
pub(crate) fn build_request(messages: &[Message], options: &GenerationOptions) -> GeminiRequest {
    let mut system = Vec::new();
    let mut contents = Vec::new();
    for message in messages {
        match message.role {
            Role::System => system.push(message.content.as_str()),
            Role::User => contents.push(GeminiContent::user(message.content.clone())),
            Role::Assistant => contents.push(GeminiContent::model(message.content.clone())),
        }
    }

    let generation_config = (options.temperature.is_some() || options.max_tokens.is_some())
        .then(|| GeminiGenerationConfig {
            temperature: options.temperature,
            max_output_tokens: options.max_tokens,
        });

    GeminiRequest {
        contents,
        system_instruction: (!system.is_empty()).then(|| GeminiContent::system(system.join("\n"))),
        generation_config,
    }
}

/// Call Gemini's generateContent endpoint and return the first candidate's text
pub(crate) fn chat(
    http: &reqwest::blocking::Client,
    config: &GeminiConfig,
    messages: &[Message],
    options: &GenerationOptions,
) -> Result<String, LlmError> {
    let model = options.model.as_deref().unwrap_or(&config.default_model);
    log::debug!("Gemini generateContent with model {}", model);

    let url = format!(
        "{}/v1beta/models/{}:generateContent?key={}",
        config.base_url, model, config.api_key
    );
    let request = build_request(messages, options);

    let response = http
        .post(&url)
        .header("Content-Type", "application/json")
        .json(&request)
        .send()?;

    if !response.status().is_success() {
        let status = response.status();
        let error_text = response.text().unwrap_or_default();
        return Err(LlmError::GeminiError(format!(
            "HTTP {}: {}",
            status, error_text
        )));
    }

    let gemini_response: GeminiResponse = response.json()?;
    first_candidate(gemini_response)
}

fn first_candidate(response: GeminiResponse) -> Result<String, LlmError> {
    response
        .candidates
        .first()
        .map(|candidate| candidate.content.text())
        .ok_or_else(|| LlmError::InvalidResponse("Gemini returned no candidates".to_string()))
}
