//! LLM client module for Owlgraph
//!
//! This module provides a blocking client over a closed set of providers.
//! The provider is resolved once, when the client is built, and every call
//! goes straight to it. [`LlmClient`] implements
//! [`GenerationCapability`](crate::GenerationCapability), so it can back a
//! generation node directly.
//!
//! Requests use `reqwest`'s blocking client: do not call them from inside an
//! async runtime.

pub mod deepseek;
pub mod error;
pub mod gemini;
pub mod ollama;

pub use deepseek::DeepSeekConfig;
pub use error::LlmError;
pub use gemini::GeminiConfig;
pub use ollama::OllamaConfig;

use crate::core::BoxError;
use crate::core::generation::{GenerationCapability, GenerationOptions, Message};

/// A configured generation provider.
#[derive(Clone, Debug, PartialEq)]
pub enum Provider {
    Ollama(OllamaConfig),
    DeepSeek(DeepSeekConfig),
    Gemini(GeminiConfig),
}

impl Provider {
    /// Resolves `name` (`ollama`, `deepseek` or `gemini`, case-insensitive) with config
    /// from the environment.
    pub fn from_name(name: &str) -> Result<Self, LlmError> {
        Self::from_name_with(name, |key| std::env::var(key).ok())
    }

    pub fn from_name_with(
        name: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, LlmError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(Provider::Ollama(OllamaConfig::from_env_with(lookup))),
            "deepseek" => Ok(Provider::DeepSeek(DeepSeekConfig::from_env_with(lookup)?)),
            "gemini" | "google" => Ok(Provider::Gemini(GeminiConfig::from_env_with(lookup)?)),
            _ => Err(LlmError::UnknownProvider(name.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Provider::Ollama(_) => "ollama",
            Provider::DeepSeek(_) => "deepseek",
            Provider::Gemini(_) => "gemini",
        }
    }

    /// Model used when the call options do not name one.
    pub fn default_model(&self) -> &str {
        match self {
            Provider::Ollama(config) => &config.default_model,
            Provider::DeepSeek(config) => &config.default_model,
            Provider::Gemini(config) => &config.default_model,
        }
    }
}

/// LLM client wrapper around reqwest::blocking::Client
#[derive(Clone, Debug)]
pub struct LlmClient {
    http: reqwest::blocking::Client,
    provider: Provider,
}

impl LlmClient {
    pub fn new(provider: Provider) -> Self {
        Self {
            http: reqwest::blocking::Client::new(),
            provider,
        }
    }

    /// Ollama with the default host (http://localhost:11434) and default model (phi4)
    pub fn ollama() -> Self {
        Self::new(Provider::Ollama(OllamaConfig::default()))
    }

    /// Ollama with a custom host URL
    pub fn ollama_at(host: impl Into<String>) -> Self {
        Self::new(Provider::Ollama(OllamaConfig {
            host: host.into(),
            ..Default::default()
        }))
    }

    pub fn deepseek(api_key: impl Into<String>) -> Self {
        Self::new(Provider::DeepSeek(DeepSeekConfig::new(api_key)))
    }

    pub fn gemini(api_key: impl Into<String>) -> Self {
        Self::new(Provider::Gemini(GeminiConfig::new(api_key)))
    }

    /// Resolves the provider by name, reading its config from the environment.
    pub fn from_env(provider: &str) -> Result<Self, LlmError> {
        Ok(Self::new(Provider::from_name(provider)?))
    }

    pub fn provider(&self) -> &Provider {
        &self.provider
    }

    /// Sends the conversation to the provider and returns the reply text.
    pub fn complete(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<String, LlmError> {
        log::debug!(
            "Calling {} with {} message(s)",
            self.provider.name(),
            messages.len()
        );
        let result = match &self.provider {
            Provider::Ollama(config) => ollama::chat(&self.http, config, messages, options),
            Provider::DeepSeek(config) => deepseek::chat(&self.http, config, messages, options),
            Provider::Gemini(config) => gemini::chat(&self.http, config, messages, options),
        };
        if let Err(err) = &result {
            log::error!("{} call failed: {}", self.provider.name(), err);
        }
        result
    }
}

impl GenerationCapability for LlmClient {
    fn generate(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<String, BoxError> {
        Ok(self.complete(messages, options)?)
    }
}
