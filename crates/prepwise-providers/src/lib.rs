//! Text-generation provider abstraction.
//!
//! Each provider implements the [`LlmProvider`] trait to stream completions
//! from a hosted model API. Callers that only need the final text use
//! [`generate_text`], which drains the stream.

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio_stream::StreamExt;
use tracing::debug;

use prepwise_core::config::{Config, ProviderConfig};

pub mod google;
pub mod openai;
pub mod sse;

/// Credentials for authenticating with an LLM provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Credentials {
    #[serde(rename = "api_key")]
    ApiKey { api_key: String },
    /// Local providers (Ollama) need no key.
    #[serde(rename = "none")]
    None,
}

/// A request to the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<serde_json::Value>,
    pub max_tokens: u32,
    pub temperature: Option<f64>,
    pub system: Option<String>,
}

impl CompletionRequest {
    /// Single-turn request built from a plain prompt, using the generation settings in `config`.
    pub fn from_prompt(provider: &dyn LlmProvider, config: &Config, prompt: &str) -> Self {
        Self {
            model: config.default_model(),
            messages: provider.format_prompt(prompt),
            max_tokens: config.max_tokens(),
            temperature: config.temperature(),
            system: None,
        }
    }
}

/// A streamed chunk from the LLM.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionChunk {
    pub delta: Option<String>,
    pub stop_reason: Option<String>,
}

pub type ChunkStream = Pin<Box<dyn Stream<Item = anyhow::Result<CompletionChunk>> + Send>>;

/// The core LLM provider trait.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider identifier (e.g., "google", "openai").
    fn id(&self) -> &str;

    /// Wrap a single user prompt in the provider's message format.
    fn format_prompt(&self, prompt: &str) -> Vec<serde_json::Value>;

    /// Stream a completion.
    async fn stream(
        &self,
        request: &CompletionRequest,
        credentials: &Credentials,
    ) -> anyhow::Result<ChunkStream>;
}

/// Run a completion to the end and return the concatenated text.
pub async fn generate_text(
    provider: &dyn LlmProvider,
    request: &CompletionRequest,
    credentials: &Credentials,
) -> anyhow::Result<String> {
    let mut stream = provider.stream(request, credentials).await?;
    let mut text = String::new();
    let mut stop_reason = None;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if let Some(delta) = chunk.delta {
            text.push_str(&delta);
        }
        if chunk.stop_reason.is_some() {
            stop_reason = chunk.stop_reason;
        }
    }

    debug!(
        provider = provider.id(),
        chars = text.len(),
        stop_reason = stop_reason.as_deref().unwrap_or("none"),
        "Generation complete"
    );
    Ok(text)
}

/// A provider paired with the credentials it should be called with.
#[derive(Clone)]
pub struct ProviderHandle {
    pub provider: Arc<dyn LlmProvider>,
    pub credentials: Credentials,
}

impl ProviderHandle {
    pub fn new(provider: Arc<dyn LlmProvider>, credentials: Credentials) -> Self {
        Self {
            provider,
            credentials,
        }
    }

    /// Build a single-prompt request and return the generated text.
    pub async fn generate(&self, config: &Config, prompt: &str) -> anyhow::Result<String> {
        let request = CompletionRequest::from_prompt(self.provider.as_ref(), config, prompt);
        generate_text(self.provider.as_ref(), &request, &self.credentials).await
    }
}

/// Construct a provider from its config entry.
pub fn build_provider(config: &ProviderConfig) -> anyhow::Result<ProviderHandle> {
    let base_url = config.base_url.as_deref();
    let provider: Arc<dyn LlmProvider> = match config.id.as_str() {
        "google" | "gemini" => Arc::new(google::GeminiProvider::new(base_url)),
        "openai" => Arc::new(openai::OpenAiProvider::openai(base_url)),
        "openrouter" => Arc::new(openai::OpenAiProvider::openrouter(base_url)),
        "ollama" => Arc::new(openai::OpenAiProvider::ollama(base_url)),
        other => anyhow::bail!("Unknown provider id: {other}"),
    };

    let credentials = match config.resolve_api_key() {
        Some(api_key) => Credentials::ApiKey { api_key },
        None if config.id == "ollama" => Credentials::None,
        None => anyhow::bail!("Provider '{}' has no API key configured", config.id),
    };

    Ok(ProviderHandle::new(provider, credentials))
}

/// Construct the first configured provider.
pub fn build_default_provider(config: &Config) -> anyhow::Result<ProviderHandle> {
    let provider_config = config
        .first_provider()
        .ok_or_else(|| anyhow::anyhow!("No LLM provider configured under models.providers"))?;
    build_provider(provider_config)
}
