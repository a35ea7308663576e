//! OpenAI Chat Completions API provider.
//!
//! Implements streaming chat completions via `/v1/chat/completions`.
//! Also serves OpenRouter and Ollama, which speak the same protocol.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_stream::StreamExt;
use tracing::{debug, trace};

use crate::sse::{SseEvent, parse_sse_stream};
use crate::{ChunkStream, CompletionChunk, CompletionRequest, Credentials, LlmProvider};

const OPENAI_BASE_URL: &str = "https://api.openai.com";
const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api";
const OLLAMA_BASE_URL: &str = "http://localhost:11434";

/// Which OpenAI-compatible API is being called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiStyle {
    OpenAi,
    OpenRouter,
    Ollama,
}

pub struct OpenAiProvider {
    pub base_url: String,
    pub api_style: ApiStyle,
    provider_id: String,
    client: reqwest::Client,
}

impl OpenAiProvider {
    fn with_style(base_url: Option<&str>, default_url: &str, style: ApiStyle, id: &str) -> Self {
        Self {
            base_url: base_url
                .unwrap_or(default_url)
                .trim_end_matches('/')
                .to_string(),
            api_style: style,
            provider_id: id.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn openai(base_url: Option<&str>) -> Self {
        Self::with_style(base_url, OPENAI_BASE_URL, ApiStyle::OpenAi, "openai")
    }

    pub fn openrouter(base_url: Option<&str>) -> Self {
        Self::with_style(base_url, OPENROUTER_BASE_URL, ApiStyle::OpenRouter, "openrouter")
    }

    pub fn ollama(base_url: Option<&str>) -> Self {
        Self::with_style(base_url, OLLAMA_BASE_URL, ApiStyle::Ollama, "ollama")
    }

    /// Attach auth headers for the configured style.
    fn authorize(
        &self,
        mut builder: reqwest::RequestBuilder,
        credentials: &Credentials,
    ) -> anyhow::Result<reqwest::RequestBuilder> {
        match (credentials, self.api_style) {
            (Credentials::ApiKey { api_key }, _) => {
                builder = builder.header("authorization", format!("Bearer {api_key}"));
            }
            (Credentials::None, ApiStyle::Ollama) => {}
            (Credentials::None, _) => {
                anyhow::bail!("{} requires ApiKey credentials", self.provider_id)
            }
        }
        if self.api_style == ApiStyle::OpenRouter {
            builder = builder.header("HTTP-Referer", "https://prepwise.app");
        }
        Ok(builder)
    }
}

// --- OpenAI request/response types ---

#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<serde_json::Value>,
    max_tokens: u32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Outcome of one SSE payload.
enum Decoded {
    Chunk(CompletionChunk),
    Skip,
    Done,
}

fn decode_event(data: &str) -> Decoded {
    // OpenAI terminates with "data: [DONE]"
    if data == "[DONE]" {
        return Decoded::Done;
    }

    let chunk: ChatCompletionChunk = match serde_json::from_str(data) {
        Ok(c) => c,
        Err(e) => {
            trace!(%e, data, "Failed to parse OpenAI chunk");
            return Decoded::Skip;
        }
    };

    let (delta, stop_reason) = match chunk.choices.into_iter().next() {
        Some(choice) => (
            choice.delta.content.filter(|c| !c.is_empty()),
            choice.finish_reason,
        ),
        None => (None, None),
    };

    if delta.is_none() && stop_reason.is_none() {
        return Decoded::Skip;
    }

    Decoded::Chunk(CompletionChunk { delta, stop_reason })
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn id(&self) -> &str {
        &self.provider_id
    }

    fn format_prompt(&self, prompt: &str) -> Vec<serde_json::Value> {
        vec![json!({ "role": "user", "content": prompt })]
    }

    async fn stream(
        &self,
        request: &CompletionRequest,
        credentials: &Credentials,
    ) -> anyhow::Result<ChunkStream> {
        let mut messages = Vec::new();
        if let Some(ref system) = request.system {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.extend(request.messages.iter().cloned());

        let body = OpenAiRequest {
            model: request.model.clone(),
            messages,
            max_tokens: request.max_tokens,
            stream: true,
            temperature: request.temperature,
        };

        debug!(model = %body.model, base_url = %self.base_url, "Streaming OpenAI-compatible API");

        let builder = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header("content-type", "application/json");
        let response = self.authorize(builder, credentials)?.json(&body).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI API error {status}: {body}");
        }

        let sse: SseStream = Box::pin(parse_sse_stream(response));

        let chunk_stream = futures::stream::unfold(sse, |mut sse| async move {
            loop {
                match sse.next().await {
                    Some(Ok(event)) => match decode_event(event.data.trim()) {
                        Decoded::Chunk(c) => return Some((Ok(c), sse)),
                        Decoded::Skip => continue,
                        Decoded::Done => return None,
                    },
                    Some(Err(e)) => return Some((Err(e), sse)),
                    None => return None,
                }
            }
        });

        Ok(Box::pin(chunk_stream))
    }
}

type SseStream = Pin<Box<dyn Stream<Item = anyhow::Result<SseEvent>> + Send>>;
