//! Google Generative AI (Gemini) provider.
//!
//! Implements streaming via the `streamGenerateContent` endpoint with SSE.
//! Auth is via API key in query parameter.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_stream::StreamExt;
use tracing::{debug, trace};

use crate::sse::parse_sse_stream;
use crate::{ChunkStream, CompletionChunk, CompletionRequest, Credentials, LlmProvider};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

pub struct GeminiProvider {
    pub base_url: String,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(base_url: Option<&str>) -> Self {
        Self {
            base_url: base_url
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            client: reqwest::Client::new(),
        }
    }
}

// --- Gemini request/response types ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiStreamChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: Option<String>,
}

/// Flatten one SSE payload into the chunk it carries.
///
/// Gemini can pack text and the finish reason into the same event.
fn chunk_from_event(chunk: GeminiStreamChunk) -> Option<CompletionChunk> {
    let candidate = chunk.candidates.into_iter().next();
    let (text, finish_reason) = match candidate {
        Some(c) => {
            let text: String = c
                .content
                .map(|content| {
                    content
                        .parts
                        .into_iter()
                        .filter_map(|p| p.text)
                        .collect::<Vec<_>>()
                        .join("")
                })
                .unwrap_or_default();
            (text, c.finish_reason)
        }
        None => (String::new(), None),
    };

    if text.is_empty() && finish_reason.is_none() {
        return None;
    }

    Some(CompletionChunk {
        delta: (!text.is_empty()).then_some(text),
        stop_reason: finish_reason,
    })
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn id(&self) -> &str {
        "google"
    }

    fn format_prompt(&self, prompt: &str) -> Vec<serde_json::Value> {
        vec![json!({ "role": "user", "parts": [{ "text": prompt }] })]
    }

    async fn stream(
        &self,
        request: &CompletionRequest,
        credentials: &Credentials,
    ) -> anyhow::Result<ChunkStream> {
        let api_key = match credentials {
            Credentials::ApiKey { api_key } => api_key.clone(),
            _ => anyhow::bail!("Gemini requires ApiKey credentials"),
        };

        let system_instruction = request.system.as_ref().map(|s| {
            json!({
                "parts": [{ "text": s }]
            })
        });

        let body = GeminiRequest {
            contents: request.messages.clone(),
            system_instruction,
            generation_config: Some(GenerationConfig {
                max_output_tokens: Some(request.max_tokens),
                temperature: request.temperature,
            }),
        };

        let url = format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse&key={}",
            self.base_url, request.model, api_key
        );

        debug!(model = %request.model, "Streaming Gemini API");

        let response = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Gemini API error {status}: {body}");
        }

        let sse_stream = Box::pin(parse_sse_stream(response));

        let chunk_stream = futures::stream::unfold(sse_stream, |mut sse| async move {
            loop {
                match sse.next().await {
                    Some(Ok(sse_event)) => {
                        let data = sse_event.data.trim();
                        let chunk: GeminiStreamChunk = match serde_json::from_str(data) {
                            Ok(c) => c,
                            Err(e) => {
                                trace!(%e, "Failed to parse Gemini chunk");
                                continue;
                            }
                        };
                        if let Some(reason) = chunk
                            .candidates
                            .first()
                            .and_then(|c| c.finish_reason.as_deref())
                        {
                            if reason != "STOP" {
                                trace!(reason, "Gemini finish reason");
                            }
                        }
                        match chunk_from_event(chunk) {
                            Some(c) => return Some((Ok(c), sse)),
                            None => continue,
                        }
                    }
                    Some(Err(e)) => return Some((Err(e), sse)),
                    None => return None,
                }
            }
        });

        Ok(Box::pin(chunk_stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gemini_provider_creation() {
        let provider = GeminiProvider::new(None);
        assert_eq!(provider.id(), "google");
        assert_eq!(provider.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_custom_base_url_trims_slash() {
        let provider = GeminiProvider::new(Some("http://localhost:9999/"));
        assert_eq!(provider.base_url, "http://localhost:9999");
    }

    #[test]
    fn test_format_prompt_contents_parts() {
        let provider = GeminiProvider::new(None);
        let messages = provider.format_prompt("Prepare questions");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(messages[0]["parts"][0]["text"], "Prepare questions");
    }

    #[test]
    fn test_chunk_with_text_and_finish_reason() {
        let json = r#"{"candidates":[{"content":{"parts":[{"text":"[\"Q1\"]"}]},"finishReason":"STOP"}],"usageMetadata":{"promptTokenCount":10,"candidatesTokenCount":5}}"#;
        let chunk: GeminiStreamChunk = serde_json::from_str(json).unwrap();
        let c = chunk_from_event(chunk).unwrap();
        assert_eq!(c.delta.as_deref(), Some("[\"Q1\"]"));
        assert_eq!(c.stop_reason.as_deref(), Some("STOP"));
    }

    #[test]
    fn test_chunk_joins_multiple_parts() {
        let json = r#"{"candidates":[{"content":{"parts":[{"text":"Hello "},{"text":"world"}]}}]}"#;
        let chunk: GeminiStreamChunk = serde_json::from_str(json).unwrap();
        let c = chunk_from_event(chunk).unwrap();
        assert_eq!(c.delta.as_deref(), Some("Hello world"));
        assert!(c.stop_reason.is_none());
    }

    #[test]
    fn test_usage_only_chunk_is_skipped() {
        let json = r#"{"candidates":[],"usageMetadata":{"promptTokenCount":10}}"#;
        let chunk: GeminiStreamChunk = serde_json::from_str(json).unwrap();
        assert!(chunk_from_event(chunk).is_none());
    }
}
