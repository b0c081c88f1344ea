//! Google Gemini generative-content adapter.

use std::time::Duration;

use async_trait::async_trait;
use personachat_core::{ChatConfig, ProviderError, ProviderId};
use reqwest::Client;
use serde_json::{json, Value};
use tokio_stream::StreamExt;
use tracing::debug;

use super::{status_error, transport_error, BoxedStream, ProviderAdapter, SseLineBuffer, StreamChunk};
use crate::types::Prompt;

const PROVIDER: ProviderId = ProviderId::Gemini;

pub struct GeminiAdapter {
    client: Client,
    api_base: String,
    model: String,
    api_key: Option<String>,
    max_tokens: u32,
    request_timeout: Duration,
}

impl std::fmt::Debug for GeminiAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiAdapter")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .field("has_key", &self.api_key.is_some())
            .finish()
    }
}

impl GeminiAdapter {
    pub fn new(client: Client, config: &ChatConfig) -> Self {
        Self {
            client,
            api_base: config.gemini.api_base.clone(),
            model: config.gemini.model.clone(),
            api_key: config.gemini.api_key.clone(),
            max_tokens: config.max_tokens,
            request_timeout: config.request_timeout(),
        }
    }

    fn generate_url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.api_base.trim_end_matches('/'),
            self.model
        )
    }

    fn stream_url(&self) -> String {
        format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.api_base.trim_end_matches('/'),
            self.model
        )
    }

    fn request_body(&self, prompt: &Prompt) -> Value {
        json!({
            "systemInstruction": {"parts": [{"text": prompt.system}]},
            "contents": [{"role": "user", "parts": [{"text": prompt.user}]}],
            "generationConfig": {"maxOutputTokens": self.max_tokens},
        })
    }
}

/// Concatenate the text parts of the first candidate.
fn candidate_text(response: &Value) -> Option<String> {
    let parts = response["candidates"][0]["content"]["parts"].as_array()?;
    Some(
        parts
            .iter()
            .filter_map(|p| p["text"].as_str())
            .collect::<String>(),
    )
}

/// Errors Gemini reports inside a 200 body: an `error` object or a blocked prompt.
fn embedded_error(response: &Value) -> Option<ProviderError> {
    if let Some(message) = response["error"]["message"].as_str() {
        let code = response["error"]["code"]
            .as_u64()
            .and_then(|c| u16::try_from(c).ok())
            .unwrap_or(500);
        return Some(ProviderError::classify(PROVIDER, code, message));
    }
    response["promptFeedback"]["blockReason"]
        .as_str()
        .map(|reason| ProviderError::malformed(PROVIDER, format!("Prompt blocked: {}", reason)))
}

#[async_trait]
impl ProviderAdapter for GeminiAdapter {
    fn id(&self) -> ProviderId {
        PROVIDER
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn server_credential(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    async fn complete_once(&self, prompt: &Prompt, api_key: &str) -> Result<String, ProviderError> {
        debug!("Gemini completion with model {}", self.model);

        let response = self
            .client
            .post(self.generate_url())
            .header("x-goog-api-key", api_key)
            .timeout(self.request_timeout)
            .json(&self.request_body(prompt))
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;

        if !response.status().is_success() {
            return Err(status_error(PROVIDER, response).await);
        }

        let parsed: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::malformed(PROVIDER, format!("Invalid JSON: {}", e)))?;

        if let Some(e) = embedded_error(&parsed) {
            return Err(e);
        }

        let text = candidate_text(&parsed)
            .ok_or_else(|| ProviderError::malformed(PROVIDER, "Response has no candidates"))?;

        if text.trim().is_empty() {
            return Err(ProviderError::empty(PROVIDER));
        }
        Ok(text)
    }

    fn complete_streaming(&self, prompt: &Prompt, api_key: &str) -> BoxedStream {
        let client = self.client.clone();
        let url = self.stream_url();
        let body = self.request_body(prompt);
        let api_key = api_key.to_string();
        let model = self.model.clone();

        Box::pin(async_stream::stream! {
            debug!("Streaming from Gemini with model {}", model);

            let response = match client
                .post(&url)
                .header("x-goog-api-key", &api_key)
                .json(&body)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    yield StreamChunk::Error(transport_error(PROVIDER, e));
                    return;
                }
            };

            if !response.status().is_success() {
                yield StreamChunk::Error(status_error(PROVIDER, response).await);
                return;
            }

            let mut stream = response.bytes_stream();
            let mut lines = SseLineBuffer::new();

            // Gemini has no end marker; the stream ends when the body closes.
            while let Some(chunk) = stream.next().await {
                let bytes = match chunk {
                    Ok(b) => b,
                    Err(e) => {
                        yield StreamChunk::Error(ProviderError::network(
                            PROVIDER,
                            format!("Stream read error: {}", e),
                        ));
                        return;
                    }
                };

                for data in lines.push(&bytes) {
                    match parse_event(&data) {
                        Some(StreamChunk::Error(e)) => {
                            yield StreamChunk::Error(e);
                            return;
                        }
                        Some(chunk) => {
                            yield chunk;
                        }
                        None => {}
                    }
                }
            }

            if let Some(data) = lines.finish() {
                if let Some(chunk) = parse_event(&data) {
                    let is_error = matches!(chunk, StreamChunk::Error(_));
                    yield chunk;
                    if is_error {
                        return;
                    }
                }
            }

            yield StreamChunk::Done;
        })
    }
}

/// Decode one `data:` payload of a `streamGenerateContent?alt=sse` body.
/// Returns `None` for events that carry no text.
fn parse_event(data: &str) -> Option<StreamChunk> {
    let parsed: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(_) => return None,
    };
    if let Some(e) = embedded_error(&parsed) {
        return Some(StreamChunk::Error(e));
    }
    candidate_text(&parsed)
        .filter(|t| !t.is_empty())
        .map(StreamChunk::Token)
}
