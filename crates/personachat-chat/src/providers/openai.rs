//! OpenAI chat-completions adapter.

use std::time::Duration;

use async_trait::async_trait;
use personachat_core::{ChatConfig, ProviderError, ProviderId};
use reqwest::Client;
use serde_json::{json, Value};
use tokio_stream::StreamExt;
use tracing::debug;

use super::{status_error, transport_error, BoxedStream, ProviderAdapter, SseLineBuffer, StreamChunk};
use crate::types::Prompt;

const PROVIDER: ProviderId = ProviderId::OpenAI;

pub struct OpenAiAdapter {
    client: Client,
    api_base: String,
    model: String,
    api_key: Option<String>,
    max_tokens: u32,
    request_timeout: Duration,
}

impl std::fmt::Debug for OpenAiAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiAdapter")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .field("has_key", &self.api_key.is_some())
            .finish()
    }
}

impl OpenAiAdapter {
    pub fn new(client: Client, config: &ChatConfig) -> Self {
        Self {
            client,
            api_base: config.openai.api_base.clone(),
            model: config.openai.model.clone(),
            api_key: config.openai.api_key.clone(),
            max_tokens: config.max_tokens,
            request_timeout: config.request_timeout(),
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.api_base.trim_end_matches('/'))
    }

    fn request_body(&self, prompt: &Prompt, stream: bool) -> Value {
        json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": prompt.system},
                {"role": "user", "content": prompt.user},
            ],
            "max_tokens": self.max_tokens,
            "stream": stream,
        })
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    fn id(&self) -> ProviderId {
        PROVIDER
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn accepts_client_credential(&self) -> bool {
        true
    }

    fn server_credential(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    async fn complete_once(&self, prompt: &Prompt, api_key: &str) -> Result<String, ProviderError> {
        debug!("OpenAI completion with model {}", self.model);

        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(api_key)
            .timeout(self.request_timeout)
            .json(&self.request_body(prompt, false))
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

        let content = parsed["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| ProviderError::malformed(PROVIDER, "Response has no message content"))?;

        if content.trim().is_empty() {
            return Err(ProviderError::empty(PROVIDER));
        }
        Ok(content.to_string())
    }

    fn complete_streaming(&self, prompt: &Prompt, api_key: &str) -> BoxedStream {
        let client = self.client.clone();
        let url = self.completions_url();
        let body = self.request_body(prompt, true);
        let api_key = api_key.to_string();
        let model = self.model.clone();

        Box::pin(async_stream::stream! {
            debug!("Streaming from {} with model {}", url, model);

            let response = match client.post(&url).bearer_auth(&api_key).json(&body).send().await {
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
                        Some(StreamChunk::Token(text)) if text.is_empty() => {}
                        Some(StreamChunk::Done) => {
                            yield StreamChunk::Done;
                            return;
                        }
                        Some(StreamChunk::Error(e)) => {
                            yield StreamChunk::Error(e);
                            return;
                        }
                        Some(token) => {
                            yield token;
                        }
                        None => {}
                    }
                }
            }

            if let Some(data) = lines.finish() {
                match parse_event(&data) {
                    Some(StreamChunk::Done) => {
                        yield StreamChunk::Done;
                        return;
                    }
                    Some(StreamChunk::Token(text)) if text.is_empty() => {}
                    Some(StreamChunk::Error(e)) => {
                        yield StreamChunk::Error(e);
                        return;
                    }
                    Some(token) => {
                        yield token;
                    }
                    None => {}
                }
            }

            // The API always ends with [DONE]; without it the body was cut off.
            yield StreamChunk::Error(ProviderError::network(
                PROVIDER,
                "Stream ended before [DONE]",
            ));
        })
    }
}

/// Decode one `data:` payload of a chat-completions stream.
fn parse_event(data: &str) -> Option<StreamChunk> {
    if data.trim() == "[DONE]" {
        return Some(StreamChunk::Done);
    }
    let parsed: Value = serde_json::from_str(data).ok()?;
    if let Some(message) = parsed["error"]["message"].as_str() {
        return Some(StreamChunk::Error(ProviderError::classify(PROVIDER, 200, message)));
    }
    parsed["choices"][0]["delta"]["content"]
        .as_str()
        .map(|content| StreamChunk::Token(content.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use personachat_core::ProviderErrorKind;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn adapter(api_base: &str) -> OpenAiAdapter {
        let mut config = ChatConfig::default();
        config.openai.api_base = api_base.to_string();
        config.openai.api_key = Some("server-key".into());
        OpenAiAdapter::new(Client::new(), &config)
    }

    fn prompt() -> Prompt {
        Prompt {
            system: "You are Piyush.".into(),
            user: "Is DSA important?".into(),
        }
    }

    async fn collect(stream: BoxedStream) -> Vec<StreamChunk> {
        stream.collect().await
    }

    #[test]
    fn test_completions_url_trailing_slash() {
        let a = adapter("https://api.openai.com/v1/");
        assert_eq!(a.completions_url(), "https://api.openai.com/v1/chat/completions");
    }

    #[test]
    fn test_accepts_client_key() {
        let a = adapter("http://localhost");
        assert!(a.accepts_client_credential());
        assert_eq!(a.server_credential(), Some("server-key"));
    }

    #[test]
    fn test_parse_event() {
        assert!(matches!(parse_event("[DONE]"), Some(StreamChunk::Done)));
        assert!(matches!(
            parse_event(r#"{"choices":[{"delta":{"content":"Hi"}}]}"#),
            Some(StreamChunk::Token(t)) if t == "Hi"
        ));
        assert!(parse_event(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#).is_none());
        assert!(parse_event("garbage").is_none());
    }

    #[tokio::test]
    async fn test_complete_once_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer client-key"))
            .and(body_partial_json(serde_json::json!({
                "model": "gpt-4o-mini",
                "max_tokens": 1000,
                "stream": false,
                "messages": [
                    {"role": "system", "content": "You are Piyush."},
                    {"role": "user", "content": "Is DSA important?"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "Absolutely."}}]
            })))
            .mount(&server)
            .await;

        let text = adapter(&server.uri())
            .complete_once(&prompt(), "client-key")
            .await
            .unwrap();
        assert_eq!(text, "Absolutely.");
    }

    #[tokio::test]
    async fn test_complete_once_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string(
                r#"{"error":{"message":"Rate limit reached for gpt-4o-mini"}}"#,
            ))
            .mount(&server)
            .await;

        let err = adapter(&server.uri())
            .complete_once(&prompt(), "k")
            .await
            .unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::RateLimited);
        assert_eq!(err.provider, ProviderId::OpenAI);
    }

    #[tokio::test]
    async fn test_complete_once_empty_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": ""}}]
            })))
            .mount(&server)
            .await;

        let err = adapter(&server.uri())
            .complete_once(&prompt(), "k")
            .await
            .unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::Empty);
    }

    #[tokio::test]
    async fn test_streaming_tokens_in_order() {
        let server = MockServer::start().await;
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Alright\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\", practice\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\" daily.\"}}]}\n\n",
            "data: [DONE]\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(serde_json::json!({"stream": true})))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let a = adapter(&server.uri());
        let chunks = collect(a.complete_streaming(&prompt(), "k")).await;

        let tokens: Vec<String> = chunks
            .iter()
            .filter_map(|c| match c {
                StreamChunk::Token(t) => Some(t.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(tokens, vec!["Alright", ", practice", " daily."]);
        assert!(matches!(chunks.last(), Some(StreamChunk::Done)));
        assert_eq!(chunks.len(), 4);
    }

    #[tokio::test]
    async fn test_streaming_without_done_marker_is_error() {
        let server = MockServer::start().await;
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"Half\"}}]}\n\n";
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let chunks = collect(adapter(&server.uri()).complete_streaming(&prompt(), "k")).await;
        assert_eq!(chunks.len(), 2);
        assert!(matches!(&chunks[0], StreamChunk::Token(t) if t == "Half"));
        match &chunks[1] {
            StreamChunk::Error(e) => assert_eq!(e.kind, ProviderErrorKind::Network),
            other => panic!("expected error chunk, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_streaming_done_marker_without_trailing_newline() {
        let server = MockServer::start().await;
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\ndata: [DONE]";
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let chunks = collect(adapter(&server.uri()).complete_streaming(&prompt(), "k")).await;
        assert_eq!(chunks.len(), 2);
        assert!(matches!(chunks.last(), Some(StreamChunk::Done)));
    }

    #[tokio::test]
    async fn test_streaming_http_error_is_single_error_chunk() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Incorrect API key provided"))
            .mount(&server)
            .await;

        let chunks = collect(adapter(&server.uri()).complete_streaming(&prompt(), "bad")).await;
        assert_eq!(chunks.len(), 1);
        match &chunks[0] {
            StreamChunk::Error(e) => assert_eq!(e.kind, ProviderErrorKind::Unauthorized),
            other => panic!("expected error chunk, got {:?}", other),
        }
    }
}
