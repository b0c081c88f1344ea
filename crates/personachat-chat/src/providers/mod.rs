//! External LLM provider adapters.
//!
//! Each adapter talks to one vendor API and exposes the same two calls: a
//! single completion and a token stream. Adapters hold no per-request state,
//! so one instance is shared by every request.

pub mod gemini;
pub mod openai;
mod sse;

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;
use personachat_core::{ChatConfig, ProviderError, ProviderId};
use reqwest::Client;

use crate::types::Prompt;

pub use gemini::GeminiAdapter;
pub use openai::OpenAiAdapter;
pub use sse::SseLineBuffer;

/// Boxed stream type for returning different stream implementations.
pub type BoxedStream = Pin<Box<dyn Stream<Item = StreamChunk> + Send>>;

/// A single streamed token, the end marker, or a terminal error.
#[derive(Debug, Clone)]
pub enum StreamChunk {
    Token(String),
    Done,
    Error(ProviderError),
}

/// Common interface over the supported vendors.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn id(&self) -> ProviderId;

    /// Model name sent to the vendor.
    fn model(&self) -> &str;

    /// Whether a key sent by the browser may be used for this provider.
    fn accepts_client_credential(&self) -> bool {
        false
    }

    /// Key from server configuration, if any.
    fn server_credential(&self) -> Option<&str>;

    /// Run one completion and return the whole text.
    async fn complete_once(&self, prompt: &Prompt, api_key: &str) -> Result<String, ProviderError>;

    /// Start a streamed completion. Errors arrive as `StreamChunk::Error`.
    fn complete_streaming(&self, prompt: &Prompt, api_key: &str) -> BoxedStream;
}

/// Both adapters, selectable by id.
#[derive(Clone)]
pub struct ProviderSet {
    pub openai: Arc<dyn ProviderAdapter>,
    pub gemini: Arc<dyn ProviderAdapter>,
}

impl ProviderSet {
    pub fn new(openai: Arc<dyn ProviderAdapter>, gemini: Arc<dyn ProviderAdapter>) -> Self {
        Self { openai, gemini }
    }

    /// Build the real HTTP adapters sharing one connection pool.
    pub fn from_config(config: &ChatConfig) -> Result<Self, reqwest::Error> {
        let client = build_client(config)?;
        Ok(Self {
            openai: Arc::new(OpenAiAdapter::new(client.clone(), config)),
            gemini: Arc::new(GeminiAdapter::new(client, config)),
        })
    }

    pub fn get(&self, id: ProviderId) -> &Arc<dyn ProviderAdapter> {
        match id {
            ProviderId::OpenAI => &self.openai,
            ProviderId::Gemini => &self.gemini,
        }
    }
}

/// HTTP client with the connect timeout applied. Total timeouts are set per
/// request because streams must be allowed to outlive them.
pub fn build_client(config: &ChatConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .connect_timeout(config.connect_timeout())
        .build()
}

pub(crate) fn transport_error(provider: ProviderId, err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::timeout(provider, format!("Request timed out: {}", err))
    } else {
        ProviderError::network(provider, format!("Request failed: {}", err))
    }
}

/// Turn a non-success response into a classified error.
pub(crate) async fn status_error(provider: ProviderId, response: reqwest::Response) -> ProviderError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    ProviderError::classify(provider, status, &body)
}
