//! Scripted provider doubles (feature `test-util`).

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use personachat_core::{ProviderError, ProviderId};

use crate::providers::{BoxedStream, ProviderAdapter, StreamChunk};
use crate::types::Prompt;

/// Provider that replays canned output and records every call.
pub struct ScriptedProvider {
    id: ProviderId,
    server_key: Option<String>,
    accepts_client: bool,
    reply: Result<String, ProviderError>,
    chunks: Vec<StreamChunk>,
    calls: AtomicUsize,
    keys: Mutex<Vec<String>>,
    prompts: Mutex<Vec<Prompt>>,
}

impl ScriptedProvider {
    pub fn new(id: ProviderId) -> Self {
        Self {
            id,
            server_key: None,
            accepts_client: id == ProviderId::OpenAI,
            reply: Err(ProviderError::empty(id)),
            chunks: vec![StreamChunk::Done],
            calls: AtomicUsize::new(0),
            keys: Mutex::new(Vec::new()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_server_key(mut self, key: &str) -> Self {
        self.server_key = Some(key.to_string());
        self
    }

    pub fn replying(mut self, text: &str) -> Self {
        self.reply = Ok(text.to_string());
        self
    }

    pub fn failing(mut self, err: ProviderError) -> Self {
        self.reply = Err(err);
        self
    }

    /// Tokens followed by `Done`.
    pub fn streaming(mut self, tokens: &[&str]) -> Self {
        self.chunks = tokens
            .iter()
            .map(|t| StreamChunk::Token(t.to_string()))
            .chain(std::iter::once(StreamChunk::Done))
            .collect();
        self
    }

    pub fn streaming_chunks(mut self, chunks: Vec<StreamChunk>) -> Self {
        self.chunks = chunks;
        self
    }

    /// Number of provider calls made, single-shot and streaming together.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn keys(&self) -> Vec<String> {
        self.keys.lock().clone()
    }

    pub fn prompts(&self) -> Vec<Prompt> {
        self.prompts.lock().clone()
    }

    fn record(&self, prompt: &Prompt, api_key: &str) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.keys.lock().push(api_key.to_string());
        self.prompts.lock().push(prompt.clone());
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedProvider {
    fn id(&self) -> ProviderId {
        self.id
    }

    fn model(&self) -> &str {
        "scripted"
    }

    fn accepts_client_credential(&self) -> bool {
        self.accepts_client
    }

    fn server_credential(&self) -> Option<&str> {
        self.server_key.as_deref()
    }

    async fn complete_once(&self, prompt: &Prompt, api_key: &str) -> Result<String, ProviderError> {
        self.record(prompt, api_key);
        self.reply.clone()
    }

    fn complete_streaming(&self, prompt: &Prompt, api_key: &str) -> BoxedStream {
        self.record(prompt, api_key);
        Box::pin(futures::stream::iter(self.chunks.clone()))
    }
}
