//! Request handling: validation, persona and provider resolution, and the
//! single-shot and streaming response modes.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use personachat_core::{ChatConfig, ChatError, ProviderError, ProviderId, Result};
use serde::Serialize;
use tracing::{info, warn};

use crate::envelope::decode_envelope;
use crate::evaluator::Evaluator;
use crate::persona::{self, Persona};
use crate::prompt::build_prompt;
use crate::providers::{ProviderAdapter, ProviderSet};
use crate::relay::{relay, EvaluationJob, RelayOptions};
use crate::types::{ChatReply, ChatRequest, PersonaSummary, Prompt, StreamFrame};

/// Boxed stream of wire frames handed to the HTTP layer.
pub type FrameStream = Pin<Box<dyn Stream<Item = StreamFrame> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialSource {
    Client,
    Server,
}

/// A validated request, ready for a provider call.
pub struct PreparedChat {
    pub provider: ProviderId,
    pub persona: &'static Persona,
    pub message: String,
    pub prompt: Prompt,
    pub credential_source: CredentialSource,
    pub evaluate: bool,
    api_key: String,
}

impl std::fmt::Debug for PreparedChat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedChat")
            .field("provider", &self.provider)
            .field("persona", &self.persona.id)
            .field("credential_source", &self.credential_source)
            .field("evaluate", &self.evaluate)
            .finish()
    }
}

/// Availability of one provider, without keys.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderStatus {
    pub id: ProviderId,
    pub model: String,
    pub configured: bool,
    #[serde(rename = "acceptsClientKey")]
    pub accepts_client_key: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    #[serde(rename = "defaultProvider")]
    pub default_provider: ProviderId,
    pub providers: Vec<ProviderStatus>,
}

/// Chat request handler. Holds the injected provider adapters; shares no
/// mutable state between requests.
pub struct ChatService {
    providers: ProviderSet,
    default_provider: ProviderId,
    stream_idle_timeout: Duration,
    evaluation_timeout: Duration,
}

impl ChatService {
    pub fn new(config: &ChatConfig, providers: ProviderSet) -> Self {
        Self {
            providers,
            default_provider: config.default_provider,
            stream_idle_timeout: config.stream_idle_timeout(),
            evaluation_timeout: config.evaluation_timeout(),
        }
    }

    /// Build the real HTTP adapters from configuration.
    pub fn from_config(config: &ChatConfig) -> std::result::Result<Self, reqwest::Error> {
        Ok(Self::new(config, ProviderSet::from_config(config)?))
    }

    fn adapter(&self, id: ProviderId) -> &Arc<dyn ProviderAdapter> {
        self.providers.get(id)
    }

    /// Validate and resolve a request. Performs no network I/O.
    pub fn prepare(&self, req: &ChatRequest) -> Result<PreparedChat> {
        let message = non_blank(req.message.as_deref()).ok_or(ChatError::MissingField("message"))?;
        let persona_id =
            non_blank(req.persona.as_deref()).ok_or(ChatError::MissingField("persona"))?;

        let persona = persona::find_persona(persona_id)
            .ok_or_else(|| ChatError::PersonaNotFound(persona_id.to_string()))?;

        let provider = match non_blank(req.model.as_deref()) {
            Some(name) => ProviderId::parse(name)?,
            None => self.default_provider,
        };

        let adapter = self.adapter(provider);
        let client_key = non_blank(req.api_key.as_deref()).filter(|_| adapter.accepts_client_credential());

        let (api_key, credential_source) = match (client_key, adapter.server_credential()) {
            (Some(key), _) => (key.to_string(), CredentialSource::Client),
            (None, Some(key)) => (key.to_string(), CredentialSource::Server),
            (None, None) => {
                return Err(ChatError::MissingCredential {
                    provider,
                    client_may_supply: adapter.accepts_client_credential(),
                })
            }
        };

        Ok(PreparedChat {
            provider,
            persona,
            message: message.to_string(),
            prompt: build_prompt(persona.system_prompt, message),
            credential_source,
            evaluate: req.use_evaluation,
            api_key,
        })
    }

    /// Evaluator on the opposite provider, if evaluation was asked for and
    /// that provider has a server-side key.
    fn evaluator_for(&self, prepared: &PreparedChat) -> Option<Evaluator> {
        if !prepared.evaluate {
            return None;
        }
        let critic = prepared.provider.opposite();
        let adapter = self.adapter(critic);
        match adapter.server_credential() {
            Some(key) => Some(Evaluator::new(adapter.clone(), key, self.evaluation_timeout)),
            None => {
                warn!("Evaluation skipped: no {} API key configured", critic);
                None
            }
        }
    }

    /// Single-shot mode: one provider call, envelope decoded from the text.
    pub async fn complete(&self, req: &ChatRequest) -> Result<ChatReply> {
        let prepared = self.prepare(req)?;
        info!(
            persona = prepared.persona.id,
            provider = %prepared.provider,
            credential = ?prepared.credential_source,
            "Single-shot chat"
        );

        let raw = self
            .adapter(prepared.provider)
            .complete_once(&prepared.prompt, &prepared.api_key)
            .await?;

        let content = decode_envelope(&raw);
        if content.is_empty() {
            return Err(ProviderError::empty(prepared.provider).into());
        }

        let mut reply = ChatReply::result(content);
        if let Some(evaluator) = self.evaluator_for(&prepared) {
            reply.evaluation = evaluator.evaluate(&prepared.message, &reply.content).await;
        }
        Ok(reply)
    }

    /// Streaming mode. Failures before the provider stream opens are returned
    /// as errors; everything afterwards arrives as frames.
    pub fn stream(&self, req: &ChatRequest) -> Result<FrameStream> {
        let prepared = self.prepare(req)?;
        info!(
            persona = prepared.persona.id,
            provider = %prepared.provider,
            credential = ?prepared.credential_source,
            evaluate = prepared.evaluate,
            "Streaming chat"
        );

        let chunks = self
            .adapter(prepared.provider)
            .complete_streaming(&prepared.prompt, &prepared.api_key);

        let job = self.evaluator_for(&prepared).map(|evaluator| EvaluationJob {
            evaluator,
            user_message: prepared.message.clone(),
        });

        let options = RelayOptions {
            provider: prepared.provider,
            idle_timeout: self.stream_idle_timeout,
        };

        Ok(Box::pin(relay(chunks, options, job)))
    }

    pub fn status(&self) -> ServiceStatus {
        ServiceStatus {
            default_provider: self.default_provider,
            providers: ProviderId::ALL
                .iter()
                .map(|&id| {
                    let adapter = self.adapter(id);
                    ProviderStatus {
                        id,
                        model: adapter.model().to_string(),
                        configured: adapter.server_credential().is_some(),
                        accepts_client_key: adapter.accepts_client_credential(),
                    }
                })
                .collect(),
        }
    }

    pub fn personas(&self) -> Vec<PersonaSummary> {
        persona::summaries()
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
