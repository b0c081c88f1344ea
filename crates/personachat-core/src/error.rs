//! Error types for PersonaChat.

use thiserror::Error;

use crate::types::ProviderId;

/// What went wrong when talking to an upstream provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// Connection refused, DNS failure, broken body stream.
    Network,
    /// Non-success HTTP status not covered by a more specific kind.
    Status(u16),
    RateLimited,
    Unauthorized,
    /// The provider answered with something we could not decode.
    Malformed,
    /// The provider answered successfully but produced no text.
    Empty,
    Timeout,
}

/// A failed provider call. Never retried.
#[derive(Error, Debug, Clone)]
#[error("{provider} error: {message}")]
pub struct ProviderError {
    pub provider: ProviderId,
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(provider: ProviderId, kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            provider,
            kind,
            message: message.into(),
        }
    }

    pub fn network(provider: ProviderId, message: impl Into<String>) -> Self {
        Self::new(provider, ProviderErrorKind::Network, message)
    }

    pub fn malformed(provider: ProviderId, message: impl Into<String>) -> Self {
        Self::new(provider, ProviderErrorKind::Malformed, message)
    }

    pub fn empty(provider: ProviderId) -> Self {
        Self::new(provider, ProviderErrorKind::Empty, "Empty completion")
    }

    pub fn timeout(provider: ProviderId, message: impl Into<String>) -> Self {
        Self::new(provider, ProviderErrorKind::Timeout, message)
    }

    /// Classify an HTTP failure from its status and response body.
    pub fn classify(provider: ProviderId, status: u16, body: &str) -> Self {
        let lower = body.to_ascii_lowercase();
        let kind = if status == 429
            || lower.contains("rate limit")
            || lower.contains("rate_limit")
            || lower.contains("quota")
            || lower.contains("resource_exhausted")
        {
            ProviderErrorKind::RateLimited
        } else if status == 401
            || status == 403
            || lower.contains("api key")
            || lower.contains("api_key")
        {
            ProviderErrorKind::Unauthorized
        } else {
            ProviderErrorKind::Status(status)
        };
        Self::new(provider, kind, format!("API error {}: {}", status, body))
    }

    pub fn is_rate_limited(&self) -> bool {
        self.kind == ProviderErrorKind::RateLimited
    }
}

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Unknown persona: {0}")]
    PersonaNotFound(String),

    #[error("Unknown provider: {0}")]
    InvalidProvider(String),

    #[error("{provider} API key is not configured")]
    MissingCredential {
        provider: ProviderId,
        /// Whether the caller could have supplied the key in the request.
        client_may_supply: bool,
    },

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl ChatError {
    /// HTTP status equivalent for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            ChatError::MissingField(_)
            | ChatError::PersonaNotFound(_)
            | ChatError::InvalidProvider(_) => 400,
            ChatError::MissingCredential {
                client_may_supply, ..
            } => {
                if *client_may_supply {
                    400
                } else {
                    500
                }
            }
            ChatError::Provider(e) if e.is_rate_limited() => 429,
            ChatError::Provider(_) => 500,
        }
    }

    /// Message shown to the end user. Tells a missing key apart from a rate
    /// limit and from any other provider failure.
    pub fn user_message(&self) -> String {
        match self {
            ChatError::MissingField(_) => "Message and persona are required".into(),
            ChatError::PersonaNotFound(id) => format!("Invalid persona: {}", id),
            ChatError::InvalidProvider(name) => format!("Unsupported model: {}", name),
            ChatError::MissingCredential {
                provider,
                client_may_supply: true,
            } => format!("{} API key is required", provider.display_name()),
            ChatError::MissingCredential { provider, .. } => format!(
                "{} API key not configured. Please check your environment variables.",
                provider.display_name()
            ),
            ChatError::Provider(e) => match e.kind {
                ProviderErrorKind::RateLimited => format!(
                    "{} rate limit reached. Please wait a moment or switch models.",
                    e.provider.display_name()
                ),
                ProviderErrorKind::Unauthorized => format!(
                    "{} rejected the API key. Please check your API configuration.",
                    e.provider.display_name()
                ),
                ProviderErrorKind::Timeout => format!(
                    "{} took too long to respond. Please try again.",
                    e.provider.display_name()
                ),
                _ => "AI model error. Please try switching models or check your API configuration."
                    .into(),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, ChatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_rate_limit_by_status_and_text() {
        let e = ProviderError::classify(ProviderId::OpenAI, 429, "slow down");
        assert_eq!(e.kind, ProviderErrorKind::RateLimited);

        let e = ProviderError::classify(ProviderId::Gemini, 400, "Quota exceeded for metric");
        assert_eq!(e.kind, ProviderErrorKind::RateLimited);
    }

    #[test]
    fn test_classify_unauthorized() {
        let e = ProviderError::classify(ProviderId::OpenAI, 401, "bad key");
        assert_eq!(e.kind, ProviderErrorKind::Unauthorized);

        let e = ProviderError::classify(ProviderId::Gemini, 400, "API key not valid. Please pass a valid API key.");
        assert_eq!(e.kind, ProviderErrorKind::Unauthorized);
    }

    #[test]
    fn test_classify_generic() {
        let e = ProviderError::classify(ProviderId::OpenAI, 503, "overloaded");
        assert_eq!(e.kind, ProviderErrorKind::Status(503));
        assert!(e.message.contains("503"));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(ChatError::MissingField("message").status_code(), 400);
        assert_eq!(ChatError::PersonaNotFound("x".into()).status_code(), 400);
        assert_eq!(
            ChatError::MissingCredential {
                provider: ProviderId::OpenAI,
                client_may_supply: true
            }
            .status_code(),
            400
        );
        assert_eq!(
            ChatError::MissingCredential {
                provider: ProviderId::Gemini,
                client_may_supply: false
            }
            .status_code(),
            500
        );
        let limited = ProviderError::classify(ProviderId::OpenAI, 429, "");
        assert_eq!(ChatError::from(limited).status_code(), 429);
        let generic = ProviderError::network(ProviderId::OpenAI, "refused");
        assert_eq!(ChatError::from(generic).status_code(), 500);
    }

    #[test]
    fn test_user_messages_are_distinct() {
        let missing = ChatError::MissingCredential {
            provider: ProviderId::Gemini,
            client_may_supply: false,
        }
        .user_message();
        let limited =
            ChatError::from(ProviderError::classify(ProviderId::Gemini, 429, "")).user_message();
        let generic =
            ChatError::from(ProviderError::network(ProviderId::Gemini, "boom")).user_message();

        assert!(missing.contains("API key not configured"));
        assert!(limited.contains("rate limit"));
        assert!(generic.starts_with("AI model error"));
    }
}
