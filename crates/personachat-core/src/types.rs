//! Provider identifiers shared by every crate.

use serde::{Deserialize, Serialize};

use crate::error::ChatError;

/// LLM provider identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    OpenAI,
    Gemini,
}

impl ProviderId {
    pub const ALL: [ProviderId; 2] = [ProviderId::OpenAI, ProviderId::Gemini];

    /// Parse the `model` field of a chat request.
    pub fn parse(value: &str) -> Result<Self, ChatError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" | "gpt" => Ok(ProviderId::OpenAI),
            "gemini" => Ok(ProviderId::Gemini),
            other => Err(ChatError::InvalidProvider(other.to_string())),
        }
    }

    /// The provider used to critique answers produced by `self`.
    pub fn opposite(self) -> Self {
        match self {
            ProviderId::OpenAI => ProviderId::Gemini,
            ProviderId::Gemini => ProviderId::OpenAI,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            ProviderId::OpenAI => "OpenAI",
            ProviderId::Gemini => "Gemini",
        }
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderId::OpenAI => write!(f, "openai"),
            ProviderId::Gemini => write!(f, "gemini"),
        }
    }
}
