//! Chat types matching the browser client's API surface.

use serde::{Deserialize, Serialize};

/// Incoming chat request.
///
/// `message` and `persona` are optional at the serde level so that a missing
/// field is reported as a validation error instead of a body rejection.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub persona: Option<String>,
    /// Provider name: `openai` or `gemini`.
    #[serde(default)]
    pub model: Option<String>,
    /// Client-supplied key. Untrusted; only honoured by providers that accept it.
    #[serde(default, rename = "apiKey")]
    pub api_key: Option<String>,
    #[serde(default, rename = "useEvaluation")]
    pub use_evaluation: bool,
    #[serde(default)]
    pub stream: bool,
}

/// System prompt plus user message, ready for a provider call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

/// Single-shot chat response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatReply {
    pub step: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub evaluation: Option<EvaluationResult>,
}

impl ChatReply {
    pub fn result(content: impl Into<String>) -> Self {
        Self {
            step: "result".into(),
            content: content.into(),
            evaluation: None,
        }
    }
}

/// Outcome of the post-hoc correctness check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationResult {
    #[serde(rename = "isCorrect")]
    pub is_correct: bool,
    pub explanation: String,
    #[serde(rename = "correctedText", skip_serializing_if = "Option::is_none", default)]
    pub corrected_text: Option<String>,
}

impl EvaluationResult {
    pub fn correct(explanation: impl Into<String>) -> Self {
        Self {
            is_correct: true,
            explanation: explanation.into(),
            corrected_text: None,
        }
    }
}

/// Wire unit of the streaming response, one per `data:` line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StreamFrame {
    Content { content: String },
    Error { error: String, done: bool },
    Done { done: bool },
}

impl StreamFrame {
    pub fn content(text: impl Into<String>) -> Self {
        StreamFrame::Content {
            content: text.into(),
        }
    }

    pub fn done() -> Self {
        StreamFrame::Done { done: true }
    }

    pub fn error(message: impl Into<String>) -> Self {
        StreamFrame::Error {
            error: message.into(),
            done: true,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamFrame::Content { .. })
    }

    /// Render as a server-sent-event style frame: `data: {json}\n\n`.
    pub fn to_sse(&self) -> String {
        // Serializing these plain string/bool shapes cannot fail.
        let json = serde_json::to_string(self).unwrap_or_else(|_| "{\"done\":true}".into());
        format!("data: {}\n\n", json)
    }
}

/// Persona listing entry.
#[derive(Debug, Clone, Serialize)]
pub struct PersonaSummary {
    pub id: &'static str,
    pub name: &'static str,
}
