//! Decoder for the optional `{step, content}` envelope around model output.
//!
//! Models are sometimes told to answer as `{"step":"result","content":"..."}`.
//! Only a reply that is entirely an envelope (optionally fenced) is decoded.
//! Decoding never fails: anything else is returned as the trimmed raw text.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

/// One protocol step emitted by the model.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub step: Option<String>,
    pub content: String,
}

static CODE_FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[a-zA-Z]*\s*\n?(.*?)\n?```$").unwrap());

/// Extract the answer text from `raw`.
pub fn decode_envelope(raw: &str) -> String {
    let trimmed = raw.trim();
    let unfenced = strip_code_fence(trimmed);

    decode_json(unfenced).unwrap_or_else(|| trimmed.to_string())
}

pub(crate) fn strip_code_fence(text: &str) -> &str {
    CODE_FENCE_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .unwrap_or(text)
}

fn decode_json(text: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;

    let content = if value.is_array() {
        let steps: Vec<Envelope> = serde_json::from_value(value).ok()?;
        let chosen = steps
            .iter()
            .rev()
            .find(|s| s.step.as_deref() == Some("result"))
            .or_else(|| steps.last())?;
        chosen.content.clone()
    } else {
        serde_json::from_value::<Envelope>(value).ok()?.content
    };

    let content = content.trim();
    if content.is_empty() {
        None
    } else {
        Some(content.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_result_content() {
        assert_eq!(decode_envelope(r#"{"step":"result","content":"X"}"#), "X");
    }

    #[test]
    fn test_non_json_is_returned_unchanged() {
        let raw = "Bilkul! DSA tumhara brain gym hai.";
        assert_eq!(decode_envelope(raw), raw);
    }

    #[test]
    fn test_malformed_json_is_returned_trimmed() {
        let raw = "  {\"step\":\"result\",\"content\": \n";
        assert_eq!(decode_envelope(raw), raw.trim());
    }

    #[test]
    fn test_fenced_envelope() {
        let raw = "```json\n{\"step\":\"result\",\"content\":\"Alright, practice daily.\"}\n```";
        assert_eq!(decode_envelope(raw), "Alright, practice daily.");
    }

    #[test]
    fn test_json_example_inside_prose_is_kept() {
        let raw = "Alright, to create a post you send this body to /posts: \
                   {\"title\":\"Hello\",\"content\":\"My first post\"} and the API answers 201.";
        assert_eq!(decode_envelope(raw), raw);
    }

    #[test]
    fn test_envelope_wrapped_in_prose_is_not_unwrapped() {
        let raw = "Here you go: {\"step\": \"result\", \"content\": \"Hanji!\"} hope it helps";
        assert_eq!(decode_envelope(raw), raw);
    }

    #[test]
    fn test_step_array_prefers_result() {
        let raw = r#"[
            {"step":"analyse","content":"user asks about DSA"},
            {"step":"result","content":"DSA matters."},
            {"step":"validate","content":"ok"}
        ]"#;
        assert_eq!(decode_envelope(raw), "DSA matters.");
    }

    #[test]
    fn test_step_array_without_result_uses_last() {
        let raw = r#"[{"step":"think","content":"a"},{"step":"output","content":"b"}]"#;
        assert_eq!(decode_envelope(raw), "b");
    }

    #[test]
    fn test_json_without_content_is_raw() {
        let raw = r#"{"answer":"42"}"#;
        assert_eq!(decode_envelope(raw), raw);
    }

    #[test]
    fn test_empty_content_falls_back_to_raw() {
        let raw = r#"{"step":"result","content":"  "}"#;
        assert_eq!(decode_envelope(raw), raw);
    }
}
