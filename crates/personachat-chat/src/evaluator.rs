//! Post-hoc correctness check by the opposite provider.
//!
//! Best-effort: every failure is logged and reported as "skipped", and a
//! verdict that cannot be read is treated as correct.

use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use personachat_core::ProviderId;
use regex::Regex;
use serde_json::Value;
use tracing::{info, warn};

use crate::envelope::strip_code_fence;
use crate::prompt::evaluation_prompt;
use crate::providers::ProviderAdapter;
use crate::types::EvaluationResult;

static VERDICT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^[\s*#_]*verdict[\s*_]*:[\s*_]*(correct|incorrect)\b").unwrap()
});
static EXPLANATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^[\s*_]*explanation[\s*_]*:[\s*_]*(.+)$").unwrap());
static CORRECTED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^[\s*#_]*corrected(?:\s+(?:answer|response))?[\s*_]*:").unwrap()
});

/// Critiques finished answers with one provider and a server-side key.
pub struct Evaluator {
    adapter: Arc<dyn ProviderAdapter>,
    api_key: String,
    timeout: Duration,
}

impl Evaluator {
    pub fn new(adapter: Arc<dyn ProviderAdapter>, api_key: impl Into<String>, timeout: Duration) -> Self {
        Self {
            adapter,
            api_key: api_key.into(),
            timeout,
        }
    }

    pub fn provider(&self) -> ProviderId {
        self.adapter.id()
    }

    /// Judge `answer`. `None` means the evaluation was skipped.
    pub async fn evaluate(&self, user_message: &str, answer: &str) -> Option<EvaluationResult> {
        let prompt = evaluation_prompt(user_message, answer);
        let call = self.adapter.complete_once(&prompt, &self.api_key);

        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(text)) => {
                let result = parse_verdict(&text);
                info!(
                    evaluator = %self.provider(),
                    is_correct = result.is_correct,
                    "Evaluation finished"
                );
                Some(result)
            }
            Ok(Err(e)) => {
                warn!("Evaluation skipped: {}", e);
                None
            }
            Err(_) => {
                warn!(
                    "Evaluation skipped: {} did not answer within {:?}",
                    self.provider(),
                    self.timeout
                );
                None
            }
        }
    }
}

/// Read a verdict from the evaluator's free text.
///
/// Accepts a JSON object (`isCorrect`, `explanation`, `correctedResponse`) or
/// the `VERDICT:` / `EXPLANATION:` / `CORRECTED:` marker format. A missing or
/// contradictory verdict decodes as correct.
pub fn parse_verdict(text: &str) -> EvaluationResult {
    let body = strip_code_fence(text.trim());

    if let Some(result) = parse_json_verdict(body) {
        return result;
    }

    let verdicts: Vec<bool> = VERDICT_RE
        .captures_iter(body)
        .map(|c| c[1].eq_ignore_ascii_case("correct"))
        .collect();

    let explanation = EXPLANATION_RE
        .captures(body)
        .map(|c| c[1].trim().to_string())
        .unwrap_or_default();

    let is_correct = match verdicts.split_first() {
        None => return EvaluationResult::correct("No verdict found"),
        Some((first, rest)) if rest.iter().any(|v| v != first) => {
            return EvaluationResult::correct("Ambiguous verdict");
        }
        Some((first, _)) => *first,
    };

    if is_correct {
        return EvaluationResult::correct(explanation);
    }

    let corrected_text = CORRECTED_RE
        .find(body)
        .map(|m| body[m.end()..].trim().to_string())
        .filter(|s| !s.is_empty());

    EvaluationResult {
        is_correct: false,
        explanation,
        corrected_text,
    }
}

fn parse_json_verdict(body: &str) -> Option<EvaluationResult> {
    let value: Value = serde_json::from_str(body).ok()?;
    let is_correct = value
        .get("isCorrect")
        .or_else(|| value.get("is_correct"))?
        .as_bool()?;
    let explanation = value["explanation"].as_str().unwrap_or_default().trim().to_string();
    let corrected_text = ["correctedResponse", "correctedText", "corrected_response"]
        .iter()
        .find_map(|k| value[*k].as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !is_correct && !s.is_empty());

    Some(EvaluationResult {
        is_correct,
        explanation,
        corrected_text,
    })
}

/// Follow-up fragment appended after an answer judged incorrect.
pub fn correction_fragment(result: &EvaluationResult) -> Option<String> {
    if result.is_correct {
        return None;
    }

    let mut fragment = String::from("\n\n---\n\n**Correction:**");
    if !result.explanation.is_empty() {
        fragment.push(' ');
        fragment.push_str(&result.explanation);
    }
    if let Some(corrected) = &result.corrected_text {
        fragment.push_str("\n\n");
        fragment.push_str(corrected);
    }
    Some(fragment)
}
