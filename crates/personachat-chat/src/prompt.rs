//! Prompt construction for persona answers and evaluation critiques.

use crate::types::Prompt;

/// Wrap the persona prompt with the internal step protocol.
pub fn build_prompt(persona_prompt: &str, user_message: &str) -> Prompt {
    let system = format!(
        "{persona}

IMPORTANT: You MUST follow the step-by-step protocol internally: analyse → think → output → validate → result

User's question: \"{message}\"

Please think through the steps internally but only respond with your final answer as plain text. Do NOT include any JSON, step labels, or technical formatting. Just provide your natural, conversational response directly as the persona would speak.

Internal process (do not show):
1. analyse - Analyze the user's question internally
2. think - Think about the approach internally
3. output - Plan your output internally
4. validate - Validate your approach internally
5. result - Provide ONLY your final answer as plain text

Respond naturally as the persona, without any JSON formatting or step indicators.",
        persona = persona_prompt.trim(),
        message = user_message,
    );

    Prompt {
        system,
        user: user_message.to_string(),
    }
}

/// Instruction for the critiquing provider.
pub fn evaluation_prompt(user_message: &str, answer: &str) -> Prompt {
    let system = "You are a strict reviewer of answers given by a coding mentor. \
Judge whether the answer is factually correct and complete for the question. \
Keep the mentor's tone when you write a correction.

Reply in exactly this format:
VERDICT: CORRECT or VERDICT: INCORRECT
EXPLANATION: one or two sentences
CORRECTED:
<the corrected answer, only when the verdict is INCORRECT>"
        .to_string();

    let user = format!(
        "Question:\n{}\n\nAnswer to review:\n{}",
        user_message.trim(),
        answer.trim()
    );

    Prompt { system, user }
}
