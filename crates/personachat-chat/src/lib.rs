//! Persona chat service with external LLM providers (OpenAI/Gemini).
//!
//! Resolves a persona prompt, calls the chosen provider once or as a stream,
//! and optionally has the other provider critique the finished answer.

pub mod envelope;
pub mod evaluator;
pub mod persona;
pub mod prompt;
pub mod providers;
pub mod relay;
pub mod service;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;
pub mod types;

pub use service::{ChatService, FrameStream, PreparedChat};
pub use types::*;
