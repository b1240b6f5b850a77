//! LLM provider adapters.
//!
//! The orchestrator only depends on the [`LlmProvider`] trait; the single
//! shipped adapter speaks the OpenAI chat-completions wire format, which
//! also covers Azure-style gateways, Ollama, vLLM and the various hosted
//! compatibles.

pub mod openai_compat;
mod sse;
pub mod traits;

pub use openai_compat::OpenAiCompatProvider;
pub use traits::{ChatRequest, ChatResponse, LlmProvider};
