//! Shared domain types for the wheelhouse orchestrator.
//!
//! Everything provider- and transport-agnostic lives here: the error type,
//! the configuration model, chat messages and tool calls, and the streaming
//! event vocabulary used between the LLM adapters and the turn runner.

pub mod config;
pub mod error;
pub mod stream;
pub mod tool;

pub use error::{Error, Result};
