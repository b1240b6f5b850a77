//! The wheelhouse gateway: HTTP/SSE surface, turn scheduling, and the
//! agent runtime that ties the store, event bus, permission gate, tools,
//! and LLM provider into one deterministic loop.

pub mod api;
pub mod runtime;
pub mod state;
