//! Hosted LLM integration.
//!
//! The chat client and the per-stage payload extraction live here; the rest
//! of the pipeline deals only in structured types.

pub mod client;
pub mod extract;

pub use client::{ChatModel, LlmConfig, OpenAiClient};
