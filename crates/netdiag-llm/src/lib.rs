//! netdiag LLM - dynamic policy transport
//!
//! This crate provides the LLM plumbing used by the dynamic diagnosis policy
//! and the low-confidence analysis hook:
//! - Provider: the `LlmProvider` trait every backend implements
//! - OpenAI-compatible: chat-completions over HTTP (OpenAI, vLLM, DeepSeek, ...)
//! - Mock: scripted provider for tests and offline runs

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod completion;
pub mod error;
pub mod message;
pub mod mock;
pub mod openai_compat;
pub mod provider;
pub mod tools;

pub use completion::{
    CompletionRequest, CompletionResponse, TokenUsage, ToolCompletionRequest,
    ToolCompletionResponse,
};
pub use error::{Error, Result};
pub use message::{Message, MessageRole};
pub use mock::MockProvider;
pub use openai_compat::{OpenAiCompatConfig, OpenAiCompatProvider};
pub use provider::LlmProvider;
pub use tools::{ToolCall, ToolChoice, ToolDefinition};
