//! LLM provider trait

use crate::completion::{
    CompletionRequest, CompletionResponse, ToolCompletionRequest, ToolCompletionResponse,
};
use crate::error::Result;

/// Trait for LLM providers
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name
    fn name(&self) -> &str;

    /// Whether the provider supports function calling
    fn supports_tools(&self) -> bool;

    /// Default model used when a request leaves `model` empty
    fn default_model(&self) -> &str;

    /// Text completion
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    /// Completion with tools
    async fn complete_with_tools(
        &self,
        request: ToolCompletionRequest,
    ) -> Result<ToolCompletionResponse>;
}
