//! Completion requests and responses

use crate::message::Message;
use crate::tools::{ToolCall, ToolChoice, ToolDefinition};
use serde::{Deserialize, Serialize};

/// Token accounting reported by the provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Prompt tokens
    pub prompt_tokens: u32,
    /// Completion tokens
    pub completion_tokens: u32,
    /// Total tokens
    pub total_tokens: u32,
}

/// Plain completion request
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    /// Model name; empty means the provider default
    pub model: String,
    /// Conversation
    pub messages: Vec<Message>,
    /// Output token cap
    pub max_tokens: Option<u32>,
    /// Sampling temperature
    pub temperature: Option<f32>,
}

impl CompletionRequest {
    /// Create a request for a model
    #[must_use]
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }

    /// Append a message
    #[must_use]
    pub fn with_message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    /// Set the output token cap
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the sampling temperature
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Plain completion response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Generated text
    pub content: String,
    /// Token usage
    pub usage: Option<TokenUsage>,
    /// Finish reason
    pub finish_reason: Option<String>,
    /// Model that answered
    pub model: String,
}

/// Completion request offering tools
#[derive(Debug, Clone)]
pub struct ToolCompletionRequest {
    /// Base request
    pub request: CompletionRequest,
    /// Tools the model may call
    pub tools: Vec<ToolDefinition>,
    /// Tool selection strategy
    pub tool_choice: ToolChoice,
}

impl ToolCompletionRequest {
    /// Create a tool request with automatic tool choice
    #[must_use]
    pub fn new(request: CompletionRequest, tools: Vec<ToolDefinition>) -> Self {
        Self {
            request,
            tools,
            tool_choice: ToolChoice::Auto,
        }
    }

    /// Set the tool choice
    #[must_use]
    pub fn with_tool_choice(mut self, choice: ToolChoice) -> Self {
        self.tool_choice = choice;
        self
    }
}

/// Response that may request tool calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCompletionResponse {
    /// Text content, usually the model's reasoning or conclusion
    pub content: Option<String>,
    /// Requested tool calls, in order
    pub tool_calls: Vec<ToolCall>,
    /// Token usage
    pub usage: Option<TokenUsage>,
    /// Finish reason
    pub finish_reason: Option<String>,
    /// Model that answered
    pub model: String,
}

impl ToolCompletionResponse {
    /// Text-only response with no tool calls
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: Vec::new(),
            usage: None,
            finish_reason: Some("stop".to_string()),
            model: String::new(),
        }
    }

    /// Response requesting the given tool calls
    #[must_use]
    pub fn calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            content: None,
            tool_calls,
            usage: None,
            finish_reason: Some("tool_calls".to_string()),
            model: String::new(),
        }
    }

    /// Whether the model asked for any tool
    #[must_use]
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let request = CompletionRequest::new("gpt-4o-mini")
            .with_message(Message::system("You diagnose network faults"))
            .with_message(Message::user("10.0.1.10 cannot reach 10.0.2.20:80"))
            .with_temperature(0.3)
            .with_max_tokens(512);

        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.temperature, Some(0.3));
        assert_eq!(request.max_tokens, Some(512));
    }

    #[test]
    fn test_tool_request_choice() {
        let tools = vec![ToolDefinition::new(
            "ask_user",
            "Ask the operator",
            serde_json::json!({"type": "object"}),
        )];
        let request = ToolCompletionRequest::new(CompletionRequest::new(""), tools)
            .with_tool_choice(ToolChoice::Required);
        assert_eq!(request.tool_choice, ToolChoice::Required);
        assert_eq!(request.tools.len(), 1);
    }

    #[test]
    fn test_response_helpers() {
        assert!(!ToolCompletionResponse::text("firewall drops 80").has_tool_calls());

        let response = ToolCompletionResponse::calls(vec![ToolCall {
            id: "c1".into(),
            name: "ping".into(),
            arguments: "{}".into(),
        }]);
        assert!(response.has_tool_calls());
        assert!(response.content.is_none());
    }
}
