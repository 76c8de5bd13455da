//! Scripted provider for tests and offline runs
//!
//! Responses are queued and handed out in order. Errors can be queued too,
//! which lets callers exercise retry and fallback paths deterministically.

use crate::completion::{
    CompletionRequest, CompletionResponse, ToolCompletionRequest, ToolCompletionResponse,
};
use crate::error::{Error, Result};
use crate::provider::LlmProvider;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

enum Scripted {
    Tools(ToolCompletionResponse),
    Text(String),
    Fail(Error),
}

/// A provider that replays queued responses
pub struct MockProvider {
    queue: Arc<Mutex<VecDeque<Scripted>>>,
    calls: AtomicUsize,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvider {
    /// Create an empty mock
    #[must_use]
    pub fn new() -> Self {
        Self {
            queue: Arc::new(Mutex::new(VecDeque::new())),
            calls: AtomicUsize::new(0),
        }
    }

    fn push(&self, item: Scripted) {
        self.queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(item);
    }

    fn pop(&self) -> Option<Scripted> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
    }

    /// Queue a tool-completion response
    pub fn add_tool_response(&self, response: ToolCompletionResponse) {
        self.push(Scripted::Tools(response));
    }

    /// Queue a plain text response
    pub fn add_text_response(&self, content: impl Into<String>) {
        self.push(Scripted::Text(content.into()));
    }

    /// Queue an error
    pub fn add_error(&self, error: Error) {
        self.push(Scripted::Fail(error));
    }

    /// Number of requests served so far
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn supports_tools(&self) -> bool {
        true
    }

    fn default_model(&self) -> &str {
        "mock-model"
    }

    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse> {
        let content = match self.pop() {
            Some(Scripted::Text(text)) => text,
            Some(Scripted::Tools(resp)) => resp.content.unwrap_or_default(),
            Some(Scripted::Fail(e)) => return Err(e),
            None => "mock response".to_string(),
        };
        Ok(CompletionResponse {
            content,
            usage: None,
            finish_reason: Some("stop".to_string()),
            model: "mock-model".to_string(),
        })
    }

    async fn complete_with_tools(
        &self,
        _request: ToolCompletionRequest,
    ) -> Result<ToolCompletionResponse> {
        match self.pop() {
            Some(Scripted::Tools(resp)) => Ok(resp),
            Some(Scripted::Text(text)) => Ok(ToolCompletionResponse::text(text)),
            Some(Scripted::Fail(e)) => Err(e),
            None => Ok(ToolCompletionResponse::text("mock response")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolCall;

    #[tokio::test]
    async fn test_queue_order() {
        let mock = MockProvider::new();
        mock.add_error(Error::Timeout(10));
        mock.add_tool_response(ToolCompletionResponse::calls(vec![ToolCall {
            id: "c1".into(),
            name: "query_cmdb".into(),
            arguments: r#"{"hosts":["a"]}"#.into(),
        }]));

        let req = || ToolCompletionRequest::new(CompletionRequest::new(""), vec![]);

        assert!(matches!(
            mock.complete_with_tools(req()).await,
            Err(Error::Timeout(10))
        ));
        let second = mock.complete_with_tools(req()).await.unwrap();
        assert_eq!(second.tool_calls[0].name, "query_cmdb");

        let fallback = mock.complete_with_tools(req()).await.unwrap();
        assert!(!fallback.has_tool_calls());
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_text_completion() {
        let mock = MockProvider::new();
        mock.add_text_response(r#"{"confidence":0.9}"#);
        let resp = mock.complete(CompletionRequest::new("")).await.unwrap();
        assert!(resp.content.contains("0.9"));
    }
}
