//! OpenAI-compatible chat-completions provider
//!
//! Works against any endpoint speaking the `/chat/completions` dialect:
//! OpenAI itself, self-hosted vLLM / Ollama gateways, DeepSeek and similar.

use crate::completion::{
    CompletionRequest, CompletionResponse, TokenUsage, ToolCompletionRequest,
    ToolCompletionResponse,
};
use crate::error::{Error, Result};
use crate::message::Message;
use crate::provider::LlmProvider;
use crate::tools::{ToolCall, ToolChoice, ToolDefinition};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, instrument};

/// Default API base URL
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Default model
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Provider configuration
#[derive(Clone)]
pub struct OpenAiCompatConfig {
    /// API key sent as a bearer token
    pub api_key: String,
    /// Base URL without the `/chat/completions` suffix
    pub base_url: String,
    /// Model used when a request does not name one
    pub default_model: String,
    /// Per-request timeout
    pub timeout: Duration,
}

// The API key never reaches logs.
impl fmt::Debug for OpenAiCompatConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiCompatConfig")
            .field("api_key", &mask_api_key(&self.api_key))
            .field("base_url", &self.base_url)
            .field("default_model", &self.default_model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn mask_api_key(key: &str) -> String {
    if key.len() <= 8 {
        return "****".to_string();
    }
    format!("{}...{}", &key[..4], &key[key.len() - 4..])
}

/// Strip anything that could echo credentials back into logs or reports
fn sanitize_api_error(error: &str) -> String {
    let lower = error.to_lowercase();
    if lower.contains("api key") || lower.contains("apikey") || lower.contains("sk-") {
        return "API authentication error. Check NETDIAG_LLM__API_KEY.".to_string();
    }
    if error.chars().count() > 200 {
        return format!("{}...", error.chars().take(200).collect::<String>());
    }
    error.to_string()
}

impl OpenAiCompatConfig {
    /// Create a configuration with an API key and the default endpoint
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            default_model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(60),
        }
    }

    /// Read `NETDIAG_LLM__API_KEY` (or `OPENAI_API_KEY`), plus optional
    /// `NETDIAG_LLM__BASE_URL` and `NETDIAG_LLM__MODEL`.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("NETDIAG_LLM__API_KEY")
            .or_else(|_| std::env::var("OPENAI_API_KEY"))
            .map_err(|_| Error::NotConfigured("NETDIAG_LLM__API_KEY not set".to_string()))?;

        let mut config = Self::new(api_key);
        if let Ok(base_url) = std::env::var("NETDIAG_LLM__BASE_URL") {
            config.base_url = base_url;
        }
        if let Ok(model) = std::env::var("NETDIAG_LLM__MODEL") {
            config.default_model = model;
        }
        Ok(config)
    }

    /// Set the base URL
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the default model
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// Set the request timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// OpenAI-compatible provider
pub struct OpenAiCompatProvider {
    client: Client,
    config: OpenAiCompatConfig,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ChatTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Serialize)]
struct ChatTool {
    r#type: &'static str,
    function: ChatFunction,
}

#[derive(Serialize)]
struct ChatFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
    #[serde(default)]
    model: String,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ChatToolCall>>,
}

#[derive(Deserialize)]
struct ChatToolCall {
    id: String,
    function: ChatToolCallFunction,
}

#[derive(Deserialize)]
struct ChatToolCallFunction {
    name: String,
    arguments: String,
}

#[derive(Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

impl From<ChatUsage> for TokenUsage {
    fn from(u: ChatUsage) -> Self {
        Self {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }
    }
}

/// Map an HTTP status to the error taxonomy used for retry decisions
fn classify_status(status: StatusCode, body: &str, retry_after: Option<u64>) -> Error {
    match status.as_u16() {
        401 | 403 => Error::Auth(sanitize_api_error(body)),
        429 => Error::RateLimit { retry_after },
        code => Error::Api {
            status: code,
            message: sanitize_api_error(body),
        },
    }
}

fn classify_transport(e: &reqwest::Error, timeout: Duration) -> Error {
    if e.is_timeout() {
        Error::Timeout(timeout.as_millis() as u64)
    } else {
        Error::Network(sanitize_api_error(&e.to_string()))
    }
}

impl OpenAiCompatProvider {
    /// Create a provider
    pub fn new(config: OpenAiCompatConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(Error::NotConfigured("empty API key".to_string()));
        }
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::NotConfigured(format!("HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(OpenAiCompatConfig::from_env()?)
    }

    fn convert_message(msg: &Message) -> ChatMessage {
        ChatMessage {
            role: msg.role.as_str(),
            content: msg.content.clone(),
            tool_call_id: msg.tool_call_id.clone(),
        }
    }

    fn convert_tool(tool: &ToolDefinition) -> ChatTool {
        ChatTool {
            r#type: "function",
            function: ChatFunction {
                name: tool.name.clone(),
                description: tool.description.clone(),
                parameters: tool.parameters.clone(),
            },
        }
    }

    fn convert_tool_choice(choice: &ToolChoice) -> &'static str {
        match choice {
            ToolChoice::Auto => "auto",
            ToolChoice::None => "none",
            ToolChoice::Required => "required",
        }
    }

    fn model_for<'a>(&'a self, requested: &'a str) -> &'a str {
        if requested.is_empty() {
            &self.config.default_model
        } else {
            requested
        }
    }

    async fn send(&self, body: &ChatRequest<'_>) -> Result<ChatResponse> {
        let response = self
            .client
            .post(format!(
                "{}/chat/completions",
                self.config.base_url.trim_end_matches('/')
            ))
            .bearer_auth(&self.config.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| classify_transport(&e, self.config.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &text, retry_after));
        }

        response
            .json()
            .await
            .map_err(|e| Error::InvalidResponse(e.to_string()))
    }
}

#[async_trait::async_trait]
impl LlmProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        "openai-compatible"
    }

    fn supports_tools(&self) -> bool {
        true
    }

    fn default_model(&self) -> &str {
        &self.config.default_model
    }

    #[instrument(skip(self, request), fields(model = %self.model_for(&request.model)))]
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let body = ChatRequest {
            model: self.model_for(&request.model),
            messages: request.messages.iter().map(Self::convert_message).collect(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            tools: None,
            tool_choice: None,
        };

        debug!("Sending completion request");
        let chat = self.send(&body).await?;
        let choice = chat
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::InvalidResponse("No choices in response".to_string()))?;

        Ok(CompletionResponse {
            content: choice.message.content.unwrap_or_default(),
            usage: chat.usage.map(TokenUsage::from),
            finish_reason: choice.finish_reason,
            model: chat.model,
        })
    }

    #[instrument(
        skip(self, request),
        fields(model = %self.model_for(&request.request.model), tools = request.tools.len())
    )]
    async fn complete_with_tools(
        &self,
        request: ToolCompletionRequest,
    ) -> Result<ToolCompletionResponse> {
        let body = ChatRequest {
            model: self.model_for(&request.request.model),
            messages: request
                .request
                .messages
                .iter()
                .map(Self::convert_message)
                .collect(),
            max_tokens: request.request.max_tokens,
            temperature: request.request.temperature,
            tools: Some(request.tools.iter().map(Self::convert_tool).collect()),
            tool_choice: Some(Self::convert_tool_choice(&request.tool_choice)),
        };

        debug!("Sending tool completion request");
        let chat = self.send(&body).await?;
        let choice = chat
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::InvalidResponse("No choices in response".to_string()))?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolCall {
                id: tc.id,
                name: tc.function.name,
                arguments: tc.function.arguments,
            })
            .collect();

        Ok(ToolCompletionResponse {
            content: choice.message.content,
            tool_calls,
            usage: chat.usage.map(TokenUsage::from),
            finish_reason: choice.finish_reason,
            model: chat.model,
        })
    }
}
