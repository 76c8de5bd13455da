//! Function-calling types

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Schema of a tool the model may call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name
    pub name: String,
    /// What the tool does, shown to the model
    pub description: String,
    /// JSON schema of the arguments object
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    /// Create a tool definition
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// A tool call requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider-assigned call id
    pub id: String,
    /// Tool name
    pub name: String,
    /// Arguments as a JSON string, exactly as the model produced them
    pub arguments: String,
}

impl ToolCall {
    /// Decode the arguments string into a JSON value.
    ///
    /// An empty string is treated as an empty object.
    pub fn arguments_value(&self) -> Result<serde_json::Value> {
        if self.arguments.trim().is_empty() {
            return Ok(serde_json::json!({}));
        }
        serde_json::from_str(&self.arguments).map_err(|e| {
            Error::InvalidResponse(format!("tool '{}' arguments: {}", self.name, e))
        })
    }
}

/// How the model is allowed to pick tools
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoice {
    /// Model decides
    #[default]
    Auto,
    /// Never call tools
    None,
    /// Must call at least one tool
    Required,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arguments_value() {
        let call = ToolCall {
            id: "call_1".into(),
            name: "execute_command".into(),
            arguments: r#"{"host":"10.0.1.10","command":"ss -tlnp"}"#.into(),
        };
        let args = call.arguments_value().unwrap();
        assert_eq!(args["host"], "10.0.1.10");
    }

    #[test]
    fn test_empty_arguments_are_object() {
        let call = ToolCall {
            id: "call_2".into(),
            name: "query_cmdb".into(),
            arguments: "  ".into(),
        };
        assert!(call.arguments_value().unwrap().is_object());
    }

    #[test]
    fn test_malformed_arguments() {
        let call = ToolCall {
            id: "call_3".into(),
            name: "ask_user".into(),
            arguments: "{question:".into(),
        };
        assert!(matches!(
            call.arguments_value(),
            Err(Error::InvalidResponse(_))
        ));
    }
}
