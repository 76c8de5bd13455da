//! Registry - Tool registration and discovery
//!
//! Tools are registered once at startup. Registration validates each
//! tool's parameter schema and rejects duplicate names, so a malformed
//! tool fails the process early instead of failing a diagnosis later.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Tool metadata and schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Unique tool name
    pub name: String,
    /// Description shown to policies
    pub description: String,
    /// JSON schema for parameters
    pub parameters: Value,
}

impl ToolDefinition {
    /// Create a definition with an empty object schema
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {},
                "required": []
            }),
        }
    }

    /// Set the parameters schema
    #[must_use]
    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }

    /// Names listed under the schema's `required`
    #[must_use]
    pub fn required_fields(&self) -> Vec<&str> {
        self.parameters
            .get("required")
            .and_then(|r| r.as_array())
            .map(|r| r.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default()
    }

    fn validate_schema(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::Registration("tool name is empty".to_string()));
        }
        let schema = &self.parameters;
        if schema.get("type").and_then(|t| t.as_str()) != Some("object") {
            return Err(Error::Registration(format!(
                "{}: parameters must be an object schema",
                self.name
            )));
        }
        let properties = schema
            .get("properties")
            .and_then(|p| p.as_object())
            .ok_or_else(|| {
                Error::Registration(format!("{}: schema has no properties map", self.name))
            })?;
        if let Some(missing) = self
            .required_fields()
            .into_iter()
            .find(|field| !properties.contains_key(*field))
        {
            return Err(Error::Registration(format!(
                "{}: required field '{}' is not a declared property",
                self.name, missing
            )));
        }
        Ok(())
    }
}

/// Result of a tool execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether execution succeeded
    pub success: bool,
    /// Output data
    pub output: Value,
    /// Error message if failed
    pub error: Option<String>,
    /// Execution duration in milliseconds
    pub duration_ms: u64,
}

impl ToolResult {
    /// Create a successful result
    #[must_use]
    pub fn success(output: Value, duration_ms: u64) -> Self {
        Self {
            success: true,
            output,
            error: None,
            duration_ms,
        }
    }

    /// Create a failed result
    #[must_use]
    pub fn failure(error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            success: false,
            output: Value::Null,
            error: Some(error.into()),
            duration_ms,
        }
    }
}

/// What a tool produced
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    /// The tool ran to completion
    Completed(ToolResult),
    /// The tool needs an answer from the operator before anything else runs
    NeedsInput {
        /// Question for the operator
        question: String,
    },
}

impl ToolOutcome {
    /// The completed result, if any
    #[must_use]
    pub fn result(&self) -> Option<&ToolResult> {
        match self {
            Self::Completed(result) => Some(result),
            Self::NeedsInput { .. } => None,
        }
    }
}

impl From<ToolResult> for ToolOutcome {
    fn from(result: ToolResult) -> Self {
        Self::Completed(result)
    }
}

/// Trait for tool implementations
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool definition
    fn definition(&self) -> &ToolDefinition;

    /// Execute the tool with given input
    async fn execute(&self, input: Value) -> Result<ToolOutcome>;

    /// Validate input before execution
    fn validate_input(&self, input: &Value) -> Result<()> {
        let Some(object) = input.as_object() else {
            return Err(Error::InvalidInput("input must be an object".to_string()));
        };
        let definition = self.definition();
        for field in definition.required_fields() {
            if object.get(field).map_or(true, Value::is_null) {
                return Err(Error::InvalidInput(format!(
                    "{}: missing required field '{}'",
                    definition.name, field
                )));
            }
        }
        Ok(())
    }
}

/// Registry for managing tools
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create a new empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool after validating its schema
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        let def = tool.definition();
        def.validate_schema()?;
        if self.tools.contains_key(&def.name) {
            return Err(Error::Registration(format!(
                "tool '{}' registered twice",
                def.name
            )));
        }
        debug!(tool = %def.name, "Registering tool");
        self.tools.insert(def.name.clone(), tool);
        Ok(())
    }

    /// Get a tool by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Check if a tool exists
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// All tool names, sorted
    #[must_use]
    pub fn list_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// All tool definitions, sorted by name
    #[must_use]
    pub fn list_definitions(&self) -> Vec<&ToolDefinition> {
        let mut defs: Vec<&ToolDefinition> =
            self.tools.values().map(|t| t.definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Definitions in the shape the LLM client expects
    #[must_use]
    pub fn to_llm_tools(&self) -> Vec<netdiag_llm::ToolDefinition> {
        self.list_definitions()
            .into_iter()
            .map(|d| {
                netdiag_llm::ToolDefinition::new(
                    d.name.clone(),
                    d.description.clone(),
                    d.parameters.clone(),
                )
            })
            .collect()
    }

    /// Number of registered tools
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether no tool is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoTool {
        definition: ToolDefinition,
    }

    impl EchoTool {
        fn new(name: &str, parameters: Value) -> Self {
            Self {
                definition: ToolDefinition::new(name, "echo").with_parameters(parameters),
            }
        }
    }

    #[async_trait::async_trait]
    impl Tool for EchoTool {
        fn definition(&self) -> &ToolDefinition {
            &self.definition
        }

        async fn execute(&self, input: Value) -> Result<ToolOutcome> {
            Ok(ToolResult::success(input, 0).into())
        }
    }

    fn host_schema() -> Value {
        json!({
            "type": "object",
            "properties": {"host": {"type": "string"}},
            "required": ["host"]
        })
    }

    #[test]
    fn test_register_and_list() {
        let mut registry = ToolRegistry::new();
        registry
            .register(Arc::new(EchoTool::new("b_tool", host_schema())))
            .unwrap();
        registry
            .register(Arc::new(EchoTool::new("a_tool", host_schema())))
            .unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.list_names(), vec!["a_tool", "b_tool"]);
        assert!(registry.has("a_tool"));
        assert_eq!(registry.to_llm_tools()[0].name, "a_tool");
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut registry = ToolRegistry::new();
        registry
            .register(Arc::new(EchoTool::new("ping_test", host_schema())))
            .unwrap();
        let err = registry
            .register(Arc::new(EchoTool::new("ping_test", host_schema())))
            .unwrap_err();
        assert!(matches!(err, Error::Registration(_)));
    }

    #[test]
    fn test_bad_schema_rejected() {
        let mut registry = ToolRegistry::new();
        assert!(registry
            .register(Arc::new(EchoTool::new("x", json!({"type": "string"}))))
            .is_err());
        assert!(registry
            .register(Arc::new(EchoTool::new(
                "y",
                json!({"type": "object", "properties": {}, "required": ["host"]})
            )))
            .is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_validate_required_fields() {
        let tool = EchoTool::new("t", host_schema());
        assert!(tool.validate_input(&json!({"host": "10.0.1.10"})).is_ok());
        assert!(tool.validate_input(&json!({"host": null})).is_err());
        assert!(tool.validate_input(&json!({})).is_err());
        assert!(tool.validate_input(&json!("host")).is_err());
    }
}
