//! ask_user - hand a question to the operator

use crate::error::{Error, Result};
use crate::registry::{Tool, ToolDefinition, ToolOutcome};
use serde_json::{json, Value};

/// Pauses the diagnosis with a question
pub struct AskUserTool {
    definition: ToolDefinition,
}

impl Default for AskUserTool {
    fn default() -> Self {
        Self::new()
    }
}

impl AskUserTool {
    /// Create the tool
    #[must_use]
    pub fn new() -> Self {
        let definition = ToolDefinition::new(
            "ask_user",
            "Ask the operator a question when information cannot be obtained any other way",
        )
        .with_parameters(json!({
            "type": "object",
            "properties": {
                "question": {"type": "string", "description": "Question for the operator"}
            },
            "required": ["question"]
        }));
        Self { definition }
    }
}

#[async_trait::async_trait]
impl Tool for AskUserTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn execute(&self, input: Value) -> Result<ToolOutcome> {
        let question = input
            .get("question")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| Error::InvalidInput("missing 'question'".to_string()))?;
        Ok(ToolOutcome::NeedsInput {
            question: question.to_string(),
        })
    }
}
