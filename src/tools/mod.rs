//! Tools the model can call during answer generation.

mod outline;
mod search;

pub use outline::CourseOutlineTool;
pub use search::CourseSearchTool;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::errors::ApiError;
use crate::llm::ToolDefinition;

/// Citation surfaced to the user next to the answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub text: String,
    pub link: Option<String>,
}

/// Text handed back to the model plus the sources it was built from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub content: String,
    pub sources: Vec<Source>,
}

impl ToolOutput {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            sources: Vec::new(),
        }
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn definition(&self) -> ToolDefinition;

    /// Run the tool. Malformed arguments are reported as `ApiError::BadRequest`.
    async fn execute(&self, input: &Value) -> Result<ToolOutput, ApiError>;
}

pub(crate) fn parse_args<T: serde::de::DeserializeOwned>(
    tool: &str,
    input: &Value,
) -> Result<T, ApiError> {
    serde_json::from_value(input.clone()).map_err(|e| {
        ApiError::BadRequest(format!("Invalid arguments for {}: {}", tool, e))
    })
}

/// Registry of tools, kept in registration order.
#[derive(Default, Clone)]
pub struct ToolManager {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `tool`, replacing any tool with the same name.
    pub fn register_tool(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.definition().name;
        match self
            .tools
            .iter()
            .position(|existing| existing.definition().name == name)
        {
            Some(idx) => self.tools[idx] = tool,
            None => self.tools.push(tool),
        }
    }

    pub fn get_tool_definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|tool| tool.definition()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub async fn execute_tool(&self, name: &str, input: &Value) -> Result<ToolOutput, ApiError> {
        let Some(tool) = self
            .tools
            .iter()
            .find(|tool| tool.definition().name == name)
        else {
            return Ok(ToolOutput::text(format!("Tool '{}' not found", name)));
        };

        tool.execute(input).await
    }
}
