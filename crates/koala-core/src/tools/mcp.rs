//! Provider-backed tool
//!
//! Invocation order: confirm the call, execute it on the provider, confirm
//! the result, hand the content back to the runner.

use std::sync::Arc;

use koala_mcp::{ContentItem, McpTool};
use serde_json::Value;
use tracing::{debug, warn};

use super::ToolDefinition;
use crate::confirmation::{ConfirmationGate, ConfirmationRequest};
use crate::error::Result;
use crate::provider::ToolProvider;

pub struct ProviderTool {
    descriptor: McpTool,
    provider: Arc<dyn ToolProvider>,
    gate: ConfirmationGate,
}

impl ProviderTool {
    pub fn new(descriptor: McpTool, provider: Arc<dyn ToolProvider>, gate: ConfirmationGate) -> Self {
        Self {
            descriptor,
            provider,
            gate,
        }
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Missing descriptions become empty strings; the schema passes through
    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.descriptor.name.clone(),
            description: self.descriptor.description.clone().unwrap_or_default(),
            parameters: self.descriptor.input_schema.clone(),
        }
    }

    pub async fn invoke(&self, input: Value) -> Result<Vec<ContentItem>> {
        let name = self.name();

        self.gate
            .request_confirmation(ConfirmationRequest::ConfirmToolCall {
                tool_name: name.to_string(),
                input: input.clone(),
            })
            .await?;

        debug!(tool = name, "Calling tool");
        let result = self.provider.call_tool(name, input).await?;
        if result.is_error {
            warn!(tool = name, "Tool reported an error result");
        }

        self.gate
            .request_confirmation(ConfirmationRequest::ConfirmToolResult {
                tool_name: name.to_string(),
                result: serde_json::to_value(&result.content)?,
            })
            .await?;

        Ok(result.content)
    }
}
