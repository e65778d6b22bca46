//! Tools offered to the model
//!
//! A [`ToolSet`] is built fresh from one provider listing per run. Each entry
//! pairs the definition the model sees with a callable that routes through
//! the confirmation gate to the provider.

mod mcp;

use std::collections::HashMap;
use std::sync::Arc;

use koala_mcp::McpTool;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::confirmation::ConfirmationGate;
use crate::provider::ToolProvider;

pub use mcp::ProviderTool;

/// Tool definition for LLM consumption
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Chat completions wire form: `{type: "function", function: {...}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionTool {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: ToolDefinition,
}

impl From<ToolDefinition> for FunctionTool {
    fn from(function: ToolDefinition) -> Self {
        Self {
            tool_type: "function".to_string(),
            function,
        }
    }
}

/// Callable tools from one provider listing, in listing order
#[derive(Default)]
pub struct ToolSet {
    tools: Vec<ProviderTool>,
    index: HashMap<String, usize>,
}

impl ToolSet {
    /// Wrap every descriptor. A repeated name keeps its first descriptor.
    pub fn from_descriptors(
        descriptors: Vec<McpTool>,
        provider: Arc<dyn ToolProvider>,
        gate: ConfirmationGate,
    ) -> Self {
        let mut set = Self::default();

        for descriptor in descriptors {
            if set.index.contains_key(&descriptor.name) {
                warn!(tool = %descriptor.name, "Duplicate tool name in listing, keeping the first");
                continue;
            }
            set.index.insert(descriptor.name.clone(), set.tools.len());
            set.tools
                .push(ProviderTool::new(descriptor, provider.clone(), gate.clone()));
        }

        set
    }

    pub fn get(&self, name: &str) -> Option<&ProviderTool> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    pub fn definitions(&self) -> Vec<FunctionTool> {
        self.tools
            .iter()
            .map(|tool| tool.definition().into())
            .collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|tool| tool.name()).collect()
    }
}
