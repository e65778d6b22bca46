//! Tool providers
//!
//! A tool provider lists tools, renders prompt templates and executes tool
//! calls. The MCP client is the production implementation; runs look their
//! provider up by name in [`ToolProviders`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use koala_mcp::{CallToolResult, GetPromptParams, GetPromptResult, McpClient, McpTool};
use parking_lot::RwLock;
use serde_json::Value;

use crate::error::{Error, Result, ToolError};

#[async_trait]
pub trait ToolProvider: Send + Sync {
    async fn list_tools(&self) -> Result<Vec<McpTool>>;

    async fn get_prompt(&self, params: &GetPromptParams) -> Result<GetPromptResult>;

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult>;
}

#[async_trait]
impl ToolProvider for McpClient {
    async fn list_tools(&self) -> Result<Vec<McpTool>> {
        McpClient::list_tools(self)
            .await
            .map_err(|e| Error::Provider(format!("Failed to list tools: {}", e)))
    }

    async fn get_prompt(&self, params: &GetPromptParams) -> Result<GetPromptResult> {
        McpClient::get_prompt(self, params)
            .await
            .map_err(|e| Error::Provider(format!("Failed to get prompt {}: {}", params.name, e)))
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult> {
        McpClient::call_tool(self, name, arguments)
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("{}: {}", name, e)).into())
    }
}

/// Named tool provider registry
#[derive(Default)]
pub struct ToolProviders {
    providers: RwLock<HashMap<String, Arc<dyn ToolProvider>>>,
}

impl ToolProviders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider, replacing any previous one with the same name
    pub fn register(&self, name: impl Into<String>, provider: Arc<dyn ToolProvider>) {
        self.providers.write().insert(name.into(), provider);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolProvider>> {
        self.providers.read().get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.read().keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EmptyProvider;

    #[async_trait]
    impl ToolProvider for EmptyProvider {
        async fn list_tools(&self) -> Result<Vec<McpTool>> {
            Ok(Vec::new())
        }

        async fn get_prompt(&self, _params: &GetPromptParams) -> Result<GetPromptResult> {
            Ok(GetPromptResult::default())
        }

        async fn call_tool(&self, name: &str, _arguments: Value) -> Result<CallToolResult> {
            Err(ToolError::ExecutionFailed(name.to_string()).into())
        }
    }

    #[test]
    fn test_registry_lookup() {
        let providers = ToolProviders::new();
        providers.register("weather", Arc::new(EmptyProvider));
        providers.register("koala-news", Arc::new(EmptyProvider));

        assert!(providers.get("koala-news").is_some());
        assert!(providers.get("missing").is_none());
        assert_eq!(providers.names(), vec!["koala-news", "weather"]);
    }
}
