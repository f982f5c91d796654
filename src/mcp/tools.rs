//! Tool registry for MCP tools.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use super::handlers::{ListSourcesHandler, RunSearchHandler, SearchStatusHandler, SendReportHandler};
use crate::service::DigestService;

/// An MCP tool that can be called by the client
#[derive(Clone)]
pub struct Tool {
    /// Tool name (e.g., "run_search")
    pub name: String,

    /// Human-readable description
    pub description: String,

    /// JSON Schema for input parameters
    pub input_schema: serde_json::Value,

    /// Handler function to execute the tool
    pub handler: Arc<dyn ToolHandler>,
}

impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("input_schema", &self.input_schema)
            .finish()
    }
}

/// Handler for executing a tool
#[async_trait::async_trait]
pub trait ToolHandler: Send + Sync + std::fmt::Debug {
    /// Execute the tool with the given arguments
    async fn execute(&self, args: Value) -> Result<Value, String>;
}

/// Registry for all MCP tools
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Tool>,
}

impl ToolRegistry {
    /// Registry with every digest tool bound to `service`
    pub fn from_service(service: Arc<DigestService>) -> Self {
        let mut registry = Self::default();
        let sources = service.aggregator().registry().len();

        registry.register(Tool {
            name: "run_search".to_string(),
            description: format!(
                "Run a bloodless medicine / patient blood management literature search across {} sources, \
                 merge the results into the digest and return the ranked articles",
                sources
            ),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "queries": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Queries to run. Defaults to the configured bilingual query set."
                    }
                }
            }),
            handler: Arc::new(RunSearchHandler {
                service: Arc::clone(&service),
            }),
        });

        registry.register(Tool {
            name: "search_status".to_string(),
            description: "Show the last search record, whether a new search is due, and the stored digest"
                .to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {}
            }),
            handler: Arc::new(SearchStatusHandler {
                service: Arc::clone(&service),
            }),
        });

        registry.register(Tool {
            name: "send_report".to_string(),
            description: "Email the stored digest. Without a provider key a mailto compose link is returned."
                .to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "recipients": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Recipient addresses. Defaults to the configured recipients."
                    }
                }
            }),
            handler: Arc::new(SendReportHandler {
                service: Arc::clone(&service),
            }),
        });

        registry.register(Tool {
            name: "list_sources".to_string(),
            description: "List enabled literature sources in priority order with their capabilities"
                .to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {}
            }),
            handler: Arc::new(ListSourcesHandler { service }),
        });

        registry
    }

    /// Register a tool
    pub fn register(&mut self, tool: Tool) {
        self.tools.insert(tool.name.clone(), tool);
    }

    /// Get all tools
    pub fn all(&self) -> Vec<&Tool> {
        self.tools.values().collect()
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.tools.get(name)
    }

    /// Execute a tool by name
    pub async fn execute(&self, name: &str, args: Value) -> Result<Value, String> {
        let tool = self
            .get(name)
            .ok_or_else(|| format!("Tool '{}' not found", name))?;

        tool.handler.execute(args).await
    }
}
