use std::collections::HashMap;
use std::sync::Arc;

use driftbot_core::{Config, Error, Result};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::browser::BrowseTool;
use crate::web::{WebFetchTool, WebSearchTool};
use crate::{Tool, ToolContext};

#[derive(Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::new();

        registry.register(Arc::new(WebSearchTool));
        registry.register(Arc::new(WebFetchTool));
        registry.register(Arc::new(BrowseTool));

        registry
    }

    /// Build the registry for a given config. When the browser is disabled
    /// the browse tool is left out entirely so the model never sees it.
    pub fn for_config(config: &Config) -> Self {
        let mut registry = Self::new();

        registry.register(Arc::new(WebSearchTool));
        registry.register(Arc::new(WebFetchTool));
        if config.browser.enabled {
            registry.register(Arc::new(BrowseTool));
        }

        registry
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let schema = tool.schema();
        debug!(name = schema.name, "Registering tool");
        self.tools.insert(schema.name.to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    pub fn get_tool_schemas(&self) -> Vec<Value> {
        self.tools
            .values()
            .map(|tool| {
                let schema = tool.schema();
                json!({
                    "type": "function",
                    "function": {
                        "name": schema.name,
                        "description": schema.description,
                        "parameters": schema.parameters
                    }
                })
            })
            .collect()
    }

    pub async fn execute(&self, name: &str, ctx: ToolContext, params: Value) -> Result<Value> {
        let tool = self
            .get(name)
            .ok_or_else(|| Error::Tool(format!("Unknown tool: {}", name)))?;

        if let Err(e) = tool.validate(&params) {
            warn!(tool = name, error = %e, "Tool validation failed");
            return Err(e);
        }

        debug!(tool = name, "Executing tool");
        tool.execute(ctx, params).await
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_get_tool_schemas() {
        let reg = ToolRegistry::with_defaults();
        let schemas = reg.get_tool_schemas();
        assert_eq!(schemas.len(), 3);
        for schema in &schemas {
            assert_eq!(schema["type"], "function");
            assert!(schema["function"]["name"].is_string());
            assert!(schema["function"]["description"].is_string());
        }
    }

    #[test]
    fn test_for_config_respects_browser_toggle() {
        let mut config = Config::default();
        config.browser.enabled = false;
        let reg = ToolRegistry::for_config(&config);
        assert!(reg.get("browse").is_none());
        assert!(reg.get("web_search").is_some());
        assert!(reg.get("web_fetch").is_some());

        config.browser.enabled = true;
        let reg = ToolRegistry::for_config(&config);
        assert!(reg.get("browse").is_some());
    }

    #[tokio::test]
    async fn test_execute_unknown_tool_is_error() {
        let reg = ToolRegistry::with_defaults();
        let ctx = ToolContext {
            workspace: std::env::temp_dir(),
            config: Config::default(),
        };
        let result = reg.execute("nonexistent", ctx, json!({})).await;
        assert!(matches!(result, Err(Error::Tool(_))));
    }
}
