//! The tool trait and registry.
//!
//! Tools are what give the agent the ability to act in the world. The
//! registry executes them on the agent loop's behalf and folds every failure
//! mode (unknown name, returned error, panic) into an error result so a
//! misbehaving tool can never abort a run.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ToolError;
use crate::provider::ToolDefinition;

/// The outcome of a tool execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "text", rename_all = "snake_case")]
pub enum ToolResult {
    Success(String),
    Error(String),
}

impl ToolResult {
    pub fn success(text: impl Into<String>) -> Self {
        Self::Success(text.into())
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(message.into())
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// The text that goes into the conversation as the tool message.
    pub fn render(&self) -> String {
        match self {
            Self::Success(text) => text.clone(),
            Self::Error(message) => format!("[Error] {message}"),
        }
    }
}

/// The core Tool trait.
///
/// Tools are registered in the [`ToolRegistry`] and made available to agents
/// that list them by name.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool.
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the raw JSON argument text the model produced.
    async fn execute(&self, arguments: &str) -> std::result::Result<ToolResult, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the LLM.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// A registry of available tools.
///
/// Cloning is cheap: tools are shared behind `Arc`.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    pub fn unregister(&mut self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Definitions for the named tools, in the order given. Names with no
    /// registered tool are skipped. An empty list selects every registered
    /// tool, sorted by name.
    pub fn definitions(&self, names: &[String]) -> Vec<ToolDefinition> {
        if names.is_empty() {
            return self
                .names()
                .into_iter()
                .filter_map(|name| self.tools.get(name))
                .map(|tool| tool.to_definition())
                .collect();
        }
        names
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| tool.to_definition())
            .collect()
    }

    /// Execute a tool by name. Never fails: every failure becomes
    /// [`ToolResult::Error`].
    pub async fn execute(&self, name: &str, arguments: &str) -> ToolResult {
        let Some(tool) = self.tools.get(name) else {
            warn!(tool = %name, "Tool not found");
            return ToolResult::error(format!("Tool not found: {name}"));
        };

        match AssertUnwindSafe(tool.execute(arguments)).catch_unwind().await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                warn!(tool = %name, error = %e, "Tool returned an error");
                ToolResult::error(format!("Tool execution failed: {e}"))
            }
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                warn!(tool = %name, reason = %reason, "Tool panicked");
                ToolResult::error(format!("Tool execution failed: {reason}"))
            }
        }
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes back the input"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string" }
                },
                "required": ["text"]
            })
        }
        async fn execute(&self, arguments: &str) -> std::result::Result<ToolResult, ToolError> {
            let args: serde_json::Value = serde_json::from_str(arguments)
                .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
            Ok(ToolResult::success(args["text"].as_str().unwrap_or("")))
        }
    }

    struct PanickingTool;

    #[async_trait]
    impl Tool for PanickingTool {
        fn name(&self) -> &str {
            "boom"
        }
        fn description(&self) -> &str {
            "Always panics"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({ "type": "object" })
        }
        async fn execute(&self, _arguments: &str) -> std::result::Result<ToolResult, ToolError> {
            panic!("kaboom");
        }
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        registry.register(Arc::new(PanickingTool));
        registry
    }

    #[test]
    fn render_prefixes_only_errors() {
        assert_eq!(ToolResult::success("ok").render(), "ok");
        assert_eq!(ToolResult::error("bad").render(), "[Error] bad");
        assert!(ToolResult::error("bad").is_error());
    }

    #[test]
    fn registry_register_and_lookup() {
        let mut registry = registry();
        assert!(registry.contains("echo"));
        assert!(registry.get("nonexistent").is_none());
        assert_eq!(registry.names(), vec!["boom", "echo"]);

        assert!(registry.unregister("boom").is_some());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn definitions_follow_requested_order() {
        let registry = registry();
        let defs = registry.definitions(&["echo".into(), "missing".into(), "boom".into()]);
        let names: Vec<_> = defs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["echo", "boom"]);
    }

    #[test]
    fn empty_selection_means_every_tool() {
        let registry = registry();
        let defs = registry.definitions(&[]);
        let names: Vec<_> = defs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["boom", "echo"]);
        assert!(ToolRegistry::new().definitions(&[]).is_empty());
    }

    #[tokio::test]
    async fn execute_success() {
        let result = registry().execute("echo", r#"{"text":"hello world"}"#).await;
        assert_eq!(result, ToolResult::success("hello world"));
    }

    #[tokio::test]
    async fn execute_missing_tool() {
        let result = registry().execute("nonexistent", "{}").await;
        assert!(result.is_error());
        assert_eq!(result.render(), "[Error] Tool not found: nonexistent");
    }

    #[tokio::test]
    async fn tool_error_becomes_error_result() {
        let result = registry().execute("echo", "not json").await;
        assert!(result.is_error());
        assert!(result.render().starts_with("[Error] Tool execution failed:"));
    }

    #[tokio::test]
    async fn tool_panic_is_isolated() {
        let result = registry().execute("boom", "{}").await;
        assert!(result.is_error());
        assert!(result.render().contains("kaboom"));
    }
}
