//! Tool registry
//!
//! Name → implementation lookup. The registry is built once at startup and
//! shared (`Arc<ToolRegistry>`) with the executor, the tool manager and the
//! model client; nothing registers tools globally.
//!
//! Built-in tools:
//! - read_file: Read file contents
//! - list_files: List directory contents
//! - git_diff: Show uncommitted changes

use crate::tools::implementations::{GitDiffTool, ListFilesTool, ReadFileTool};
use crate::tools::types::{Tool, ToolSchema};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Tool registry
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with every built-in tool
    pub fn with_builtin_tools() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ReadFileTool));
        registry.register(Arc::new(ListFilesTool));
        registry.register(Arc::new(GitDiffTool));
        registry
    }

    /// Register a tool, returning the one it replaced
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Option<Arc<dyn Tool>> {
        self.tools.insert(tool.name().to_string(), tool)
    }

    /// Look up a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Tool's self-reported description
    pub fn description(&self, name: &str) -> Option<String> {
        self.tools.get(name).map(|t| t.description().to_string())
    }

    /// All tool names, sorted
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// All tool schemas, sorted by name
    pub fn schemas(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self.tools.values().map(|t| t.schema()).collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tool_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Result;
    use crate::tools::types::ToolContext;
    use async_trait::async_trait;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "read_file"
        }

        fn description(&self) -> &str {
            "Echo replacement"
        }

        fn parameters(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }

        async fn execute(&self, args: serde_json::Value, _ctx: &ToolContext) -> Result<String> {
            Ok(args.to_string())
        }
    }

    #[test]
    fn test_builtin_tools_registered() {
        let registry = ToolRegistry::with_builtin_tools();

        assert_eq!(registry.len(), 3);
        assert_eq!(registry.tool_names(), ["git_diff", "list_files", "read_file"]);
    }

    #[test]
    fn test_empty_registry() {
        let registry = ToolRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.get("read_file").is_none());
    }

    #[test]
    fn test_lookup_and_description() {
        let registry = ToolRegistry::with_builtin_tools();

        assert!(registry.contains("read_file"));
        assert!(!registry.contains("write_file"));
        assert!(registry.description("list_files").is_some());
        assert!(registry.description("nonexistent_tool").is_none());
    }

    #[test]
    fn test_register_replaces_existing() {
        let mut registry = ToolRegistry::with_builtin_tools();
        let previous = registry.register(Arc::new(EchoTool));

        assert!(previous.is_some());
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.description("read_file").unwrap(), "Echo replacement");
    }

    #[test]
    fn test_schemas_sorted_and_described() {
        let registry = ToolRegistry::with_builtin_tools();
        let schemas = registry.schemas();

        assert_eq!(schemas.len(), 3);
        assert_eq!(schemas[0].name, "git_diff");
        for schema in schemas {
            assert!(!schema.description.is_empty());
            assert_eq!(schema.parameters["type"], "object");
        }
    }
}
