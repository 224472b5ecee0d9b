//! Agent tool registration and per-run policy filtering.
//!
//! Subagent sessions get a filtered copy of the registry (§4.10): the four
//! session-management tools are always denied to them, so a subagent can
//! never spawn further subagents or read/send in another session.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;

/// Tools a subagent run is never allowed to call, regardless of what the
/// parent registered.
pub const SUBAGENT_DENIED_TOOLS: &[&str] = &[
    "sessions_list",
    "sessions_history",
    "sessions_send",
    "sessions_spawn",
];

#[async_trait]
pub trait AgentTool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters_schema(&self) -> serde_json::Value;
    async fn execute(&self, params: serde_json::Value) -> Result<serde_json::Value, String>;
}

/// Registry of tools available to an agent run.
///
/// Tools are stored as `Arc<dyn AgentTool>` so the registry can be cheaply
/// cloned when a subagent needs a filtered copy of its parent's tools.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn AgentTool>>,
}

impl ToolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn AgentTool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn unregister(&mut self, name: &str) -> bool {
        self.tools.remove(name).is_some()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn AgentTool>> {
        self.tools.get(name).cloned()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    #[must_use]
    pub fn list_schemas(&self) -> Vec<serde_json::Value> {
        self.tools
            .values()
            .map(|t| {
                serde_json::json!({
                    "name": t.name(),
                    "description": t.description(),
                    "parameters": t.parameters_schema(),
                })
            })
            .collect()
    }

    /// Clone the registry excluding tools in `deny`. Used to build the
    /// reduced registry a subagent run executes against.
    #[must_use]
    pub fn clone_without(&self, deny: &[&str]) -> ToolRegistry {
        let tools = self
            .tools
            .iter()
            .filter(|(name, _)| !deny.contains(&name.as_str()))
            .map(|(name, tool)| (name.clone(), Arc::clone(tool)))
            .collect();
        ToolRegistry { tools }
    }

    /// Clone the registry, applying the subagent denial policy.
    #[must_use]
    pub fn clone_for_subagent(&self) -> ToolRegistry {
        self.clone_without(SUBAGENT_DENIED_TOOLS)
    }
}
