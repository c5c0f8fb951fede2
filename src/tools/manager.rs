//! Function-tool manager: the catalog the LLM-request stage consults.
//!
//! Merges locally-implemented tools ([`ToolProvider`]) with tools
//! registered by the remote-server controller, and is the single place the
//! tool-call round trip (`§4.4.3`) routes an invocation by origin.

use super::remote::{unqualify, RemoteToolController};
use super::ToolProvider;
use crate::error::ToolError;
use crate::llm::{Tool, ToolCall};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

#[derive(Clone)]
enum ToolOrigin {
    Local(Arc<dyn ToolProvider>),
    Remote { server_name: String },
}

pub struct FunctionToolManager {
    local: RwLock<HashMap<String, Arc<dyn ToolProvider>>>,
    remote: Option<RemoteToolController>,
    /// Names of plugins/tools the preference store has deactivated; checked
    /// by `is_active`.
    deactivated: RwLock<std::collections::HashSet<String>>,
}

impl FunctionToolManager {
    pub fn new() -> Self {
        Self { local: RwLock::new(HashMap::new()), remote: None, deactivated: RwLock::new(Default::default()) }
    }

    pub fn with_remote(mut self, controller: RemoteToolController) -> Self {
        self.remote = Some(controller);
        self
    }

    pub fn register_all_builtin(self) -> Self {
        for tool in super::all_tools() {
            self.local.write().unwrap().insert(tool.name().to_string(), tool);
        }
        self
    }

    pub fn register(&self, tool: Arc<dyn ToolProvider>) {
        self.local.write().unwrap().insert(tool.name().to_string(), tool);
    }

    pub fn deactivate(&self, name: impl Into<String>) {
        self.deactivated.write().unwrap().insert(name.into());
    }

    pub fn activate(&self, name: &str) {
        self.deactivated.write().unwrap().remove(name);
    }

    pub fn is_active(&self, name: &str) -> bool {
        !self.deactivated.read().unwrap().contains(name)
    }

    /// Render the catalog in the vendor-agnostic [`Tool`] shape, skipping
    /// inactive tools. Vendor-specific rendering happens in
    /// [`crate::llm::formatters`].
    pub async fn catalog(&self) -> Vec<Tool> {
        let mut tools: Vec<Tool> = self
            .local
            .read()
            .unwrap()
            .values()
            .filter(|t| self.is_active(t.name()))
            .map(|t| Tool { name: t.name().to_string(), description: t.full_description(), parameters: t.parameters() })
            .collect();

        if let Some(remote) = &self.remote {
            for (server, tool) in remote.list_registered().await {
                let qualified = format!("mcp:{server}:{}", tool.name);
                if self.is_active(&qualified) {
                    tools.push(Tool { name: qualified, ..tool });
                }
            }
        }
        tools
    }

    fn origin_of(&self, name: &str) -> Option<ToolOrigin> {
        if let Some(tool) = self.local.read().unwrap().get(name) {
            return Some(ToolOrigin::Local(tool.clone()));
        }
        if name.starts_with("mcp:") {
            let server_name = name.splitn(3, ':').nth(1)?.to_string();
            return Some(ToolOrigin::Remote { server_name });
        }
        None
    }

    /// Execute one tool call. `None` means the tool is unknown or
    /// deactivated — callers distinguish that from a successful-but-erroring
    /// execution. Deactivation stands in for "belongs to a plugin disabled
    /// for this platform" (§4.4.3): the round trip treats it identically to
    /// an unregistered tool, silently skipping the entry.
    pub async fn execute(&self, call: &ToolCall) -> Option<Result<String, ToolError>> {
        if !self.is_active(&call.name) {
            return None;
        }
        let origin = self.origin_of(&call.name)?;
        match origin {
            ToolOrigin::Local(tool) => Some(tool.execute(call).await.map_err(ToolError::Execution)),
            ToolOrigin::Remote { server_name } => {
                let remote = self.remote.as_ref()?;
                let remote_name = unqualify(&call.name).to_string();
                let remote_call = ToolCall { id: call.id.clone(), name: remote_name, arguments: call.arguments.clone() };
                Some(remote.call_tool(&server_name, &remote_call).await)
            }
        }
    }
}

impl Default for FunctionToolManager {
    fn default() -> Self {
        Self::new()
    }
}
