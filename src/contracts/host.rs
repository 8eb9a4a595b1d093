//! Tool host, analytics, template registry, and project context contracts.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{AgentTemplate, ToolOutputPart};

/// Request for the host to execute a tool outside the runtime's in-process
/// registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Id of the user input that triggered the enclosing run.
    pub user_input_id: String,
    pub tool_name: String,
    pub input: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mcp_config: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
}

/// Structured output of a host-executed tool.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ToolCallOutput {
    pub output: Vec<ToolOutputPart>,
}

/// Executes native and remote tool calls on behalf of the runtime.
#[async_trait]
pub trait ToolHost: Send + Sync {
    async fn request_tool_call(&self, request: ToolCallRequest) -> Result<ToolCallOutput>;
}

/// Fire-and-forget analytics sink.
pub trait Analytics: Send + Sync {
    fn track_event(&self, event: &str, properties: serde_json::Value);
}

/// On-demand template lookup, consulted after the caller's local map.
pub trait TemplateRegistry: Send + Sync {
    fn get_agent_template(&self, agent_id: &str) -> Option<Arc<AgentTemplate>>;
}

/// A tool declared by the project rather than the native registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool's input.
    pub input_schema: serde_json::Value,
}

/// A remote MCP tool server; tools named `server/toolname` route here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    pub name: String,
    #[serde(default)]
    pub config: serde_json::Value,
}

/// Project-level context used for prompt templating and tool dispatch. The
/// runtime never reads files itself.
#[derive(Debug, Clone, Default)]
pub struct ProjectFileContext {
    pub file_tree: Vec<String>,
    pub knowledge_files: BTreeMap<String, String>,
    pub custom_tools: Vec<CustomToolDefinition>,
    pub mcp_servers: BTreeMap<String, McpServerConfig>,
}

impl ProjectFileContext {
    pub fn custom_tool(&self, name: &str) -> Option<&CustomToolDefinition> {
        self.custom_tools.iter().find(|tool| tool.name == name)
    }

    /// Resolve the MCP server for a `server/toolname` prefixed call.
    pub fn mcp_server_for(&self, tool_name: &str) -> Option<&McpServerConfig> {
        let (server, _rest) = tool_name.split_once('/')?;
        self.mcp_servers.get(server)
    }
}
