//! Convenience re-exports for embedders.

pub use crate::config::RuntimeConfig;
pub use crate::contracts::{
    Analytics, CostSink, CustomToolDefinition, LlmTransport, McpServerConfig, ProjectFileContext,
    PromptRequest, RunStorage, StartRun, StepRecord, StepStatus, TemplateRegistry, ToolCallOutput,
    ToolCallRequest, ToolDefinition, ToolHost,
};
pub use crate::error::{CanopyError, Result};
pub use crate::history::MessageStore;
pub use crate::runtime::handler::{
    HandlerResume, HandlerSignal, HandlerYield, StepHandler, StepHandlerFactory,
};
pub use crate::runtime::{
    null_sink, ResponseChunk, ResponseSink, RunOutcome, RunParams, Runtime, STEP_WARNING_MESSAGE,
};
pub use crate::types::{
    AgentOutput, AgentState, AgentTemplate, ContentPart, InputSchema, Message, MessageContent,
    MessageTag, MessageTtl, PublicAgentState, Role, RunStatus, StreamChunk, Subgoal,
    SubgoalStatus, ToolCall, ToolOutputPart,
};
