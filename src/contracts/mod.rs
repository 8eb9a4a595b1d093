//! Injected contracts through which the runtime talks to the outside world.

pub mod host;
pub mod llm;
pub mod storage;

pub use host::{
    Analytics, CustomToolDefinition, McpServerConfig, ProjectFileContext, TemplateRegistry,
    ToolCallOutput, ToolCallRequest, ToolHost,
};
pub use llm::{CostSink, LlmTransport, PromptRequest, ToolDefinition};
pub use storage::{FinishRun, RunStorage, StartRun, StepRecord, StepStatus};
