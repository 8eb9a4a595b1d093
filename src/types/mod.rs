//! Public type surface: messages, templates, state, and stream chunks.

pub mod message;
pub mod state;
pub mod stream;
pub mod template;

pub use message::{
    ContentPart, Message, MessageContent, MessageTag, MessageTtl, Role, ToolCall, ToolOutputPart,
};
pub use state::{
    AgentOutput, AgentState, PublicAgentState, Run, RunStatus, Subgoal, SubgoalStatus,
};
pub use stream::StreamChunk;
pub use template::{AgentTemplate, InputSchema};
