//! Events emitted on the response sink.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::types::ToolOutputPart;

/// One chunk delivered to the host's response sink.
///
/// `Text` carries assistant text deltas; the tagged variants mirror the
/// runtime's observable protocol: a `ToolCall` always precedes its matching
/// `ToolResult`, and `SubagentStart` brackets every event of the child run
/// with `SubagentFinish`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseChunk {
    Text {
        text: String,
    },
    ReasoningDelta {
        text: String,
    },
    ToolCall {
        tool_call_id: String,
        tool_name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_call_id: String,
        tool_name: String,
        output: Vec<ToolOutputPart>,
    },
    SubagentStart {
        agent_id: String,
        agent_type: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        prompt: Option<String>,
    },
    SubagentFinish {
        agent_id: String,
        agent_type: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        run_id: Option<String>,
    },
    Error {
        message: String,
    },
}

/// Callback receiving every [`ResponseChunk`]; must be safe to invoke from
/// within any loop iteration.
pub type ResponseSink = Arc<dyn Fn(ResponseChunk) + Send + Sync>;

/// A sink that drops everything.
pub fn null_sink() -> ResponseSink {
    Arc::new(|_| {})
}
