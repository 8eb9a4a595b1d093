//! Chunk types produced by the LLM transport's streaming response.

use serde::{Deserialize, Serialize};

/// One chunk of a streaming model response.
///
/// Native tool calls arrive as a start/delta/end triple keyed by `index`;
/// the stream processor assembles them before dispatch. `Finish` carries the
/// provider's stable message id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamChunk {
    TextDelta {
        text: String,
    },
    ReasoningDelta {
        text: String,
    },
    ToolCallStart {
        index: usize,
        id: String,
        name: String,
    },
    ToolCallDelta {
        index: usize,
        input_fragment: String,
    },
    ToolCallEnd {
        index: usize,
    },
    Error {
        message: String,
    },
    Finish {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },
}
