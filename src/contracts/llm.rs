//! LLM transport contract.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{Message, StreamChunk};

/// Serializable view of one tool handed to the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool's input.
    pub parameters: serde_json::Value,
}

/// Callback invoked with the credit cost of each LLM or tool operation.
pub type CostSink = Arc<dyn Fn(f64) + Send + Sync>;

/// A fully assembled model request.
#[derive(Clone)]
pub struct PromptRequest {
    pub messages: Vec<Message>,
    pub system: String,
    pub model: String,
    pub tools: Vec<ToolDefinition>,
    pub on_cost: Option<CostSink>,
}

impl std::fmt::Debug for PromptRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptRequest")
            .field("messages", &self.messages.len())
            .field("model", &self.model)
            .field("tools", &self.tools.len())
            .finish()
    }
}

/// The streaming LLM transport supplied by the host.
///
/// `prompt` is the single-shot path used for N-way alternative completions:
/// for `n > 1` the returned string must be a JSON array of `n` strings.
#[async_trait]
pub trait LlmTransport: Send + Sync {
    async fn prompt_stream(
        &self,
        request: PromptRequest,
    ) -> Result<BoxStream<'static, Result<StreamChunk>>>;

    async fn prompt(&self, request: PromptRequest, n: usize) -> Result<String>;

    /// Provider-side token count for the given prompt. Errors make the
    /// runtime fall back to its local estimate.
    async fn count_tokens(&self, messages: &[Message], system: &str) -> Result<usize>;
}
