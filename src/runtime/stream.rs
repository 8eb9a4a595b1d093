//! Stream processor: consumes the transport's chunk stream, separating
//! assistant text, tool calls (native and inline), and reasoning traces,
//! and drives the dispatcher for each extracted call.

use std::collections::HashMap;

use futures::stream::BoxStream;
use futures::StreamExt;

use crate::error::Result;
use crate::types::{ContentPart, Message, StreamChunk, ToolCall};

use super::dispatch::{dispatch_tool_call, CallOrigin};
use super::events::ResponseChunk;
use super::inline_calls::{InlineCallParser, InlineEvent};
use super::run_context::RunContext;
use super::Runtime;

/// Everything one streamed turn produced.
#[derive(Debug, Default)]
pub(crate) struct StreamOutcome {
    pub(crate) assistant_text: String,
    pub(crate) tool_calls: Vec<ToolCall>,
    pub(crate) tool_messages: Vec<Message>,
    pub(crate) had_tool_call_error: bool,
    pub(crate) message_id: Option<String>,
    /// Output of the last dispatched call; fed back to step handlers that
    /// inject text.
    pub(crate) last_tool_output: Option<Vec<crate::types::ToolOutputPart>>,
}

/// A native tool call being assembled from start/delta/end chunks.
struct PendingToolCall {
    id: String,
    name: String,
    input_buf: String,
}

/// Consume one streaming response to completion. Tool calls execute in
/// stream order, each awaited before the next; the assistant message
/// carrying a call is appended before its dispatch so history never shows a
/// result without its call.
pub(crate) async fn process_stream(
    runtime: &Runtime,
    ctx: &mut RunContext,
    mut stream: BoxStream<'static, Result<StreamChunk>>,
    include_tool_calls: bool,
) -> Result<StreamOutcome> {
    let mut outcome = StreamOutcome::default();
    let mut pending: HashMap<usize, PendingToolCall> = HashMap::new();
    let mut parser = InlineCallParser::new(ctx.inline_call_names());
    // Text accumulated since the last appended assistant message.
    let mut segment_text = String::new();

    while let Some(chunk) = stream.next().await {
        if ctx.cancel.is_cancelled() {
            break;
        }
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(error) => {
                ctx.emit(ResponseChunk::Error {
                    message: error.to_string(),
                });
                outcome.had_tool_call_error = true;
                break;
            }
        };
        match chunk {
            StreamChunk::TextDelta { text } => {
                for event in parser.push(&text) {
                    apply_inline_event(
                        runtime,
                        ctx,
                        event,
                        &mut segment_text,
                        &mut outcome,
                        include_tool_calls,
                    )
                    .await?;
                }
            }
            StreamChunk::ReasoningDelta { text } => {
                ctx.emit(ResponseChunk::ReasoningDelta { text });
            }
            StreamChunk::ToolCallStart { index, id, name } => {
                pending.insert(
                    index,
                    PendingToolCall {
                        id,
                        name,
                        input_buf: String::new(),
                    },
                );
            }
            StreamChunk::ToolCallDelta {
                index,
                input_fragment,
            } => {
                if let Some(call) = pending.get_mut(&index) {
                    call.input_buf.push_str(&input_fragment);
                }
            }
            StreamChunk::ToolCallEnd { index } => {
                if let Some(call) = pending.remove(&index) {
                    let input: serde_json::Value = serde_json::from_str(&call.input_buf)
                        .unwrap_or_else(|_| serde_json::json!({}));
                    let call = ToolCall {
                        id: call.id,
                        name: call.name,
                        input,
                    };
                    execute_extracted_call(
                        runtime,
                        ctx,
                        call,
                        &mut segment_text,
                        &mut outcome,
                        include_tool_calls,
                    )
                    .await?;
                }
            }
            StreamChunk::Error { message } => {
                ctx.emit(ResponseChunk::Error { message });
                outcome.had_tool_call_error = true;
                break;
            }
            StreamChunk::Finish { message_id } => {
                outcome.message_id = message_id;
            }
        }
    }

    for event in parser.finish() {
        apply_inline_event(
            runtime,
            ctx,
            event,
            &mut segment_text,
            &mut outcome,
            include_tool_calls,
        )
        .await?;
    }
    if !segment_text.is_empty() {
        ctx.state
            .message_history
            .append(Message::assistant(std::mem::take(&mut segment_text)));
    }

    Ok(outcome)
}

async fn apply_inline_event(
    runtime: &Runtime,
    ctx: &mut RunContext,
    event: InlineEvent,
    segment_text: &mut String,
    outcome: &mut StreamOutcome,
    include_tool_calls: bool,
) -> Result<()> {
    match event {
        InlineEvent::Text(text) => {
            outcome.assistant_text.push_str(&text);
            segment_text.push_str(&text);
            ctx.emit(ResponseChunk::Text { text });
        }
        InlineEvent::Call { name, input } => {
            let call = ToolCall {
                id: uuid::Uuid::new_v4().to_string(),
                name,
                input,
            };
            execute_extracted_call(runtime, ctx, call, segment_text, outcome, include_tool_calls)
                .await?;
        }
    }
    Ok(())
}

/// Append the assistant message carrying the call, dispatch it, and fold the
/// result into the turn outcome.
async fn execute_extracted_call(
    runtime: &Runtime,
    ctx: &mut RunContext,
    call: ToolCall,
    segment_text: &mut String,
    outcome: &mut StreamOutcome,
    include_tool_calls: bool,
) -> Result<()> {
    if include_tool_calls {
        let mut parts = Vec::new();
        if !segment_text.is_empty() {
            parts.push(ContentPart::Text {
                text: std::mem::take(segment_text),
            });
        }
        parts.push(ContentPart::ToolCall(call.clone()));
        ctx.state
            .message_history
            .append(Message::assistant_parts(parts));
    } else if !segment_text.is_empty() {
        ctx.state
            .message_history
            .append(Message::assistant(std::mem::take(segment_text)));
    }

    let result =
        dispatch_tool_call(runtime, ctx, call, CallOrigin::Model, include_tool_calls).await?;
    if result.errored || !result.recorded {
        outcome.had_tool_call_error = true;
    }
    if !result.recorded && include_tool_calls {
        ctx.state
            .message_history
            .remove_tool_call_part(&result.call.id);
    }
    if let Some(tool_message) = result.tool_message {
        outcome.tool_messages.push(tool_message);
    }
    outcome.last_tool_output = Some(result.output.clone());
    outcome.tool_calls.push(result.call);
    Ok(())
}
