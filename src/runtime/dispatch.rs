//! Tool dispatcher: validates a requested call against the agent's permitted
//! tool set, routes it to the in-process registry or the injected host, and
//! records the call/result pair in history.

use crate::contracts::ToolCallRequest;
use crate::error::Result;
use crate::tools::{self, registry, validate_arguments};
use crate::types::{Message, SubgoalStatus, ToolCall, ToolOutputPart};

use super::events::ResponseChunk;
use super::run_context::RunContext;
use super::{spawn, Runtime};

/// Who issued the call. Handler-originated calls bypass the template's
/// permitted-tool check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CallOrigin {
    Model,
    Handler,
}

#[derive(Debug)]
pub(crate) struct DispatchResult {
    pub(crate) call: ToolCall,
    /// Whether a `tool_call`/`tool_result` pair was recorded. Refused and
    /// schema-invalid calls record nothing; downstream consumers treat an
    /// orphan tool call as a protocol violation.
    pub(crate) recorded: bool,
    pub(crate) errored: bool,
    pub(crate) output: Vec<ToolOutputPart>,
    pub(crate) tool_message: Option<Message>,
}

impl DispatchResult {
    fn refused(call: ToolCall) -> Self {
        Self {
            call,
            recorded: false,
            errored: true,
            output: Vec::new(),
            tool_message: None,
        }
    }
}

/// Execute one parsed tool call. Calls from the same turn are dispatched
/// strictly one at a time: the caller awaits each dispatch before starting
/// the next, so a file write is visible to a file read later in the turn.
pub(crate) async fn dispatch_tool_call(
    runtime: &Runtime,
    ctx: &mut RunContext,
    call: ToolCall,
    origin: CallOrigin,
    include_in_history: bool,
) -> Result<DispatchResult> {
    let (call, rewritten) = rewrite_agent_as_tool(runtime, ctx, call);

    if !rewritten && !call_permitted(ctx, &call, origin) {
        let message = format!(
            "Tool '{}' is not available to agent '{}'",
            call.name, ctx.template.id
        );
        tracing::warn!(run_id = %ctx.run_id, tool = %call.name, "tool call refused");
        ctx.emit(ResponseChunk::Error { message });
        return Ok(DispatchResult::refused(call));
    }

    if let Some(schema) = input_schema_for(ctx, &call.name) {
        if let Err(validation_error) = validate_arguments(&call.input, &schema) {
            let message = format!("Invalid input for tool '{}': {validation_error}", call.name);
            tracing::warn!(run_id = %ctx.run_id, tool = %call.name, %validation_error, "tool input rejected");
            ctx.emit(ResponseChunk::Error { message });
            return Ok(DispatchResult::refused(call));
        }
    } else if !known_remote_tool(ctx, &call.name) {
        let message = format!("Unknown tool '{}'", call.name);
        ctx.emit(ResponseChunk::Error { message });
        return Ok(DispatchResult::refused(call));
    }

    ctx.emit(ResponseChunk::ToolCall {
        tool_call_id: call.id.clone(),
        tool_name: call.name.clone(),
        input: call.input.clone(),
    });

    let (output, errored) = if ctx.cancel.is_cancelled() {
        // Cancelled dispatch: empty output, and no forwarding to the host.
        (Vec::new(), false)
    } else if registry::is_internal_tool(&call.name) {
        execute_internal(runtime, ctx, &call).await?
    } else {
        execute_via_host(runtime, ctx, &call).await
    };

    ctx.emit(ResponseChunk::ToolResult {
        tool_call_id: call.id.clone(),
        tool_name: call.name.clone(),
        output: output.clone(),
    });

    let tool_message = Message::tool_result(call.id.clone(), call.name.clone(), output.clone());
    if include_in_history {
        ctx.state.message_history.append(tool_message.clone());
    }

    Ok(DispatchResult {
        call,
        recorded: true,
        errored,
        output,
        tool_message: Some(tool_message),
    })
}

/// A call whose name is the short id of a spawnable child template becomes
/// `spawn_agents` with that template as the single child.
fn rewrite_agent_as_tool(
    runtime: &Runtime,
    ctx: &RunContext,
    call: ToolCall,
) -> (ToolCall, bool) {
    if call.name == registry::SPAWN_AGENTS_TOOL || registry::native_tool(&call.name).is_some() {
        return (call, false);
    }
    let Some(child) = ctx.resolve_child_template(runtime, &call.name) else {
        return (call, false);
    };
    if !tools::can_spawn(&ctx.template, &child.full_id()) {
        return (call, false);
    }
    let mut entry = serde_json::Map::new();
    entry.insert(
        "agent_type".to_string(),
        serde_json::Value::String(call.name.clone()),
    );
    if let Some(prompt) = call.input.get("prompt") {
        entry.insert("prompt".to_string(), prompt.clone());
    }
    if let Some(params) = call.input.get("params") {
        entry.insert("params".to_string(), params.clone());
    }
    let rewritten = ToolCall {
        id: call.id,
        name: registry::SPAWN_AGENTS_TOOL.to_string(),
        input: serde_json::json!({ "agents": [entry] }),
    };
    (rewritten, true)
}

fn call_permitted(ctx: &RunContext, call: &ToolCall, origin: CallOrigin) -> bool {
    if origin == CallOrigin::Handler {
        return true;
    }
    if ctx.template.has_tool(&call.name) {
        return true;
    }
    // set_output is implicit whenever the template declares an output schema.
    if call.name == registry::SET_OUTPUT_TOOL && ctx.template.output_schema.is_some() {
        return true;
    }
    ctx.project.mcp_server_for(&call.name).is_some()
}

fn input_schema_for(ctx: &RunContext, tool_name: &str) -> Option<serde_json::Value> {
    if tool_name == registry::SET_OUTPUT_TOOL {
        if let Some(schema) = &ctx.template.output_schema {
            return Some(schema.clone());
        }
    }
    if let Some(spec) = registry::native_tool(tool_name) {
        return Some(spec.parameters.clone());
    }
    ctx.project
        .custom_tool(tool_name)
        .map(|tool| tool.input_schema.clone())
}

fn known_remote_tool(ctx: &RunContext, tool_name: &str) -> bool {
    ctx.project.mcp_server_for(tool_name).is_some()
}

async fn execute_internal(
    runtime: &Runtime,
    ctx: &mut RunContext,
    call: &ToolCall,
) -> Result<(Vec<ToolOutputPart>, bool)> {
    match call.name.as_str() {
        registry::END_TURN_TOOL => Ok((vec![ToolOutputPart::text("Turn ended.")], false)),
        registry::TASK_COMPLETED_TOOL => {
            Ok((vec![ToolOutputPart::text("Task marked complete.")], false))
        }
        registry::SET_OUTPUT_TOOL => {
            ctx.state.output = Some(call.input.clone());
            Ok((vec![ToolOutputPart::text("Output recorded.")], false))
        }
        registry::SPAWN_AGENTS_TOOL => spawn::execute_spawn_agents(runtime, ctx, call).await,
        registry::ADD_SUBGOAL_TOOL => Ok(add_subgoal(ctx, &call.input)),
        registry::UPDATE_SUBGOAL_TOOL => Ok(update_subgoal(ctx, &call.input)),
        registry::THINK_DEEPLY_TOOL => Ok((vec![ToolOutputPart::text("Thought recorded.")], false)),
        other => Ok((
            vec![ToolOutputPart::text(format!(
                "Internal tool '{other}' has no executor"
            ))],
            true,
        )),
    }
}

async fn execute_via_host(
    runtime: &Runtime,
    ctx: &RunContext,
    call: &ToolCall,
) -> (Vec<ToolOutputPart>, bool) {
    let request = ToolCallRequest {
        user_input_id: ctx.user_input_id.clone(),
        tool_name: call.name.clone(),
        input: call.input.clone(),
        mcp_config: ctx
            .project
            .mcp_server_for(&call.name)
            .map(|server| server.config.clone()),
        timeout: None,
    };
    match runtime.tool_host.request_tool_call(request).await {
        Ok(result) => (result.output, false),
        Err(error) => {
            tracing::warn!(run_id = %ctx.run_id, tool = %call.name, %error, "tool host call failed");
            (
                vec![ToolOutputPart::text(format!(
                    "Tool execution failed: {error}"
                ))],
                true,
            )
        }
    }
}

fn add_subgoal(ctx: &mut RunContext, input: &serde_json::Value) -> (Vec<ToolOutputPart>, bool) {
    let id = input.get("id").and_then(|v| v.as_str()).unwrap_or_default();
    let objective = input
        .get("objective")
        .and_then(|v| v.as_str())
        .unwrap_or_default();
    if ctx.state.agent_context.contains_key(id) {
        return (
            vec![ToolOutputPart::text(format!("Subgoal '{id}' already exists"))],
            true,
        );
    }
    let subgoal = crate::types::Subgoal {
        objective: objective.to_string(),
        status: SubgoalStatus::Pending,
        plan: input
            .get("plan")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        logs: Vec::new(),
    };
    ctx.state.agent_context.insert(id.to_string(), subgoal);
    (vec![ToolOutputPart::text("Subgoal added.")], false)
}

fn update_subgoal(ctx: &mut RunContext, input: &serde_json::Value) -> (Vec<ToolOutputPart>, bool) {
    let id = input.get("id").and_then(|v| v.as_str()).unwrap_or_default();
    let Some(subgoal) = ctx.state.agent_context.get_mut(id) else {
        return (
            vec![ToolOutputPart::text(format!("No subgoal with id '{id}'"))],
            true,
        );
    };
    if let Some(status) = input.get("status").and_then(|v| v.as_str()) {
        subgoal.status = match status {
            "pending" => SubgoalStatus::Pending,
            "in_progress" => SubgoalStatus::InProgress,
            "completed" => SubgoalStatus::Completed,
            "abandoned" => SubgoalStatus::Abandoned,
            other => {
                return (
                    vec![ToolOutputPart::text(format!(
                        "Unknown subgoal status '{other}'"
                    ))],
                    true,
                );
            }
        };
    }
    if let Some(plan) = input.get("plan").and_then(|v| v.as_str()) {
        subgoal.plan = Some(plan.to_string());
    }
    if let Some(log) = input.get("log").and_then(|v| v.as_str()) {
        subgoal.logs.push(log.to_string());
    }
    (vec![ToolOutputPart::text("Subgoal updated.")], false)
}
