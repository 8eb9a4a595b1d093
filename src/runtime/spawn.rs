//! Subagent spawning.

use serde::Deserialize;

use crate::error::{CanopyError, Result};
use crate::history::MessageStore;
use crate::tools::{self, validate_arguments};
use crate::types::{AgentState, Message, MessageTag, ToolCall, ToolOutputPart};

use super::events::ResponseChunk;
use super::run_context::RunContext;
use super::{RunParams, Runtime};

#[derive(Debug, Clone, Deserialize)]
struct SpawnEntry {
    agent_type: String,
    #[serde(default)]
    prompt: Option<String>,
    #[serde(default)]
    params: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
struct SpawnAgentsInput {
    agents: Vec<SpawnEntry>,
}

/// Spawn each requested child in order, awaiting one before the next.
/// Per-child validation failures become error output parts and the parent
/// continues; only fatal errors (payment required, storage) propagate.
pub(crate) async fn execute_spawn_agents(
    runtime: &Runtime,
    ctx: &mut RunContext,
    call: &ToolCall,
) -> Result<(Vec<ToolOutputPart>, bool)> {
    let input: SpawnAgentsInput = match serde_json::from_value(call.input.clone()) {
        Ok(input) => input,
        Err(error) => {
            return Ok((
                vec![ToolOutputPart::text(format!(
                    "Invalid spawn_agents input: {error}"
                ))],
                true,
            ));
        }
    };

    let mut output = Vec::with_capacity(input.agents.len());
    let mut errored = false;

    for entry in input.agents {
        match spawn_one(runtime, ctx, &entry).await {
            Ok(part) => output.push(part),
            Err(SpawnRefusal::Fatal(error)) => return Err(error),
            Err(SpawnRefusal::Refused(message)) => {
                tracing::warn!(
                    run_id = %ctx.run_id,
                    child = %entry.agent_type,
                    %message,
                    "subagent spawn refused"
                );
                ctx.emit(ResponseChunk::Error {
                    message: message.clone(),
                });
                output.push(ToolOutputPart::text(message));
                errored = true;
            }
        }
    }

    Ok((output, errored))
}

enum SpawnRefusal {
    /// Per-child failure; the parent keeps going.
    Refused(String),
    /// Must abort the parent run (402, storage failures).
    Fatal(CanopyError),
}

async fn spawn_one(
    runtime: &Runtime,
    ctx: &mut RunContext,
    entry: &SpawnEntry,
) -> std::result::Result<ToolOutputPart, SpawnRefusal> {
    let child_template = ctx
        .resolve_child_template(runtime, &entry.agent_type)
        .ok_or_else(|| {
            SpawnRefusal::Refused(format!("Unknown agent template '{}'", entry.agent_type))
        })?;

    if !tools::can_spawn(&ctx.template, &child_template.full_id()) {
        return Err(SpawnRefusal::Refused(format!(
            "Agent '{}' is not permitted to spawn '{}'",
            ctx.template.id,
            child_template.full_id()
        )));
    }

    let depth = ctx.depth + 1;
    if depth > runtime.config.max_agent_depth {
        return Err(SpawnRefusal::Refused(format!(
            "Agent depth limit reached spawning '{}'",
            entry.agent_type
        )));
    }

    if let Some(schema) = &child_template.input_schema {
        if let Some(prompt_schema) = &schema.prompt {
            let prompt_value = entry
                .prompt
                .clone()
                .map(serde_json::Value::String)
                .unwrap_or(serde_json::Value::Null);
            validate_arguments(&prompt_value, prompt_schema).map_err(|error| {
                SpawnRefusal::Refused(format!(
                    "Invalid prompt for '{}': {error}",
                    entry.agent_type
                ))
            })?;
        }
        if let Some(params_schema) = &schema.params {
            let params_value = entry.params.clone().unwrap_or(serde_json::Value::Null);
            validate_arguments(&params_value, params_schema).map_err(|error| {
                SpawnRefusal::Refused(format!(
                    "Invalid params for '{}': {error}",
                    entry.agent_type
                ))
            })?;
        }
    }

    let mut child_state = AgentState::new(&entry.agent_type, runtime.config.max_agent_steps);
    child_state.parent_id = Some(ctx.state.agent_id.clone());
    child_state.ancestor_run_ids = ctx
        .state
        .ancestor_run_ids
        .iter()
        .cloned()
        .chain(std::iter::once(ctx.run_id.clone()))
        .collect();
    child_state.context_token_count = ctx.state.context_token_count;
    if child_template.include_message_history {
        let mut history = ctx.state.message_history.filter_unfinished_tool_calls();
        history.push(
            Message::system_tagged_user(format!(
                "Spawned '{}' agent from '{}'",
                entry.agent_type, ctx.template.id
            ))
            .with_tag(MessageTag::SubagentSpawn),
        );
        child_state.message_history = MessageStore::from_messages(history);
    }
    let child_agent_id = child_state.agent_id.clone();

    ctx.emit(ResponseChunk::SubagentStart {
        agent_id: child_agent_id.clone(),
        agent_type: entry.agent_type.clone(),
        prompt: entry.prompt.clone(),
    });

    let params = RunParams {
        agent_type: entry.agent_type.clone(),
        template: Some(child_template),
        prompt: entry.prompt.clone(),
        params: entry.params.clone(),
        content: None,
        agent_state: Some(child_state),
        local_agent_templates: ctx.local_templates.as_ref().clone(),
        project: ctx.project.clone(),
        sink: Some(ctx.sink.clone()),
        on_cost: Some(ctx.ledger.child_sink()),
        cancel: ctx.cancel.clone(),
        parent_system_prompt: Some(ctx.system_prompt.clone()),
        parent_tools: Some(ctx.tools().to_vec()),
        user_input_id: ctx.user_input_id.clone(),
        clear_user_prompt_messages_after_response: None,
        depth,
    };

    let outcome = runtime
        .run_agent_inner(params)
        .await
        .map_err(SpawnRefusal::Fatal)?;

    let child_run_id = outcome.state.run_id.clone();
    ctx.emit(ResponseChunk::SubagentFinish {
        agent_id: child_agent_id,
        agent_type: entry.agent_type.clone(),
        run_id: child_run_id.clone(),
    });
    if let Some(run_id) = &child_run_id {
        ctx.state.child_run_ids.push(run_id.clone());
    }

    Ok(ToolOutputPart::json(serde_json::json!({
        "agent_type": entry.agent_type,
        "run_id": child_run_id,
        "output": outcome.output,
    })))
}
