//! Step executor: one LLM turn.

use crate::contracts::PromptRequest;
use crate::error::Result;
use crate::tools::registry::{self, END_TURN_TOOL, TASK_COMPLETED_TOOL};
use crate::types::{Message, MessageTag, MessageTtl};

use super::events::ResponseChunk;
use super::run_context::RunContext;
use super::stream::process_stream;
use super::Runtime;

/// Appended (system-tagged) when the step budget runs out.
pub const STEP_WARNING_MESSAGE: &str =
    "Maximum steps reached for this request. The turn was ended automatically.";

/// Result of one turn.
#[derive(Debug, Default)]
pub(crate) struct StepOutcome {
    pub(crate) end_turn: bool,
    /// Alternative completions when the caller asked for `n` of them.
    pub(crate) n_responses: Option<Vec<String>>,
    pub(crate) message_id: Option<String>,
    pub(crate) had_error: bool,
}

/// Run a single turn: assemble the prompt, stream the response (or take the
/// single-shot N-completions path), and decide whether the turn ends.
pub(crate) async fn run_step(
    runtime: &Runtime,
    ctx: &mut RunContext,
    prompt_this_turn: Option<&str>,
    generate_n: Option<usize>,
) -> Result<StepOutcome> {
    if ctx.state.steps_remaining == 0 {
        ctx.state.message_history.expire(MessageTtl::UserPrompt);
        ctx.state
            .message_history
            .append(Message::system_tagged_user(STEP_WARNING_MESSAGE));
        ctx.emit(ResponseChunk::Text {
            text: STEP_WARNING_MESSAGE.to_string(),
        });
        tracing::debug!(run_id = %ctx.run_id, "step budget exhausted, turn force-terminated");
        return Ok(StepOutcome {
            end_turn: true,
            ..StepOutcome::default()
        });
    }

    ctx.state.message_history.append(
        Message::user(build_step_prompt(ctx))
            .with_tag(MessageTag::StepPrompt)
            .with_ttl(MessageTtl::AgentStep)
            .kept(),
    );

    let request = PromptRequest {
        messages: ctx.state.message_history.messages().to_vec(),
        system: ctx.system_prompt.clone(),
        model: ctx.template.model.clone(),
        tools: ctx.tools().to_vec(),
        on_cost: Some(ctx.ledger.direct_sink()),
    };

    let outcome = if let Some(n) = generate_n.filter(|n| *n >= 1) {
        let raw = runtime.transport.prompt(request, n).await?;
        let responses = match serde_json::from_str::<Vec<String>>(&raw) {
            Ok(responses) => responses,
            Err(_) if n == 1 => vec![raw],
            Err(error) => {
                tracing::warn!(run_id = %ctx.run_id, n, %error, "expected JSON array of completions");
                vec![raw]
            }
        };
        ctx.state.message_history.expire(MessageTtl::AgentStep);
        StepOutcome {
            end_turn: false,
            n_responses: Some(responses),
            ..StepOutcome::default()
        }
    } else {
        let stream = runtime.transport.prompt_stream(request).await?;
        let streamed = process_stream(runtime, ctx, stream, true).await?;

        ctx.state.message_history.expire(MessageTtl::AgentStep);

        if is_compact_command(prompt_this_turn) {
            let summary = streamed.assistant_text.clone();
            ctx.state
                .message_history
                .replace_all(vec![Message::system_tagged_user(summary).kept()]);
        }

        // Both the calls and their results count toward the no-work check.
        let mut call_names: Vec<&str> = streamed
            .tool_calls
            .iter()
            .map(|call| call.name.as_str())
            .collect();
        call_names.extend(
            streamed
                .tool_messages
                .iter()
                .filter_map(|message| message.tool_name.as_deref()),
        );
        let has_no_work = !streamed.had_tool_call_error
            && call_names
                .iter()
                .all(|name| registry::wont_force_next_step(name));
        let has_explicit_end = call_names
            .iter()
            .any(|name| *name == TASK_COMPLETED_TOOL || *name == END_TURN_TOOL);
        let end_turn = if ctx.template.has_tool(TASK_COMPLETED_TOOL) {
            has_explicit_end
        } else {
            has_explicit_end || has_no_work
        };

        StepOutcome {
            end_turn,
            n_responses: None,
            message_id: streamed.message_id,
            had_error: streamed.had_tool_call_error,
        }
    };

    ctx.state.steps_remaining -= 1;
    Ok(outcome)
}

fn build_step_prompt(ctx: &RunContext) -> String {
    if let Some(template_prompt) = &ctx.template.step_prompt {
        return template_prompt.replace(
            "{steps_remaining}",
            &ctx.state.steps_remaining.to_string(),
        );
    }
    let mut prompt = format!(
        "You have {} steps remaining for this request. Continue working toward \
         the goal, or finish the turn when there is nothing left to do.",
        ctx.state.steps_remaining
    );
    if !ctx.project.file_tree.is_empty() {
        prompt.push_str(&format!(
            " The project contains {} files.",
            ctx.project.file_tree.len()
        ));
    }
    prompt
}

/// The conversation compaction command: the whole history is replaced by the
/// assistant's summary.
fn is_compact_command(prompt: Option<&str>) -> bool {
    let Some(prompt) = prompt else { return false };
    let normalized = prompt.trim().to_ascii_lowercase();
    normalized == "compact" || normalized == "/compact"
}
