//! The agent loop: drives steps until termination, interleaving the
//! programmatic step handler with LLM turns and finalizing the run record.

use std::sync::Arc;

use chrono::Utc;
use futures::future::BoxFuture;

use crate::contracts::{FinishRun, ProjectFileContext, StartRun, StepRecord, StepStatus};
use crate::error::{CanopyError, Result};
use crate::history::{
    estimate_history_tokens, estimate_text_tokens, estimate_tool_definition_tokens,
};
use crate::types::{
    AgentOutput, AgentState, AgentTemplate, ContentPart, Message, MessageTag, MessageTtl,
    RunStatus, ToolCall,
};

use super::credits::CreditLedger;
use super::dispatch::{dispatch_tool_call, CallOrigin};
use super::events::null_sink;
use super::handler::{HandlerResume, HandlerSignal, HandlerYield};
use super::run_context::RunContext;
use super::stream::process_stream;
use super::{step, RunOutcome, RunParams, Runtime};

const CANCELLED_MESSAGE: &str = "Run cancelled by user";

const OUTPUT_SCHEMA_RETRY_MESSAGE: &str =
    "Before finishing, call set_output with a value matching the required output schema.";

/// How the main loop ended when no fatal error occurred.
struct LoopEnd {
    cancelled: bool,
    error_output: Option<AgentOutput>,
}

/// What a programmatic turn asks the loop to do.
enum Programmatic {
    RunStep { generate_n: Option<usize> },
    EndTurn,
    Failed(String),
}

impl Runtime {
    /// Recursive entry point; boxed because children spawn through it.
    pub(crate) fn run_agent_inner(&self, params: RunParams) -> BoxFuture<'_, Result<RunOutcome>> {
        Box::pin(async move {
            let template = self.resolve_template(&params)?;

            if params.cancel.is_cancelled() {
                let state = params.agent_state.unwrap_or_else(|| {
                    AgentState::new(&params.agent_type, self.config.max_agent_steps)
                });
                return Ok(RunOutcome {
                    state,
                    output: AgentOutput::error(CANCELLED_MESSAGE),
                });
            }

            let mut state = params.agent_state.unwrap_or_else(|| {
                AgentState::new(&params.agent_type, self.config.max_agent_steps)
            });

            // Starting the run is the one storage call that raises.
            let run_id = self
                .storage
                .start_run(StartRun {
                    agent_id: state.agent_id.clone(),
                    agent_type: state.agent_type.clone(),
                    parent_run_id: state.ancestor_run_ids.last().cloned(),
                    ancestor_run_ids: state.ancestor_run_ids.clone(),
                })
                .await?;
            state.run_id = Some(run_id.clone());

            let system_prompt = if template.inherit_parent_system_prompt {
                params
                    .parent_system_prompt
                    .clone()
                    .unwrap_or_else(|| assemble_system_prompt(&template, &params.project))
            } else {
                assemble_system_prompt(&template, &params.project)
            };

            let mut ctx = RunContext::new(
                template.clone(),
                run_id.clone(),
                system_prompt,
                state,
                params.sink.clone().unwrap_or_else(null_sink),
                params.cancel.clone(),
                params.project.clone(),
                Arc::new(params.local_agent_templates.clone()),
                params.depth,
                params.user_input_id.clone(),
                CreditLedger::new(params.on_cost.clone()),
                params.parent_tools.clone(),
            );

            if params.prompt.is_some() || params.params.is_some() || params.content.is_some() {
                ctx.state.message_history.append(build_user_prompt_message(
                    params.prompt.as_deref(),
                    params.params.as_ref(),
                    params.content.clone(),
                ));
            }
            if let Some(instructions) = &template.instructions_prompt {
                ctx.state.message_history.append(
                    Message::user(instructions.clone()).with_tag(MessageTag::InstructionsPrompt),
                );
            }

            self.track(
                "agent_run_started",
                serde_json::json!({
                    "run_id": run_id,
                    "agent_type": ctx.state.agent_type,
                    "depth": ctx.depth,
                }),
            );
            tracing::debug!(
                run_id = %run_id,
                agent_type = %ctx.state.agent_type,
                depth = ctx.depth,
                "agent run started"
            );

            let loop_result = self
                .drive_loop(&mut ctx, params.prompt.clone(), params.params.clone())
                .await;

            let clear_user_prompt = params
                .clear_user_prompt_messages_after_response
                .unwrap_or(self.config.clear_user_prompt_messages_after_response);

            match loop_result {
                Ok(end) => self.finalize_run(ctx, end, clear_user_prompt).await,
                Err(error) => self.finalize_failed_run(ctx, error).await,
            }
        })
    }

    async fn finalize_run(
        &self,
        mut ctx: RunContext,
        end: LoopEnd,
        clear_user_prompt: bool,
    ) -> Result<RunOutcome> {
        if clear_user_prompt {
            ctx.state.message_history.expire(MessageTtl::UserPrompt);
        }
        let cancelled = end.cancelled || ctx.cancel.is_cancelled();
        let status = if cancelled {
            RunStatus::Cancelled
        } else {
            RunStatus::Completed
        };
        ctx.state.credits_used = ctx.ledger.total();
        ctx.state.direct_credits_used = ctx.ledger.direct();

        let error_message = match &end.error_output {
            Some(AgentOutput::Error { message, .. }) => Some(message.clone()),
            _ => None,
        };
        if let Err(error) = self
            .storage
            .finish_run(FinishRun {
                run_id: ctx.run_id.clone(),
                status,
                total_steps: ctx.total_steps,
                direct_credits: ctx.ledger.direct(),
                total_credits: ctx.ledger.total(),
                error_message,
            })
            .await
        {
            tracing::error!(run_id = %ctx.run_id, %error, "failed to finalize run record");
        }
        self.handlers.remove(&ctx.run_id);
        self.track(
            "agent_run_finished",
            serde_json::json!({
                "run_id": ctx.run_id,
                "status": status,
                "total_steps": ctx.total_steps,
                "total_credits": ctx.ledger.total(),
            }),
        );
        tracing::debug!(
            run_id = %ctx.run_id,
            ?status,
            total_steps = ctx.total_steps,
            "agent run finished"
        );

        let output = if let Some(error_output) = end.error_output {
            error_output
        } else if cancelled {
            AgentOutput::error(CANCELLED_MESSAGE)
        } else if let Some(value) = ctx.state.output.clone() {
            AgentOutput::Structured { value }
        } else {
            AgentOutput::LastMessage {
                text: ctx
                    .state
                    .message_history
                    .last_assistant_text()
                    .unwrap_or_default(),
            }
        };
        Ok(RunOutcome {
            state: ctx.state,
            output,
        })
    }

    async fn finalize_failed_run(
        &self,
        mut ctx: RunContext,
        error: CanopyError,
    ) -> Result<RunOutcome> {
        tracing::error!(
            run_id = %ctx.run_id,
            agent_type = %ctx.state.agent_type,
            step = ctx.total_steps,
            %error,
            "agent run failed"
        );
        let status = if ctx.cancel.is_cancelled() {
            RunStatus::Cancelled
        } else {
            RunStatus::Failed
        };
        ctx.state.credits_used = ctx.ledger.total();
        ctx.state.direct_credits_used = ctx.ledger.direct();
        if let Err(finish_error) = self
            .storage
            .finish_run(FinishRun {
                run_id: ctx.run_id.clone(),
                status,
                total_steps: ctx.total_steps,
                direct_credits: ctx.ledger.direct(),
                total_credits: ctx.ledger.total(),
                error_message: Some(error.to_string()),
            })
            .await
        {
            tracing::error!(run_id = %ctx.run_id, %finish_error, "failed to finalize failed run");
        }
        self.handlers.remove(&ctx.run_id);

        if error.is_payment_required() {
            return Err(error);
        }
        let output = AgentOutput::Error {
            message: error.to_string(),
            status_code: error.status_code(),
        };
        Ok(RunOutcome {
            state: ctx.state,
            output,
        })
    }

    async fn drive_loop(
        &self,
        ctx: &mut RunContext,
        mut prompt_this_turn: Option<String>,
        initial_params: Option<serde_json::Value>,
    ) -> Result<LoopEnd> {
        let mut pending_generate_n: Option<usize> = None;

        loop {
            if ctx.cancel.is_cancelled() {
                return Ok(LoopEnd {
                    cancelled: true,
                    error_output: None,
                });
            }

            let system_tokens = estimate_text_tokens(&ctx.system_prompt)
                + estimate_tool_definition_tokens(ctx.tools());
            ctx.state.context_token_count = match self
                .transport
                .count_tokens(ctx.state.message_history.messages(), &ctx.system_prompt)
                .await
            {
                Ok(tokens) => tokens,
                Err(error) => {
                    tracing::debug!(run_id = %ctx.run_id, %error, "token count fell back to local estimate");
                    system_tokens + estimate_history_tokens(ctx.state.message_history.messages())
                }
            };
            ctx.state
                .message_history
                .trim_to_token_budget(system_tokens, &self.config);

            if ctx.template.handle_steps.is_some() {
                match self
                    .run_programmatic_turn(ctx, prompt_this_turn.clone(), initial_params.clone())
                    .await?
                {
                    Programmatic::RunStep { generate_n } => {
                        pending_generate_n = generate_n;
                        ctx.should_end_turn = false;
                    }
                    Programmatic::EndTurn => {
                        ctx.should_end_turn = true;
                    }
                    Programmatic::Failed(message) => {
                        return self.record_handler_failure(ctx, message).await;
                    }
                }
            }

            // One retry per run: an output-schema agent that tries to end
            // without output is sent back for a set_output call.
            if ctx.should_end_turn
                && ctx.template.output_schema.is_some()
                && ctx.state.output.is_none()
                && !ctx.has_retried_output_schema
            {
                ctx.has_retried_output_schema = true;
                ctx.state
                    .message_history
                    .append(Message::user(OUTPUT_SCHEMA_RETRY_MESSAGE).kept());
                ctx.should_end_turn = false;
            }

            if ctx.should_end_turn {
                break;
            }

            let start_time = Utc::now();
            let credits_before = ctx.ledger.total();
            let children_before = ctx.state.child_run_ids.len();

            let outcome = step::run_step(
                self,
                ctx,
                prompt_this_turn.as_deref(),
                pending_generate_n.take(),
            )
            .await?;

            ctx.total_steps += 1;
            self.storage
                .add_step(StepRecord {
                    run_id: ctx.run_id.clone(),
                    step_number: ctx.total_steps,
                    credits: ctx.ledger.total() - credits_before,
                    child_run_ids: ctx.state.child_run_ids[children_before..].to_vec(),
                    message_id: outcome.message_id.clone(),
                    status: StepStatus::Completed,
                    start_time,
                    error_message: None,
                })
                .await?;
            self.track(
                "agent_step",
                serde_json::json!({
                    "run_id": ctx.run_id,
                    "step_number": ctx.total_steps,
                    "had_error": outcome.had_error,
                }),
            );

            ctx.should_end_turn = outcome.end_turn;
            ctx.n_responses = outcome.n_responses;
            prompt_this_turn = None;
        }

        Ok(LoopEnd {
            cancelled: ctx.cancel.is_cancelled(),
            error_output: None,
        })
    }

    /// Handler failures end the run with an assistant-visible message, an
    /// error output, and a skipped step record.
    async fn record_handler_failure(
        &self,
        ctx: &mut RunContext,
        message: String,
    ) -> Result<LoopEnd> {
        let text = format!("Step handler failed: {message}");
        ctx.state
            .message_history
            .append(Message::assistant(text.clone()));
        ctx.total_steps += 1;
        self.storage
            .add_step(StepRecord {
                run_id: ctx.run_id.clone(),
                step_number: ctx.total_steps,
                credits: 0.0,
                child_run_ids: Vec::new(),
                message_id: None,
                status: StepStatus::Skipped,
                start_time: Utc::now(),
                error_message: Some(message),
            })
            .await?;
        Ok(LoopEnd {
            cancelled: false,
            error_output: Some(AgentOutput::error(text)),
        })
    }

    /// Resume the run's step handler until it cedes control.
    async fn run_programmatic_turn(
        &self,
        ctx: &mut RunContext,
        prompt: Option<String>,
        params: Option<serde_json::Value>,
    ) -> Result<Programmatic> {
        let factory = ctx
            .template
            .handle_steps
            .clone()
            .expect("caller checked handle_steps");
        let initial_state = ctx.state.public();
        let mut slot = self
            .handlers
            .take_or_create(&ctx.run_id, move || factory(initial_state, prompt, params));

        if slot.finished {
            // Done handlers stay done; the loop may still run LLM turns
            // (output-schema retry) without re-entering them.
            self.handlers.restore(&ctx.run_id, slot);
            return Ok(Programmatic::RunStep { generate_n: None });
        }
        if slot.step_all {
            if !ctx.should_end_turn {
                self.handlers.restore(&ctx.run_id, slot);
                return Ok(Programmatic::RunStep { generate_n: None });
            }
            // Steps complete: leave step-all mode and resume the handler.
            slot.step_all = false;
        }

        loop {
            let resume = HandlerResume {
                agent_state: ctx.state.public(),
                tool_result: ctx.pending_tool_result.take(),
                steps_complete: ctx.should_end_turn,
                n_responses: ctx.n_responses.take(),
            };
            let signal = match slot.handler.resume(resume) {
                Ok(signal) => signal,
                Err(error) => {
                    self.handlers.remove(&ctx.run_id);
                    return Ok(Programmatic::Failed(error.to_string()));
                }
            };
            match signal {
                HandlerSignal::Done => {
                    slot.finished = true;
                    self.handlers.restore(&ctx.run_id, slot);
                    return Ok(Programmatic::EndTurn);
                }
                HandlerSignal::Yield(HandlerYield::Step) => {
                    self.handlers.restore(&ctx.run_id, slot);
                    return Ok(Programmatic::RunStep { generate_n: None });
                }
                HandlerSignal::Yield(HandlerYield::StepAll) => {
                    slot.step_all = true;
                    self.handlers.restore(&ctx.run_id, slot);
                    return Ok(Programmatic::RunStep { generate_n: None });
                }
                HandlerSignal::Yield(HandlerYield::GenerateN { n }) => {
                    self.handlers.restore(&ctx.run_id, slot);
                    return Ok(Programmatic::RunStep { generate_n: Some(n) });
                }
                HandlerSignal::Yield(HandlerYield::StepText { text }) => {
                    // Injected text goes through the same pipeline as a real
                    // model response: inline calls are parsed, dispatched,
                    // and recorded.
                    let chunks: Vec<Result<crate::types::StreamChunk>> =
                        vec![Ok(crate::types::StreamChunk::TextDelta { text })];
                    let synthetic = futures::stream::iter(chunks);
                    let outcome = process_stream(self, ctx, Box::pin(synthetic), true).await?;
                    ctx.pending_tool_result = outcome.last_tool_output;
                }
                HandlerSignal::Yield(HandlerYield::ToolCall {
                    tool_name,
                    input,
                    include_tool_call,
                }) => {
                    let call = ToolCall {
                        id: uuid::Uuid::new_v4().to_string(),
                        name: tool_name,
                        input,
                    };
                    if include_tool_call {
                        ctx.state
                            .message_history
                            .append(Message::assistant_parts(vec![ContentPart::ToolCall(
                                call.clone(),
                            )]));
                    }
                    let result = dispatch_tool_call(
                        self,
                        ctx,
                        call,
                        CallOrigin::Handler,
                        include_tool_call,
                    )
                    .await?;
                    if !result.recorded && include_tool_call {
                        ctx.state
                            .message_history
                            .remove_tool_call_part(&result.call.id);
                    }
                    ctx.pending_tool_result = Some(result.output);
                }
            }
        }
    }

    fn resolve_template(&self, params: &RunParams) -> Result<Arc<AgentTemplate>> {
        if let Some(template) = &params.template {
            return Ok(template.clone());
        }
        if let Some(template) = params.local_agent_templates.get(&params.agent_type) {
            return Ok(template.clone());
        }
        if let Some(registry) = &self.template_registry {
            if let Some(template) = registry.get_agent_template(&params.agent_type) {
                return Ok(template);
            }
        }
        Err(CanopyError::TemplateNotFound(params.agent_type.clone()))
    }
}

fn assemble_system_prompt(template: &AgentTemplate, project: &ProjectFileContext) -> String {
    let mut prompt = template.system_prompt.clone();
    if !project.knowledge_files.is_empty() {
        prompt.push_str("\n\n# Project knowledge");
        for (path, content) in &project.knowledge_files {
            prompt.push_str(&format!("\n\n## {path}\n{content}"));
        }
    }
    prompt
}

fn build_user_prompt_message(
    prompt: Option<&str>,
    params: Option<&serde_json::Value>,
    content: Option<Vec<ContentPart>>,
) -> Message {
    let mut text = prompt.unwrap_or_default().to_string();
    if let Some(params) = params {
        if !text.is_empty() {
            text.push_str("\n\n");
        }
        text.push_str(&format!(
            "Parameters:\n{}",
            serde_json::to_string_pretty(params).unwrap_or_default()
        ));
    }
    let message = match content {
        Some(mut parts) => {
            if !text.is_empty() {
                parts.push(ContentPart::Text { text });
            }
            let mut message = Message::user("");
            message.content = crate::types::MessageContent::Parts(parts);
            message
        }
        None => Message::user(text),
    };
    message.with_tag(MessageTag::UserPrompt).kept()
}
