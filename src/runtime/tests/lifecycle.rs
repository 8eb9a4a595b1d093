use std::sync::Arc;

use super::support::*;
use crate::runtime::{ResponseChunk, RunParams, STEP_WARNING_MESSAGE};
use crate::types::{
    AgentOutput, AgentState, AgentTemplate, ContentPart, MessageContent, Role, RunStatus,
};

fn run_params(template: AgentTemplate) -> RunParams {
    RunParams::new(template.id.clone()).with_template(Arc::new(template))
}

#[tokio::test]
async fn task_completed_call_ends_turn() {
    let harness = harness(TransportScenario::TextThenTaskCompleted);
    let template = AgentTemplate::new("worker", "stub-model")
        .with_tools(["task_completed", "run_terminal_command"]);

    let outcome = harness
        .runtime
        .run_agent(run_params(template).with_prompt("ship it"))
        .await
        .expect("run succeeds");

    assert_eq!(harness.transport.stream_calls(), 1);
    assert_eq!(outcome.state.steps_remaining, harness.runtime.config().max_agent_steps - 1);

    let history = outcome.state.message_history;
    let last = history.messages().last().expect("non-empty history");
    assert_eq!(last.role, Role::Tool);
    assert_eq!(last.tool_name.as_deref(), Some("task_completed"));

    let finishes = harness.storage.finishes();
    assert_eq!(finishes.len(), 1);
    assert_eq!(finishes[0].status, RunStatus::Completed);
    assert_eq!(finishes[0].total_steps, 1);
}

#[tokio::test]
async fn plain_text_ends_turn_via_no_work() {
    let harness = harness(TransportScenario::PlainTextOnly);
    let template = AgentTemplate::new("chatter", "stub-model").with_tools(["read_files"]);

    let outcome = harness
        .runtime
        .run_agent(run_params(template).with_prompt("hello"))
        .await
        .expect("run succeeds");

    assert_eq!(harness.transport.stream_calls(), 1);
    match outcome.output {
        AgentOutput::LastMessage { text } => assert_eq!(text, "Nothing to do here."),
        other => panic!("expected last-message output, got {other:?}"),
    }
    assert_eq!(harness.storage.finishes()[0].status, RunStatus::Completed);
}

#[tokio::test]
async fn exhausted_step_budget_skips_the_llm() {
    let harness = harness(TransportScenario::PlainTextOnly);
    let template = AgentTemplate::new("worker", "stub-model");
    let (sink, chunks) = capture_chunks();
    let state = AgentState::new("worker", 0);

    let outcome = harness
        .runtime
        .run_agent(
            run_params(template)
                .with_prompt("anything")
                .with_state(state)
                .with_sink(sink),
        )
        .await
        .expect("run succeeds");

    assert_eq!(harness.transport.stream_calls(), 0, "no LLM call is made");
    let chunks = chunks.lock().unwrap();
    assert!(chunks.iter().any(|chunk| matches!(
        chunk,
        ResponseChunk::Text { text } if text == STEP_WARNING_MESSAGE
    )));
    let last = outcome.state.message_history.messages().last().unwrap().clone();
    assert_eq!(last.role, Role::User);
    assert!(last.text().starts_with("<system>"));
    assert_eq!(outcome.state.steps_remaining, 0);
}

#[tokio::test]
async fn compact_command_replaces_history_with_summary() {
    let harness = harness(TransportScenario::TwoLineSummary);
    let template = AgentTemplate::new("worker", "stub-model");

    let outcome = harness
        .runtime
        .run_agent(run_params(template).with_prompt("/compact"))
        .await
        .expect("run succeeds");

    let history = outcome.state.message_history;
    assert_eq!(history.len(), 1);
    let message = &history.messages()[0];
    assert_eq!(message.role, Role::User);
    assert!(message.text().starts_with("<system>"));
    assert!(message.text().contains("Summary line one."));
    assert!(message.text().contains("Summary line two."));
}

#[tokio::test]
async fn inline_xml_end_turn_is_extracted_and_dispatched() {
    let harness = harness(TransportScenario::InlineEndTurn);
    let template = AgentTemplate::new("worker", "stub-model").with_tools(["end_turn"]);
    let (sink, chunks) = capture_chunks();

    let outcome = harness
        .runtime
        .run_agent(run_params(template).with_prompt("finish up").with_sink(sink))
        .await
        .expect("run succeeds");

    assert_eq!(harness.transport.stream_calls(), 1);
    let history = outcome.state.message_history;
    assert!(history
        .messages()
        .iter()
        .any(|m| m.role == Role::Tool && m.tool_name.as_deref() == Some("end_turn")));
    let chunks = chunks.lock().unwrap();
    assert!(chunks.iter().any(|chunk| matches!(
        chunk,
        ResponseChunk::ToolCall { tool_name, .. } if tool_name == "end_turn"
    )));
}

#[tokio::test]
async fn provider_error_suppresses_no_work_shortcut() {
    let harness = harness(TransportScenario::ErrorMidStream);
    let template = AgentTemplate::new("worker", "stub-model");
    let (sink, chunks) = capture_chunks();
    let state = AgentState::new("worker", 2);

    harness
        .runtime
        .run_agent(
            run_params(template)
                .with_prompt("try")
                .with_state(state)
                .with_sink(sink),
        )
        .await
        .expect("run succeeds");

    // Both budgeted steps run (the error blocks the no-work path), then the
    // budget force-terminates the turn.
    assert_eq!(harness.transport.stream_calls(), 2);
    let chunks = chunks.lock().unwrap();
    assert!(chunks.iter().any(|chunk| matches!(
        chunk,
        ResponseChunk::Error { message } if message.contains("upstream overloaded")
    )));
}

#[tokio::test]
async fn missing_output_is_retried_exactly_once() {
    let harness = harness(TransportScenario::SetOutputMissing);
    let template = AgentTemplate::new("extractor", "stub-model").with_output_schema(
        serde_json::json!({
            "type": "object",
            "required": ["answer"],
            "properties": {"answer": {"type": "string"}}
        }),
    );

    let outcome = harness
        .runtime
        .run_agent(run_params(template).with_prompt("extract"))
        .await
        .expect("run succeeds");

    assert_eq!(harness.transport.stream_calls(), 2, "one retry turn only");
    assert!(outcome.state.output.is_none());
    match outcome.output {
        AgentOutput::LastMessage { text } => assert_eq!(text, "All finished."),
        other => panic!("expected last-message output, got {other:?}"),
    }
    assert!(outcome
        .state
        .message_history
        .messages()
        .iter()
        .any(|m| m.text().contains("set_output")));
}

#[tokio::test]
async fn set_output_produces_structured_output() {
    let harness = harness(TransportScenario::SetOutputThenDone);
    let template = AgentTemplate::new("extractor", "stub-model").with_output_schema(
        serde_json::json!({
            "type": "object",
            "required": ["answer"],
            "properties": {"answer": {"type": "string"}}
        }),
    );

    let outcome = harness
        .runtime
        .run_agent(run_params(template).with_prompt("extract"))
        .await
        .expect("run succeeds");

    assert_eq!(harness.transport.stream_calls(), 1);
    match outcome.output {
        AgentOutput::Structured { value } => {
            assert_eq!(value["answer"], "forty-two");
        }
        other => panic!("expected structured output, got {other:?}"),
    }
}

#[tokio::test]
async fn tool_call_event_precedes_its_result() {
    let harness = harness(TransportScenario::TerminalCommandThenText);
    let template = AgentTemplate::new("worker", "stub-model")
        .with_tools(["run_terminal_command"]);
    let (sink, chunks) = capture_chunks();

    let outcome = harness
        .runtime
        .run_agent(run_params(template).with_prompt("list files").with_sink(sink))
        .await
        .expect("run succeeds");

    let chunks = chunks.lock().unwrap();
    let call_index = chunks
        .iter()
        .position(|chunk| matches!(chunk, ResponseChunk::ToolCall { tool_call_id, .. } if tool_call_id == "call-term"))
        .expect("tool_call emitted");
    let result_index = chunks
        .iter()
        .position(|chunk| matches!(chunk, ResponseChunk::ToolResult { tool_call_id, .. } if tool_call_id == "call-term"))
        .expect("tool_result emitted");
    assert!(call_index < result_index);

    // Terminal history invariant: every assistant tool-call part has a
    // matching tool message.
    let history = outcome.state.message_history;
    for message in history.messages() {
        if let MessageContent::Parts(parts) = &message.content {
            for part in parts {
                if let ContentPart::ToolCall(call) = part {
                    assert!(
                        history.messages().iter().any(|m| {
                            m.role == Role::Tool && m.tool_call_id.as_deref() == Some(&call.id)
                        }),
                        "call {} has no result",
                        call.id
                    );
                }
            }
        }
    }

    assert_eq!(harness.host.requests().len(), 1);
    assert_eq!(harness.host.requests()[0].tool_name, "run_terminal_command");
}

#[tokio::test]
async fn step_records_carry_per_step_credits() {
    let harness = harness(TransportScenario::TerminalCommandThenText);
    let template = AgentTemplate::new("worker", "stub-model")
        .with_tools(["run_terminal_command"]);

    let outcome = harness
        .runtime
        .run_agent(run_params(template).with_prompt("list files"))
        .await
        .expect("run succeeds");

    let steps = harness.storage.steps();
    assert_eq!(steps.len(), 2);
    assert_eq!(steps[0].step_number, 1);
    assert_eq!(steps[1].step_number, 2);
    for step in &steps {
        assert_eq!(step.credits, COST_PER_LLM_CALL);
    }
    assert_eq!(outcome.state.direct_credits_used, 2.0 * COST_PER_LLM_CALL);
    assert_eq!(outcome.state.credits_used, outcome.state.direct_credits_used);
}
