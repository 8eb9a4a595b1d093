use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::support::*;
use crate::error::CanopyError;
use crate::runtime::handler::{
    HandlerResume, HandlerSignal, HandlerYield, StepHandler, StepHandlerFactory,
};
use crate::runtime::RunParams;
use crate::types::{AgentOutput, AgentTemplate, Role, ToolOutputPart};

struct ScriptedHandler {
    script: VecDeque<HandlerSignal>,
    resumes: Arc<Mutex<Vec<HandlerResume>>>,
}

impl StepHandler for ScriptedHandler {
    fn resume(&mut self, input: HandlerResume) -> crate::error::Result<HandlerSignal> {
        self.resumes.lock().expect("resume lock").push(input);
        Ok(self.script.pop_front().unwrap_or(HandlerSignal::Done))
    }
}

fn scripted(
    signals: Vec<HandlerSignal>,
) -> (StepHandlerFactory, Arc<Mutex<Vec<HandlerResume>>>) {
    let resumes = Arc::new(Mutex::new(Vec::new()));
    let handler_resumes = resumes.clone();
    let factory: StepHandlerFactory = Arc::new(move |_state, _prompt, _params| {
        Box::new(ScriptedHandler {
            script: signals.clone().into(),
            resumes: handler_resumes.clone(),
        })
    });
    (factory, resumes)
}

struct FailingHandler;

impl StepHandler for FailingHandler {
    fn resume(&mut self, _input: HandlerResume) -> crate::error::Result<HandlerSignal> {
        Err(CanopyError::Handler("boom".to_string()))
    }
}

fn template_with_handler(factory: StepHandlerFactory) -> AgentTemplate {
    AgentTemplate::new("scripted", "stub-model")
        .with_tools(["think_deeply", "end_turn", "run_terminal_command"])
        .with_step_handler(factory)
}

#[tokio::test]
async fn hidden_tool_call_stays_out_of_history() {
    let harness = harness(TransportScenario::PlainTextOnly);
    let (factory, resumes) = scripted(vec![HandlerSignal::Yield(HandlerYield::ToolCall {
        tool_name: "think_deeply".to_string(),
        input: serde_json::json!({"thought": "scaffolding"}),
        include_tool_call: false,
    })]);

    let outcome = harness
        .runtime
        .run_agent(
            RunParams::new("scripted")
                .with_template(Arc::new(template_with_handler(factory)))
                .with_prompt("start"),
        )
        .await
        .expect("run succeeds");

    assert_eq!(harness.transport.stream_calls(), 0, "handler never ceded a step");
    assert!(
        !outcome
            .state
            .message_history
            .messages()
            .iter()
            .any(|m| m.role == Role::Tool),
        "hidden call leaves no history entry"
    );
    let resumes = resumes.lock().unwrap();
    assert_eq!(resumes.len(), 2);
    assert_eq!(
        resumes[1].tool_result,
        Some(vec![ToolOutputPart::text("Thought recorded.")])
    );
}

#[tokio::test]
async fn injected_text_executes_inline_calls() {
    let harness = harness(TransportScenario::PlainTextOnly);
    let (factory, resumes) = scripted(vec![HandlerSignal::Yield(HandlerYield::StepText {
        text: "Working. <end_turn></end_turn>".to_string(),
    })]);

    let outcome = harness
        .runtime
        .run_agent(
            RunParams::new("scripted")
                .with_template(Arc::new(template_with_handler(factory)))
                .with_prompt("start"),
        )
        .await
        .expect("run succeeds");

    assert_eq!(harness.transport.stream_calls(), 0);
    let history = outcome.state.message_history;
    assert!(history
        .messages()
        .iter()
        .any(|m| m.role == Role::Tool && m.tool_name.as_deref() == Some("end_turn")));
    assert!(history
        .messages()
        .iter()
        .any(|m| m.role == Role::Assistant && m.text().contains("Working.")));
    let resumes = resumes.lock().unwrap();
    assert_eq!(
        resumes[1].tool_result,
        Some(vec![ToolOutputPart::text("Turn ended.")])
    );
}

#[tokio::test]
async fn generate_n_resumes_with_alternative_completions() {
    let harness = harness(TransportScenario::PlainTextOnly);
    let (factory, resumes) = scripted(vec![HandlerSignal::Yield(HandlerYield::GenerateN {
        n: 3,
    })]);

    harness
        .runtime
        .run_agent(
            RunParams::new("scripted")
                .with_template(Arc::new(template_with_handler(factory)))
                .with_prompt("start"),
        )
        .await
        .expect("run succeeds");

    assert_eq!(harness.transport.prompt_calls(), 1);
    assert_eq!(harness.transport.stream_calls(), 0);
    let resumes = resumes.lock().unwrap();
    assert_eq!(
        resumes[1].n_responses,
        Some(vec![
            "option-0".to_string(),
            "option-1".to_string(),
            "option-2".to_string()
        ])
    );
}

#[tokio::test]
async fn step_all_runs_llm_turns_until_turn_would_end() {
    let harness = harness(TransportScenario::TerminalCommandThenText);
    let (factory, resumes) = scripted(vec![HandlerSignal::Yield(HandlerYield::StepAll)]);

    harness
        .runtime
        .run_agent(
            RunParams::new("scripted")
                .with_template(Arc::new(template_with_handler(factory)))
                .with_prompt("start"),
        )
        .await
        .expect("run succeeds");

    // Terminal command forces a second turn; the handler is only re-entered
    // once the loop would end the turn.
    assert_eq!(harness.transport.stream_calls(), 2);
    let resumes = resumes.lock().unwrap();
    assert_eq!(resumes.len(), 2);
    assert!(resumes[1].steps_complete);
}

#[tokio::test]
async fn handler_failure_records_skipped_step() {
    let harness = harness(TransportScenario::PlainTextOnly);
    let factory: StepHandlerFactory =
        Arc::new(|_state, _prompt, _params| Box::new(FailingHandler));

    let outcome = harness
        .runtime
        .run_agent(
            RunParams::new("scripted")
                .with_template(Arc::new(template_with_handler(factory)))
                .with_prompt("start"),
        )
        .await
        .expect("run returns an outcome");

    match outcome.output {
        AgentOutput::Error { message, .. } => assert!(message.contains("boom")),
        other => panic!("expected error output, got {other:?}"),
    }
    let steps = harness.storage.steps();
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].status, crate::contracts::StepStatus::Skipped);
    assert!(outcome
        .state
        .message_history
        .messages()
        .iter()
        .any(|m| m.role == Role::Assistant && m.text().contains("boom")));
}

#[tokio::test]
async fn handler_registry_entry_is_destroyed_at_run_end() {
    let harness = harness(TransportScenario::PlainTextOnly);
    let (factory, _resumes) = scripted(vec![HandlerSignal::Yield(HandlerYield::Step)]);

    harness
        .runtime
        .run_agent(
            RunParams::new("scripted")
                .with_template(Arc::new(template_with_handler(factory)))
                .with_prompt("start"),
        )
        .await
        .expect("run succeeds");

    assert!(!harness.runtime.handlers.contains("run-0"));
}
