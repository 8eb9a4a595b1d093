use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream::{self, BoxStream};

use crate::config::RuntimeConfig;
use crate::contracts::{
    FinishRun, LlmTransport, PromptRequest, RunStorage, StartRun, StepRecord, ToolCallOutput,
    ToolCallRequest, ToolHost,
};
use crate::error::{CanopyError, Result};
use crate::runtime::events::{ResponseChunk, ResponseSink};
use crate::runtime::Runtime;
use crate::types::{Message, StreamChunk, ToolOutputPart};

pub(super) const COST_PER_LLM_CALL: f64 = 1.0;

/// Canned model behaviors, one stream per `prompt_stream` call in order.
#[derive(Clone, Copy)]
pub(super) enum TransportScenario {
    /// Text then a `task_completed` call, then plain text forever.
    TextThenTaskCompleted,
    /// Plain text, no tool calls, every call.
    PlainTextOnly,
    /// A two-line summary (for the compact command).
    TwoLineSummary,
    /// `spawn_agents` for the named child on call 0, plain text after.
    SpawnAgents { child: &'static str },
    /// A call named after the child template itself (agent-as-tool).
    AgentAsTool { child: &'static str },
    /// Plain text every call; never calls `set_output`.
    SetOutputMissing,
    /// `set_output` with a valid value on call 0.
    SetOutputThenDone,
    /// `run_terminal_command` on call 0, plain text after.
    TerminalCommandThenText,
    /// Inline XML `end_turn` inside assistant text.
    InlineEndTurn,
    /// Text then a provider error chunk.
    ErrorMidStream,
}

fn text(text: &str) -> Result<StreamChunk> {
    Ok(StreamChunk::TextDelta {
        text: text.to_string(),
    })
}

fn finish(message_id: &str) -> Result<StreamChunk> {
    Ok(StreamChunk::Finish {
        message_id: Some(message_id.to_string()),
    })
}

fn tool_call(id: &str, name: &str, input: serde_json::Value) -> Vec<Result<StreamChunk>> {
    vec![
        Ok(StreamChunk::ToolCallStart {
            index: 0,
            id: id.to_string(),
            name: name.to_string(),
        }),
        Ok(StreamChunk::ToolCallDelta {
            index: 0,
            input_fragment: input.to_string(),
        }),
        Ok(StreamChunk::ToolCallEnd { index: 0 }),
    ]
}

pub(super) struct StubTransport {
    scenario: TransportScenario,
    stream_calls: AtomicUsize,
    prompt_calls: AtomicUsize,
    requests: Mutex<Vec<PromptRequest>>,
}

impl StubTransport {
    fn new(scenario: TransportScenario) -> Self {
        Self {
            scenario,
            stream_calls: AtomicUsize::new(0),
            prompt_calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(super) fn stream_calls(&self) -> usize {
        self.stream_calls.load(Ordering::SeqCst)
    }

    pub(super) fn prompt_calls(&self) -> usize {
        self.prompt_calls.load(Ordering::SeqCst)
    }

    pub(super) fn requests(&self) -> Vec<PromptRequest> {
        self.requests.lock().expect("request lock").clone()
    }
}

#[async_trait]
impl LlmTransport for StubTransport {
    async fn prompt_stream(
        &self,
        request: PromptRequest,
    ) -> Result<BoxStream<'static, Result<StreamChunk>>> {
        if let Some(on_cost) = &request.on_cost {
            on_cost(COST_PER_LLM_CALL);
        }
        let call_index = self.stream_calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().expect("request lock").push(request);

        let plain = |line: &str| -> Vec<Result<StreamChunk>> {
            vec![text(line), finish(&format!("msg-{call_index}"))]
        };
        let chunks = match self.scenario {
            TransportScenario::TextThenTaskCompleted => {
                if call_index == 0 {
                    let mut chunks = vec![text("Done with the task.")];
                    chunks.extend(tool_call("call-1", "task_completed", serde_json::json!({})));
                    chunks.push(finish("msg-0"));
                    chunks
                } else {
                    plain("nothing left")
                }
            }
            TransportScenario::PlainTextOnly => plain("Nothing to do here."),
            TransportScenario::TwoLineSummary => {
                plain("Summary line one.\nSummary line two.")
            }
            TransportScenario::SpawnAgents { child } => {
                if call_index == 0 {
                    let mut chunks = tool_call(
                        "call-spawn",
                        "spawn_agents",
                        serde_json::json!({
                            "agents": [{"agent_type": child, "prompt": "do the subtask"}]
                        }),
                    );
                    chunks.push(finish("msg-0"));
                    chunks
                } else {
                    plain("wrapping up")
                }
            }
            TransportScenario::AgentAsTool { child } => {
                if call_index == 0 {
                    let mut chunks = tool_call(
                        "call-child",
                        child,
                        serde_json::json!({"prompt": "do the subtask"}),
                    );
                    chunks.push(finish("msg-0"));
                    chunks
                } else {
                    plain("wrapping up")
                }
            }
            TransportScenario::SetOutputMissing => plain("All finished."),
            TransportScenario::SetOutputThenDone => {
                if call_index == 0 {
                    let mut chunks = tool_call(
                        "call-out",
                        "set_output",
                        serde_json::json!({"answer": "forty-two"}),
                    );
                    chunks.push(finish("msg-0"));
                    chunks
                } else {
                    plain("already done")
                }
            }
            TransportScenario::TerminalCommandThenText => {
                if call_index == 0 {
                    let mut chunks = vec![text("Let me check.")];
                    chunks.extend(tool_call(
                        "call-term",
                        "run_terminal_command",
                        serde_json::json!({"command": "ls"}),
                    ));
                    chunks.push(finish("msg-0"));
                    chunks
                } else {
                    plain("The listing looks fine.")
                }
            }
            TransportScenario::InlineEndTurn => {
                plain("Wrapping up. <end_turn></end_turn>")
            }
            TransportScenario::ErrorMidStream => vec![
                text("partial answer"),
                Ok(StreamChunk::Error {
                    message: "upstream overloaded".to_string(),
                }),
            ],
        };
        Ok(Box::pin(stream::iter(chunks)))
    }

    async fn prompt(&self, request: PromptRequest, n: usize) -> Result<String> {
        if let Some(on_cost) = &request.on_cost {
            on_cost(COST_PER_LLM_CALL);
        }
        self.prompt_calls.fetch_add(1, Ordering::SeqCst);
        let responses: Vec<String> = (0..n).map(|i| format!("option-{i}")).collect();
        Ok(serde_json::to_string(&responses)?)
    }

    async fn count_tokens(&self, _messages: &[Message], _system: &str) -> Result<usize> {
        Err(CanopyError::Transport(
            "token counting unavailable in stub".to_string(),
        ))
    }
}

#[derive(Debug, Clone)]
pub(super) enum StorageCall {
    Start(StartRun),
    Step(StepRecord),
    Finish(FinishRun),
}

#[derive(Default)]
pub(super) struct RecordingStorage {
    calls: Mutex<Vec<StorageCall>>,
    next_run: AtomicUsize,
}

impl RecordingStorage {
    pub(super) fn starts(&self) -> Vec<StartRun> {
        self.calls
            .lock()
            .expect("storage lock")
            .iter()
            .filter_map(|call| match call {
                StorageCall::Start(start) => Some(start.clone()),
                _ => None,
            })
            .collect()
    }

    pub(super) fn steps(&self) -> Vec<StepRecord> {
        self.calls
            .lock()
            .expect("storage lock")
            .iter()
            .filter_map(|call| match call {
                StorageCall::Step(step) => Some(step.clone()),
                _ => None,
            })
            .collect()
    }

    pub(super) fn finishes(&self) -> Vec<FinishRun> {
        self.calls
            .lock()
            .expect("storage lock")
            .iter()
            .filter_map(|call| match call {
                StorageCall::Finish(finish) => Some(finish.clone()),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl RunStorage for RecordingStorage {
    async fn start_run(&self, request: StartRun) -> Result<String> {
        let run_id = format!("run-{}", self.next_run.fetch_add(1, Ordering::SeqCst));
        self.calls
            .lock()
            .expect("storage lock")
            .push(StorageCall::Start(request));
        Ok(run_id)
    }

    async fn add_step(&self, record: StepRecord) -> Result<()> {
        self.calls
            .lock()
            .expect("storage lock")
            .push(StorageCall::Step(record));
        Ok(())
    }

    async fn finish_run(&self, request: FinishRun) -> Result<()> {
        self.calls
            .lock()
            .expect("storage lock")
            .push(StorageCall::Finish(request));
        Ok(())
    }
}

#[derive(Default)]
pub(super) struct RecordingToolHost {
    requests: Mutex<Vec<ToolCallRequest>>,
}

impl RecordingToolHost {
    pub(super) fn requests(&self) -> Vec<ToolCallRequest> {
        self.requests.lock().expect("host lock").clone()
    }
}

#[async_trait]
impl ToolHost for RecordingToolHost {
    async fn request_tool_call(&self, request: ToolCallRequest) -> Result<ToolCallOutput> {
        self.requests.lock().expect("host lock").push(request);
        Ok(ToolCallOutput {
            output: vec![ToolOutputPart::text("ok")],
        })
    }
}

/// A host whose tool call only returns once the shared token is cancelled;
/// stands in for a long-running handler that honors cancellation.
pub(super) struct HangingToolHost {
    pub(super) cancel: tokio_util::sync::CancellationToken,
    pub(super) reached: Arc<AtomicUsize>,
}

#[async_trait]
impl ToolHost for HangingToolHost {
    async fn request_tool_call(&self, _request: ToolCallRequest) -> Result<ToolCallOutput> {
        self.reached.fetch_add(1, Ordering::SeqCst);
        self.cancel.cancelled().await;
        Ok(ToolCallOutput { output: Vec::new() })
    }
}

pub(super) struct Harness {
    pub(super) runtime: Runtime,
    pub(super) transport: Arc<StubTransport>,
    pub(super) storage: Arc<RecordingStorage>,
    pub(super) host: Arc<RecordingToolHost>,
}

pub(super) fn stub_transport(scenario: TransportScenario) -> Arc<StubTransport> {
    Arc::new(StubTransport::new(scenario))
}

pub(super) fn harness(scenario: TransportScenario) -> Harness {
    harness_with_config(scenario, RuntimeConfig::default())
}

pub(super) fn harness_with_config(scenario: TransportScenario, config: RuntimeConfig) -> Harness {
    let transport = Arc::new(StubTransport::new(scenario));
    let storage = Arc::new(RecordingStorage::default());
    let host = Arc::new(RecordingToolHost::default());
    let runtime = Runtime::new(transport.clone(), storage.clone(), host.clone())
        .with_config(config);
    Harness {
        runtime,
        transport,
        storage,
        host,
    }
}

pub(super) fn capture_chunks() -> (ResponseSink, Arc<Mutex<Vec<ResponseChunk>>>) {
    let chunks = Arc::new(Mutex::new(Vec::<ResponseChunk>::new()));
    let sink_chunks = chunks.clone();
    let sink: ResponseSink = Arc::new(move |chunk| {
        if let Ok(mut guard) = sink_chunks.lock() {
            guard.push(chunk);
        }
    });
    (sink, chunks)
}

pub(super) fn local_templates(
    templates: impl IntoIterator<Item = crate::types::AgentTemplate>,
) -> BTreeMap<String, Arc<crate::types::AgentTemplate>> {
    templates
        .into_iter()
        .map(|template| (template.id.clone(), Arc::new(template)))
        .collect()
}
