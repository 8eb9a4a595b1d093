//! Programmatic step handlers.
//!
//! A step handler is a resumable state machine that interleaves
//! deterministic code with LLM turns. The runtime resumes it once per loop
//! iteration (plus once per tool call it requests) and keeps it alive in a
//! per-run registry until the run reaches any terminal status.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::Result;
use crate::types::{PublicAgentState, ToolOutputPart};

/// Input passed to the handler on each resumption.
#[derive(Debug, Clone)]
pub struct HandlerResume {
    pub agent_state: PublicAgentState,
    /// Output of the previously yielded tool call or injected text, if any.
    pub tool_result: Option<Vec<ToolOutputPart>>,
    /// Whether the loop would end the turn after the last LLM step.
    pub steps_complete: bool,
    /// Alternative completions produced by a preceding `GenerateN` yield.
    pub n_responses: Option<Vec<String>>,
}

/// What a handler asks the loop to do next.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerYield {
    /// Run one LLM turn, then resume the handler.
    Step,
    /// Run LLM turns without re-entering the handler until the loop would
    /// next end the turn.
    StepAll,
    /// Inject text as if the model emitted it; inline tool calls are parsed
    /// and executed before the handler resumes.
    StepText { text: String },
    /// Ask the next LLM turn for `n` parallel completions.
    GenerateN { n: usize },
    /// Execute one tool call as if the agent had issued it. With
    /// `include_tool_call` false, neither the call nor its result enters
    /// message history.
    ToolCall {
        tool_name: String,
        input: serde_json::Value,
        include_tool_call: bool,
    },
}

/// A handler resumption either yields more work or declares itself done.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerSignal {
    Yield(HandlerYield),
    Done,
}

/// The resumable handler itself. Implementations are plain state machines;
/// `resume` must not block.
pub trait StepHandler: Send {
    fn resume(&mut self, input: HandlerResume) -> Result<HandlerSignal>;
}

/// Factory stored on a template: `(initial state, prompt, params)` to a
/// fresh handler instance.
pub type StepHandlerFactory = Arc<
    dyn Fn(PublicAgentState, Option<String>, Option<serde_json::Value>) -> Box<dyn StepHandler>
        + Send
        + Sync,
>;

/// Registry slot for one run's live handler.
pub(crate) struct HandlerSlot {
    pub(crate) handler: Box<dyn StepHandler>,
    /// Set while the run is in step-all mode.
    pub(crate) step_all: bool,
    /// The handler returned `Done`; it must not be resumed again.
    pub(crate) finished: bool,
}

/// Live handlers keyed by run id. A run only touches its own entry, so a
/// plain mutex-guarded map suffices; slots are taken out for the duration
/// of a programmatic turn and restored afterward, keeping the lock scope
/// free of awaits.
#[derive(Default)]
pub(crate) struct HandlerRegistry {
    slots: Mutex<HashMap<String, HandlerSlot>>,
}

impl HandlerRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Take the run's slot, creating it from `factory` on first use.
    pub(crate) fn take_or_create(
        &self,
        run_id: &str,
        factory: impl FnOnce() -> Box<dyn StepHandler>,
    ) -> HandlerSlot {
        let mut slots = self.slots.lock().expect("handler registry poisoned");
        slots.remove(run_id).unwrap_or_else(|| HandlerSlot {
            handler: factory(),
            step_all: false,
            finished: false,
        })
    }

    pub(crate) fn restore(&self, run_id: &str, slot: HandlerSlot) {
        let mut slots = self.slots.lock().expect("handler registry poisoned");
        slots.insert(run_id.to_string(), slot);
    }

    /// Destroy the run's handler; called on every terminal status.
    pub(crate) fn remove(&self, run_id: &str) {
        let mut slots = self.slots.lock().expect("handler registry poisoned");
        slots.remove(run_id);
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, run_id: &str) -> bool {
        self.slots
            .lock()
            .expect("handler registry poisoned")
            .contains_key(run_id)
    }
}
