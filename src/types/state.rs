//! Agent state, run records, and output types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::history::MessageStore;

/// Status of a subgoal tracked in the agent's scratch context.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SubgoalStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Abandoned,
}

/// A small scratch record usable by programmatic step handlers as persistent
/// state between steps.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Subgoal {
    pub objective: String,
    #[serde(default)]
    pub status: SubgoalStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub logs: Vec<String>,
}

/// Live state of one agent instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentState {
    pub agent_id: String,
    pub agent_type: String,
    /// Assigned when the run starts; stable for the agent's lifetime.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Root-first chain of ancestor run ids.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ancestor_run_ids: Vec<String>,
    pub message_history: MessageStore,
    pub steps_remaining: u32,
    /// Own plus descendant credit spend.
    pub credits_used: f64,
    /// Only this agent's own LLM/tool spend.
    pub direct_credits_used: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub child_run_ids: Vec<String>,
    /// Structured value produced by the `set_output` tool.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub agent_context: BTreeMap<String, Subgoal>,
    /// Cached estimate of the prompt tokens the next turn would consume.
    pub context_token_count: usize,
}

impl AgentState {
    /// Fresh state for an agent of the given type.
    pub fn new(agent_type: impl Into<String>, steps_remaining: u32) -> Self {
        Self {
            agent_id: uuid::Uuid::new_v4().to_string(),
            agent_type: agent_type.into(),
            run_id: None,
            parent_id: None,
            ancestor_run_ids: Vec::new(),
            message_history: MessageStore::new(),
            steps_remaining,
            credits_used: 0.0,
            direct_credits_used: 0.0,
            child_run_ids: Vec::new(),
            output: None,
            agent_context: BTreeMap::new(),
            context_token_count: 0,
        }
    }

    /// Read-only projection handed to programmatic step handlers.
    pub fn public(&self) -> PublicAgentState {
        PublicAgentState {
            agent_id: self.agent_id.clone(),
            agent_type: self.agent_type.clone(),
            run_id: self.run_id.clone(),
            steps_remaining: self.steps_remaining,
            credits_used: self.credits_used,
            direct_credits_used: self.direct_credits_used,
            output: self.output.clone(),
            agent_context: self.agent_context.clone(),
            message_count: self.message_history.len(),
            last_assistant_text: self.message_history.last_assistant_text(),
        }
    }
}

/// The view of agent state exposed to programmatic step handlers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicAgentState {
    pub agent_id: String,
    pub agent_type: String,
    pub run_id: Option<String>,
    pub steps_remaining: u32,
    pub credits_used: f64,
    pub direct_credits_used: f64,
    pub output: Option<serde_json::Value>,
    pub agent_context: BTreeMap<String, Subgoal>,
    pub message_count: usize,
    pub last_assistant_text: Option<String>,
}

/// Terminal status of a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Active,
    Completed,
    Cancelled,
    Failed,
}

/// A top-level agent invocation as recorded by storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub run_id: String,
    pub agent_id: String,
    pub status: RunStatus,
    pub total_steps: u32,
    pub direct_credits: f64,
    pub total_credits: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Final output of an agent invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentOutput {
    /// Value set through the `set_output` tool.
    Structured { value: serde_json::Value },
    /// No structured output; the last assistant message stands in.
    LastMessage { text: String },
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status_code: Option<u16>,
    },
}

impl AgentOutput {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            status_code: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_state_has_zeroed_accounting() {
        let state = AgentState::new("researcher", 25);
        assert_eq!(state.steps_remaining, 25);
        assert_eq!(state.credits_used, 0.0);
        assert_eq!(state.direct_credits_used, 0.0);
        assert!(state.run_id.is_none());
        assert!(state.child_run_ids.is_empty());
    }

    #[test]
    fn public_projection_mirrors_accounting() {
        let mut state = AgentState::new("researcher", 10);
        state.credits_used = 3.5;
        state.direct_credits_used = 1.5;
        state.agent_context.insert(
            "find-docs".to_string(),
            Subgoal {
                objective: "locate API docs".to_string(),
                ..Subgoal::default()
            },
        );
        let public = state.public();
        assert_eq!(public.credits_used, 3.5);
        assert_eq!(public.direct_credits_used, 1.5);
        assert_eq!(public.agent_context.len(), 1);
    }
}
