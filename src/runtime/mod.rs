//! The agent runtime: drives multi-step agent invocations against the
//! injected contracts.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::RuntimeConfig;
use crate::contracts::{
    Analytics, CostSink, LlmTransport, ProjectFileContext, RunStorage, TemplateRegistry,
    ToolDefinition, ToolHost,
};
use crate::error::Result;
use crate::types::{AgentOutput, AgentState, AgentTemplate};

pub mod events;
pub mod handler;

mod credits;
mod dispatch;
mod inline_calls;
mod loop_runner;
mod run_context;
mod spawn;
mod step;
mod stream;

pub use events::{null_sink, ResponseChunk, ResponseSink};
pub use step::STEP_WARNING_MESSAGE;

/// The runtime. Owns the injected contracts, the configuration, and the
/// per-run handler registry. Cheap to share behind an `Arc`; runs may
/// execute concurrently.
pub struct Runtime {
    pub(crate) transport: Arc<dyn LlmTransport>,
    pub(crate) storage: Arc<dyn RunStorage>,
    pub(crate) tool_host: Arc<dyn ToolHost>,
    pub(crate) template_registry: Option<Arc<dyn TemplateRegistry>>,
    pub(crate) analytics: Option<Arc<dyn Analytics>>,
    pub(crate) config: RuntimeConfig,
    pub(crate) handlers: handler::HandlerRegistry,
}

impl Runtime {
    pub fn new(
        transport: Arc<dyn LlmTransport>,
        storage: Arc<dyn RunStorage>,
        tool_host: Arc<dyn ToolHost>,
    ) -> Self {
        Self {
            transport,
            storage,
            tool_host,
            template_registry: None,
            analytics: None,
            config: RuntimeConfig::default(),
            handlers: handler::HandlerRegistry::new(),
        }
    }

    pub fn with_config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_template_registry(mut self, registry: Arc<dyn TemplateRegistry>) -> Self {
        self.template_registry = Some(registry);
        self
    }

    pub fn with_analytics(mut self, analytics: Arc<dyn Analytics>) -> Self {
        self.analytics = Some(analytics);
        self
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Drive one agent invocation to a terminal state.
    ///
    /// Returns `Err` only when starting the run fails or the failure carries
    /// HTTP 402 (the caller must see billing failures); every other error is
    /// folded into an [`AgentOutput::Error`] on a successfully returned
    /// outcome.
    pub async fn run_agent(&self, params: RunParams) -> Result<RunOutcome> {
        self.run_agent_inner(params).await
    }

    pub(crate) fn track(&self, event: &str, properties: serde_json::Value) {
        if let Some(analytics) = &self.analytics {
            analytics.track_event(event, properties);
        }
    }
}

/// Parameters for one agent invocation. `prompt` and `params` apply to the
/// first turn only.
pub struct RunParams {
    pub agent_type: String,
    /// Resolved template; falls back to `local_agent_templates`, then the
    /// injected registry.
    pub template: Option<Arc<AgentTemplate>>,
    pub prompt: Option<String>,
    pub params: Option<serde_json::Value>,
    /// Extra content parts (images, pre-built text) for the first user
    /// message.
    pub content: Option<Vec<crate::types::ContentPart>>,
    /// Existing state to resume from; a fresh state is created otherwise.
    pub agent_state: Option<AgentState>,
    pub local_agent_templates: BTreeMap<String, Arc<AgentTemplate>>,
    pub project: Arc<ProjectFileContext>,
    pub sink: Option<ResponseSink>,
    pub on_cost: Option<CostSink>,
    pub cancel: CancellationToken,
    pub parent_system_prompt: Option<String>,
    pub parent_tools: Option<Vec<ToolDefinition>>,
    pub user_input_id: String,
    /// Overrides the config default when set.
    pub clear_user_prompt_messages_after_response: Option<bool>,
    pub(crate) depth: usize,
}

impl RunParams {
    pub fn new(agent_type: impl Into<String>) -> Self {
        Self {
            agent_type: agent_type.into(),
            template: None,
            prompt: None,
            params: None,
            content: None,
            agent_state: None,
            local_agent_templates: BTreeMap::new(),
            project: Arc::new(ProjectFileContext::default()),
            sink: None,
            on_cost: None,
            cancel: CancellationToken::new(),
            parent_system_prompt: None,
            parent_tools: None,
            user_input_id: uuid::Uuid::new_v4().to_string(),
            clear_user_prompt_messages_after_response: None,
            depth: 0,
        }
    }

    pub fn with_template(mut self, template: Arc<AgentTemplate>) -> Self {
        self.template = Some(template);
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = Some(params);
        self
    }

    pub fn with_content(mut self, content: Vec<crate::types::ContentPart>) -> Self {
        self.content = Some(content);
        self
    }

    pub fn with_state(mut self, state: AgentState) -> Self {
        self.agent_state = Some(state);
        self
    }

    pub fn with_local_templates(
        mut self,
        templates: BTreeMap<String, Arc<AgentTemplate>>,
    ) -> Self {
        self.local_agent_templates = templates;
        self
    }

    pub fn with_project(mut self, project: Arc<ProjectFileContext>) -> Self {
        self.project = project;
        self
    }

    pub fn with_sink(mut self, sink: ResponseSink) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_on_cost(mut self, on_cost: CostSink) -> Self {
        self.on_cost = Some(on_cost);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_user_input_id(mut self, id: impl Into<String>) -> Self {
        self.user_input_id = id.into();
        self
    }

    pub fn keep_user_prompt_messages(mut self) -> Self {
        self.clear_user_prompt_messages_after_response = Some(false);
        self
    }
}

/// Final state and output of an invocation.
#[derive(Debug)]
pub struct RunOutcome {
    pub state: AgentState,
    pub output: AgentOutput,
}

#[cfg(test)]
#[path = "tests/mod.rs"]
mod tests;
