//! Per-run execution context threaded through the loop's components.

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use tokio_util::sync::CancellationToken;

use crate::contracts::{ProjectFileContext, ToolDefinition};
use crate::tools::registry;
use crate::types::{AgentState, AgentTemplate, ToolOutputPart};

use super::credits::CreditLedger;
use super::events::{ResponseChunk, ResponseSink};

/// Everything one run's components need: the resolved template, assembled
/// system prompt, mutable agent state, sinks, and cancellation. Owned by the
/// agent loop; borrowed mutably down the call stack.
pub(crate) struct RunContext {
    pub(crate) template: Arc<AgentTemplate>,
    pub(crate) run_id: String,
    pub(crate) system_prompt: String,
    pub(crate) state: AgentState,
    pub(crate) sink: ResponseSink,
    pub(crate) cancel: CancellationToken,
    pub(crate) project: Arc<ProjectFileContext>,
    pub(crate) local_templates: Arc<BTreeMap<String, Arc<AgentTemplate>>>,
    pub(crate) depth: usize,
    pub(crate) user_input_id: String,
    pub(crate) ledger: CreditLedger,
    pub(crate) should_end_turn: bool,
    pub(crate) has_retried_output_schema: bool,
    /// Executed steps so far, mirrored into the run's final totals.
    pub(crate) total_steps: u32,
    /// Output of the last handler-yielded tool call, for the next resume.
    pub(crate) pending_tool_result: Option<Vec<ToolOutputPart>>,
    /// Alternative completions from the last `GenerateN` step.
    pub(crate) n_responses: Option<Vec<String>>,
    /// Tool bundle, built once per invocation on first access.
    tool_defs: OnceLock<Vec<ToolDefinition>>,
    parent_tools: Option<Vec<ToolDefinition>>,
}

impl RunContext {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        template: Arc<AgentTemplate>,
        run_id: String,
        system_prompt: String,
        state: AgentState,
        sink: ResponseSink,
        cancel: CancellationToken,
        project: Arc<ProjectFileContext>,
        local_templates: Arc<BTreeMap<String, Arc<AgentTemplate>>>,
        depth: usize,
        user_input_id: String,
        ledger: CreditLedger,
        parent_tools: Option<Vec<ToolDefinition>>,
    ) -> Self {
        Self {
            template,
            run_id,
            system_prompt,
            state,
            sink,
            cancel,
            project,
            local_templates,
            depth,
            user_input_id,
            ledger,
            should_end_turn: false,
            has_retried_output_schema: false,
            total_steps: 0,
            pending_tool_result: None,
            n_responses: None,
            tool_defs: OnceLock::new(),
            parent_tools,
        }
    }

    /// Forward a chunk to the response sink unless the run is cancelled.
    pub(crate) fn emit(&self, chunk: ResponseChunk) {
        if self.cancel.is_cancelled() {
            return;
        }
        (self.sink)(chunk);
    }

    /// The serializable tool bundle: inherited from the parent when the
    /// template asks for it, otherwise built from the registry and project
    /// context.
    pub(crate) fn tools(&self) -> &[ToolDefinition] {
        self.tool_defs.get_or_init(|| {
            if self.template.inherit_parent_system_prompt {
                if let Some(parent_tools) = &self.parent_tools {
                    return parent_tools.clone();
                }
            }
            registry::tool_definitions_for(&self.template, &self.project)
        })
    }

    /// Tool names the inline extractor may treat as call boundaries:
    /// everything in the bundle plus the short ids of spawnable templates
    /// (the agent-as-tool shorthand).
    pub(crate) fn inline_call_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .tools()
            .iter()
            .map(|tool| tool.name.clone())
            .collect();
        for entry in &self.template.spawnable_agents {
            let short = crate::tools::AgentId::parse(entry).id;
            if !names.contains(&short) {
                names.push(short);
            }
        }
        names
    }

    /// Resolve a child template by short id: the caller's local map first,
    /// then the injected registry.
    pub(crate) fn resolve_child_template(
        &self,
        runtime: &super::Runtime,
        agent_type: &str,
    ) -> Option<Arc<AgentTemplate>> {
        if let Some(template) = self.local_templates.get(agent_type) {
            return Some(template.clone());
        }
        runtime
            .template_registry
            .as_ref()
            .and_then(|registry| registry.get_agent_template(agent_type))
    }
}
