//! Agent templates: the declarative description of an agent "type".

use std::fmt;

use crate::runtime::handler::StepHandlerFactory;

/// Separate JSON-Schema validators for the `prompt` and `params` halves of an
/// agent's input.
#[derive(Debug, Clone, Default)]
pub struct InputSchema {
    pub prompt: Option<serde_json::Value>,
    pub params: Option<serde_json::Value>,
}

/// Immutable description of an agent type.
///
/// Templates are resolved once at run start and shared by `Arc` for the
/// lifetime of the run. Build with [`AgentTemplate::new`] and the `with_*`
/// methods.
#[derive(Clone)]
pub struct AgentTemplate {
    /// Stable short identifier, e.g. `"file-explorer"`.
    pub id: String,
    pub publisher: Option<String>,
    pub version: Option<String>,
    pub display_name: String,
    /// Model name handed verbatim to the transport.
    pub model: String,
    pub system_prompt: String,
    pub instructions_prompt: Option<String>,
    /// Per-step prompt template; `{steps_remaining}` is substituted.
    pub step_prompt: Option<String>,
    /// Names of tools this agent may call.
    pub tool_names: Vec<String>,
    /// Fully-qualified ids of templates this agent may spawn.
    pub spawnable_agents: Vec<String>,
    pub input_schema: Option<InputSchema>,
    pub output_schema: Option<serde_json::Value>,
    pub inherit_parent_system_prompt: bool,
    pub include_message_history: bool,
    /// Programmatic step handler factory, if this agent interleaves
    /// deterministic code with LLM turns.
    pub handle_steps: Option<StepHandlerFactory>,
}

impl AgentTemplate {
    pub fn new(id: impl Into<String>, model: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            id,
            publisher: None,
            version: None,
            model: model.into(),
            system_prompt: String::new(),
            instructions_prompt: None,
            step_prompt: None,
            tool_names: Vec::new(),
            spawnable_agents: Vec::new(),
            input_schema: None,
            output_schema: None,
            inherit_parent_system_prompt: false,
            include_message_history: false,
            handle_steps: None,
        }
    }

    pub fn with_publisher(mut self, publisher: impl Into<String>) -> Self {
        self.publisher = Some(publisher.into());
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_instructions_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.instructions_prompt = Some(prompt.into());
        self
    }

    pub fn with_step_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.step_prompt = Some(prompt.into());
        self
    }

    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tool_names = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_spawnable_agents<I, S>(mut self, agents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.spawnable_agents = agents.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_input_schema(mut self, schema: InputSchema) -> Self {
        self.input_schema = Some(schema);
        self
    }

    pub fn with_output_schema(mut self, schema: serde_json::Value) -> Self {
        self.output_schema = Some(schema);
        self
    }

    pub fn inheriting_parent_system_prompt(mut self) -> Self {
        self.inherit_parent_system_prompt = true;
        self
    }

    pub fn including_message_history(mut self) -> Self {
        self.include_message_history = true;
        self
    }

    pub fn with_step_handler(mut self, factory: StepHandlerFactory) -> Self {
        self.handle_steps = Some(factory);
        self
    }

    /// Fully-qualified id: `publisher/id@version` with absent halves omitted.
    pub fn full_id(&self) -> String {
        let mut full = String::new();
        if let Some(publisher) = &self.publisher {
            full.push_str(publisher);
            full.push('/');
        }
        full.push_str(&self.id);
        if let Some(version) = &self.version {
            full.push('@');
            full.push_str(version);
        }
        full
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tool_names.iter().any(|tool| tool == name)
    }
}

impl fmt::Debug for AgentTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentTemplate")
            .field("id", &self.id)
            .field("publisher", &self.publisher)
            .field("version", &self.version)
            .field("model", &self.model)
            .field("tool_names", &self.tool_names)
            .field("spawnable_agents", &self.spawnable_agents)
            .field("inherit_parent_system_prompt", &self.inherit_parent_system_prompt)
            .field("include_message_history", &self.include_message_history)
            .field("has_step_handler", &self.handle_steps.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_id_omits_absent_halves() {
        let bare = AgentTemplate::new("reviewer", "sonnet-4");
        assert_eq!(bare.full_id(), "reviewer");

        let qualified = AgentTemplate::new("reviewer", "sonnet-4")
            .with_publisher("acme")
            .with_version("1.2.0");
        assert_eq!(qualified.full_id(), "acme/reviewer@1.2.0");
    }

    #[test]
    fn builder_collects_tools_and_spawnables() {
        let template = AgentTemplate::new("lead", "opus-4")
            .with_tools(["read_files", "spawn_agents"])
            .with_spawnable_agents(["acme/reviewer@1.2.0"]);
        assert!(template.has_tool("spawn_agents"));
        assert!(!template.has_tool("write_file"));
        assert_eq!(template.spawnable_agents.len(), 1);
    }
}
