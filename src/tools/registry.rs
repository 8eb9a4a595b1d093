//! Static registry of native tools.
//!
//! Internal tools execute inside the runtime; every other native tool is
//! schema-validated here and executed by the injected [`ToolHost`]
//! (crate::contracts::ToolHost).

use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::contracts::{ProjectFileContext, ToolDefinition};
use crate::types::AgentTemplate;

pub const END_TURN_TOOL: &str = "end_turn";
pub const TASK_COMPLETED_TOOL: &str = "task_completed";
pub const SET_OUTPUT_TOOL: &str = "set_output";
pub const SPAWN_AGENTS_TOOL: &str = "spawn_agents";
pub const ADD_SUBGOAL_TOOL: &str = "add_subgoal";
pub const UPDATE_SUBGOAL_TOOL: &str = "update_subgoal";
pub const THINK_DEEPLY_TOOL: &str = "think_deeply";

/// Tools whose invocation does not, by itself, prevent the "no work"
/// end-of-turn shortcut.
pub const TOOLS_WHICH_WONT_FORCE_NEXT_STEP: [&str; 6] = [
    END_TURN_TOOL,
    TASK_COMPLETED_TOOL,
    SET_OUTPUT_TOOL,
    ADD_SUBGOAL_TOOL,
    UPDATE_SUBGOAL_TOOL,
    THINK_DEEPLY_TOOL,
];

/// Tools executed inside the runtime, never routed to the host.
const INTERNAL_TOOLS: [&str; 7] = [
    END_TURN_TOOL,
    TASK_COMPLETED_TOOL,
    SET_OUTPUT_TOOL,
    SPAWN_AGENTS_TOOL,
    ADD_SUBGOAL_TOOL,
    UPDATE_SUBGOAL_TOOL,
    THINK_DEEPLY_TOOL,
];

/// A native tool's definition as known to the runtime.
#[derive(Debug, Clone)]
pub struct NativeToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: serde_json::Value,
}

fn native_registry() -> &'static BTreeMap<&'static str, NativeToolSpec> {
    static REGISTRY: OnceLock<BTreeMap<&'static str, NativeToolSpec>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let specs = [
            NativeToolSpec {
                name: END_TURN_TOOL,
                description: "End the current turn and hand control back to the caller.",
                parameters: serde_json::json!({"type": "object", "properties": {}}),
            },
            NativeToolSpec {
                name: TASK_COMPLETED_TOOL,
                description: "Declare the requested task complete and end the turn.",
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "summary": {"type": "string"}
                    }
                }),
            },
            NativeToolSpec {
                name: SET_OUTPUT_TOOL,
                description: "Set the agent's structured output value.",
                parameters: serde_json::json!({"type": "object"}),
            },
            NativeToolSpec {
                name: SPAWN_AGENTS_TOOL,
                description: "Spawn one or more child agents and wait for their results.",
                parameters: serde_json::json!({
                    "type": "object",
                    "required": ["agents"],
                    "properties": {
                        "agents": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "required": ["agent_type"],
                                "properties": {
                                    "agent_type": {"type": "string"},
                                    "prompt": {"type": "string"},
                                    "params": {"type": "object"}
                                }
                            }
                        }
                    }
                }),
            },
            NativeToolSpec {
                name: ADD_SUBGOAL_TOOL,
                description: "Record a new subgoal in the agent's working context.",
                parameters: serde_json::json!({
                    "type": "object",
                    "required": ["id", "objective"],
                    "properties": {
                        "id": {"type": "string"},
                        "objective": {"type": "string"},
                        "plan": {"type": "string"}
                    }
                }),
            },
            NativeToolSpec {
                name: UPDATE_SUBGOAL_TOOL,
                description: "Update the status, plan, or log of an existing subgoal.",
                parameters: serde_json::json!({
                    "type": "object",
                    "required": ["id"],
                    "properties": {
                        "id": {"type": "string"},
                        "status": {"type": "string"},
                        "plan": {"type": "string"},
                        "log": {"type": "string"}
                    }
                }),
            },
            NativeToolSpec {
                name: THINK_DEEPLY_TOOL,
                description: "Think through a hard problem before acting.",
                parameters: serde_json::json!({
                    "type": "object",
                    "required": ["thought"],
                    "properties": {
                        "thought": {"type": "string"}
                    }
                }),
            },
            NativeToolSpec {
                name: crate::history::TERMINAL_COMMAND_TOOL,
                description: "Run a command in the project's terminal.",
                parameters: serde_json::json!({
                    "type": "object",
                    "required": ["command"],
                    "properties": {
                        "command": {"type": "string"},
                        "cwd": {"type": "string"},
                        "timeout_seconds": {"type": "integer"}
                    }
                }),
            },
            NativeToolSpec {
                name: "read_files",
                description: "Read one or more files from the project.",
                parameters: serde_json::json!({
                    "type": "object",
                    "required": ["paths"],
                    "properties": {
                        "paths": {"type": "array", "items": {"type": "string"}}
                    }
                }),
            },
            NativeToolSpec {
                name: "write_file",
                description: "Create or overwrite a file in the project.",
                parameters: serde_json::json!({
                    "type": "object",
                    "required": ["path", "content"],
                    "properties": {
                        "path": {"type": "string"},
                        "content": {"type": "string"}
                    }
                }),
            },
            NativeToolSpec {
                name: "str_replace",
                description: "Replace an exact string in a file.",
                parameters: serde_json::json!({
                    "type": "object",
                    "required": ["path", "old_str", "new_str"],
                    "properties": {
                        "path": {"type": "string"},
                        "old_str": {"type": "string"},
                        "new_str": {"type": "string"}
                    }
                }),
            },
            NativeToolSpec {
                name: "code_search",
                description: "Search the project for a pattern.",
                parameters: serde_json::json!({
                    "type": "object",
                    "required": ["pattern"],
                    "properties": {
                        "pattern": {"type": "string"},
                        "glob": {"type": "string"}
                    }
                }),
            },
            NativeToolSpec {
                name: "web_search",
                description: "Search the web.",
                parameters: serde_json::json!({
                    "type": "object",
                    "required": ["query"],
                    "properties": {
                        "query": {"type": "string"}
                    }
                }),
            },
        ];
        specs.into_iter().map(|spec| (spec.name, spec)).collect()
    })
}

/// Look up a native tool by name.
pub fn native_tool(name: &str) -> Option<&'static NativeToolSpec> {
    native_registry().get(name)
}

/// Whether the tool executes inside the runtime.
pub fn is_internal_tool(name: &str) -> bool {
    INTERNAL_TOOLS.contains(&name)
}

/// Whether the tool belongs to the soft set that never forces another step.
pub fn wont_force_next_step(name: &str) -> bool {
    TOOLS_WHICH_WONT_FORCE_NEXT_STEP.contains(&name)
}

/// Serializable tool bundle for a template: declared native tools, the
/// implicit `set_output` when an output schema is present, project custom
/// tools, and nothing else.
pub fn tool_definitions_for(
    template: &AgentTemplate,
    project: &ProjectFileContext,
) -> Vec<ToolDefinition> {
    let mut definitions = Vec::new();
    for name in &template.tool_names {
        if let Some(spec) = native_tool(name) {
            definitions.push(ToolDefinition {
                name: spec.name.to_string(),
                description: spec.description.to_string(),
                parameters: spec.parameters.clone(),
            });
        } else if let Some(custom) = project.custom_tool(name) {
            definitions.push(ToolDefinition {
                name: custom.name.clone(),
                description: custom.description.clone(),
                parameters: custom.input_schema.clone(),
            });
        }
    }
    if template.output_schema.is_some() && !template.has_tool(SET_OUTPUT_TOOL) {
        let spec = native_tool(SET_OUTPUT_TOOL).expect("set_output is registered");
        definitions.push(ToolDefinition {
            name: spec.name.to_string(),
            description: spec.description.to_string(),
            parameters: template
                .output_schema
                .clone()
                .unwrap_or_else(|| spec.parameters.clone()),
        });
    }
    definitions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_tools_are_all_registered() {
        for name in INTERNAL_TOOLS {
            assert!(native_tool(name).is_some(), "{name} missing from registry");
        }
    }

    #[test]
    fn soft_set_excludes_working_tools() {
        assert!(wont_force_next_step(THINK_DEEPLY_TOOL));
        assert!(!wont_force_next_step("read_files"));
        assert!(!wont_force_next_step(crate::history::TERMINAL_COMMAND_TOOL));
        assert!(!wont_force_next_step(SPAWN_AGENTS_TOOL));
    }

    #[test]
    fn output_schema_implies_set_output_definition() {
        let template = crate::types::AgentTemplate::new("extractor", "sonnet-4")
            .with_tools(["read_files"])
            .with_output_schema(serde_json::json!({
                "type": "object",
                "required": ["answer"],
                "properties": {"answer": {"type": "string"}}
            }));
        let defs = tool_definitions_for(&template, &ProjectFileContext::default());
        assert!(defs.iter().any(|d| d.name == SET_OUTPUT_TOOL));
        let set_output = defs.iter().find(|d| d.name == SET_OUTPUT_TOOL).unwrap();
        assert_eq!(set_output.parameters["required"][0], "answer");
    }

    #[test]
    fn custom_tools_come_from_project_context() {
        let template = crate::types::AgentTemplate::new("helper", "sonnet-4")
            .with_tools(["deploy_preview"]);
        let mut project = ProjectFileContext::default();
        project.custom_tools.push(crate::contracts::CustomToolDefinition {
            name: "deploy_preview".to_string(),
            description: "Deploy a preview environment.".to_string(),
            input_schema: serde_json::json!({"type": "object"}),
        });
        let defs = tool_definitions_for(&template, &project);
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "deploy_preview");
    }
}
