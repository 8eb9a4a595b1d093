//! Native tool registry, input validation, and spawn permissions.

pub mod permissions;
pub mod registry;
pub mod validation;

pub use permissions::{can_spawn, is_base_agent, AgentId, BASE_AGENTS};
pub use registry::{
    is_internal_tool, native_tool, tool_definitions_for, wont_force_next_step, NativeToolSpec,
    ADD_SUBGOAL_TOOL, END_TURN_TOOL, SET_OUTPUT_TOOL, SPAWN_AGENTS_TOOL, TASK_COMPLETED_TOOL,
    THINK_DEEPLY_TOOL, TOOLS_WHICH_WONT_FORCE_NEXT_STEP, UPDATE_SUBGOAL_TOOL,
};
pub use validation::validate_arguments;
