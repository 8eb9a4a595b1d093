//! Runtime tunables.

use serde::{Deserialize, Serialize};

const DEFAULT_MAX_AGENT_STEPS: u32 = 40;
const DEFAULT_MAX_CONTEXT_TOKENS: usize = 160_000;
const DEFAULT_SHORTENED_TOKEN_FACTOR: f64 = 0.75;
const DEFAULT_TERMINAL_OUTPUTS_KEPT: usize = 5;
const DEFAULT_MAX_AGENT_DEPTH: usize = 10;

const MAX_AGENT_STEPS_ENV: &str = "CANOPY_MAX_AGENT_STEPS";
const MAX_CONTEXT_TOKENS_ENV: &str = "CANOPY_MAX_CONTEXT_TOKENS";

/// Configuration for a [`Runtime`](crate::runtime::Runtime).
///
/// Every field has a sensible default; construct with `RuntimeConfig::default()`
/// and override selectively, or call [`RuntimeConfig::from_env`] to let
/// environment variables win over the defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Step budget given to every fresh agent invocation.
    pub max_agent_steps: u32,
    /// Upper bound on prompt tokens (system + history) per request.
    pub max_context_tokens: usize,
    /// Headroom factor applied when truncating history; must be < 1.
    pub shortened_token_factor: f64,
    /// How many recent terminal-command outputs survive simplification.
    pub terminal_outputs_kept: usize,
    /// Maximum depth of the subagent spawn tree.
    pub max_agent_depth: usize,
    /// Drop `user_prompt`-scoped messages once the run returns.
    pub clear_user_prompt_messages_after_response: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_agent_steps: DEFAULT_MAX_AGENT_STEPS,
            max_context_tokens: DEFAULT_MAX_CONTEXT_TOKENS,
            shortened_token_factor: DEFAULT_SHORTENED_TOKEN_FACTOR,
            terminal_outputs_kept: DEFAULT_TERMINAL_OUTPUTS_KEPT,
            max_agent_depth: DEFAULT_MAX_AGENT_DEPTH,
            clear_user_prompt_messages_after_response: true,
        }
    }
}

impl RuntimeConfig {
    /// Defaults, with environment overrides applied where present.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(steps) = parse_env_limit(MAX_AGENT_STEPS_ENV) {
            config.max_agent_steps = steps as u32;
        }
        if let Some(tokens) = parse_env_limit(MAX_CONTEXT_TOKENS_ENV) {
            config.max_context_tokens = tokens;
        }
        config
    }
}

fn parse_env_limit(env_key: &str) -> Option<usize> {
    let value = std::env::var(env_key).ok()?;
    parse_positive_usize(&value)
}

fn parse_positive_usize(value: &str) -> Option<usize> {
    let parsed = value.trim().parse::<usize>().ok()?;
    if parsed == 0 {
        None
    } else {
        Some(parsed)
    }
}
