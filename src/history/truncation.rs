//! Token-bounded history truncation and terminal-output simplification.

use crate::config::RuntimeConfig;
use crate::types::{Message, MessageContent, MessageTag, Role, ToolOutputPart};

use super::tokens::{estimate_history_tokens, estimate_message_tokens};

/// Text of the placeholder that replaces each dropped run of messages.
pub const TRUNCATION_PLACEHOLDER: &str = "[previous messages omitted]";

/// Marker appended to terminal outputs that have been simplified.
const SIMPLIFIED_OUTPUT_MARKER: &str = "[output truncated]";

/// Tool whose old outputs are summarized before anything is dropped.
pub const TERMINAL_COMMAND_TOOL: &str = "run_terminal_command";

pub(crate) fn truncation_placeholder() -> Message {
    Message::user(TRUNCATION_PLACEHOLDER)
        .with_tag(MessageTag::SystemNotice)
        .kept()
}

pub(crate) fn is_truncation_placeholder(message: &Message) -> bool {
    message.role == Role::User
        && message.has_tag(MessageTag::SystemNotice)
        && message.text() == TRUNCATION_PLACEHOLDER
}

/// Keep full output for the `kept` most recent terminal commands; replace
/// older ones with a first-line summary.
pub(crate) fn simplify_old_terminal_output(messages: &mut [Message], kept: usize) {
    let mut seen = 0usize;
    for message in messages.iter_mut().rev() {
        if message.role != Role::Tool || message.tool_name.as_deref() != Some(TERMINAL_COMMAND_TOOL)
        {
            continue;
        }
        seen += 1;
        if seen <= kept {
            continue;
        }
        let MessageContent::ToolOutput(parts) = &message.content else {
            continue;
        };
        let full_text = parts
            .iter()
            .filter_map(|part| match part {
                ToolOutputPart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n");
        if full_text.ends_with(SIMPLIFIED_OUTPUT_MARKER) {
            continue;
        }
        let first_line = full_text.lines().next().unwrap_or_default();
        message.content = MessageContent::ToolOutput(vec![ToolOutputPart::text(format!(
            "{first_line}\n{SIMPLIFIED_OUTPUT_MARKER}"
        ))]);
    }
}

/// Newest-to-oldest sweep per the store contract: simplify terminal output,
/// then drop contiguous older non-kept messages until the remainder plus the
/// system prompt fits under the shortened budget, replacing each dropped run
/// with a single placeholder. Returns whether anything was dropped.
pub(crate) fn trim_messages(
    messages: &mut Vec<Message>,
    system_tokens: usize,
    config: &RuntimeConfig,
) -> bool {
    simplify_old_terminal_output(messages, config.terminal_outputs_kept);

    let max = config.max_context_tokens;
    let history_tokens = estimate_history_tokens(messages);
    if system_tokens + history_tokens <= max {
        return false;
    }

    let required: usize = messages
        .iter()
        .filter(|m| m.keep_during_truncation || is_truncation_placeholder(m))
        .map(estimate_message_tokens)
        .sum();
    let available = max.saturating_sub(system_tokens).saturating_sub(required);
    let target = (config.shortened_token_factor * available as f64) as usize + required;

    let mut out: Vec<Message> = Vec::with_capacity(messages.len());
    let mut remaining = history_tokens;
    let mut pending_placeholder = false;
    let mut dropped_any = false;

    for message in messages.drain(..) {
        let cost = estimate_message_tokens(&message);
        let fits = remaining <= target;
        let preserved =
            fits || message.keep_during_truncation || is_truncation_placeholder(&message);
        if preserved {
            if pending_placeholder {
                let last_is_placeholder = out.last().is_some_and(is_truncation_placeholder);
                if !last_is_placeholder && !is_truncation_placeholder(&message) {
                    out.push(truncation_placeholder());
                }
                pending_placeholder = false;
            }
            out.push(message);
        } else {
            remaining -= cost;
            pending_placeholder = true;
            dropped_any = true;
        }
    }
    if pending_placeholder && !out.last().is_some_and(is_truncation_placeholder) {
        out.push(truncation_placeholder());
    }

    if dropped_any {
        // Stale provider cache markers would bind the cache to messages that
        // shifted position; the transport re-applies them after truncation.
        for message in out.iter_mut() {
            message.cache_control = None;
        }
    }

    *messages = out;
    dropped_any
}
