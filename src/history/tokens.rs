//! Local token estimation, used for truncation decisions and as the
//! fallback when the transport's token-count contract fails.

use crate::contracts::ToolDefinition;
use crate::types::{ContentPart, Message, MessageContent, ToolOutputPart};

/// Rough chars/4 heuristic; deliberately cheap, never provider-exact.
pub fn estimate_text_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    text.chars().count().div_ceil(4)
}

/// Per-message estimate including role/formatting overhead.
pub fn estimate_message_tokens(message: &Message) -> usize {
    let mut tokens = 4usize;
    match &message.content {
        MessageContent::Text(text) => tokens += estimate_text_tokens(text),
        MessageContent::Parts(parts) => {
            for part in parts {
                tokens += match part {
                    ContentPart::Text { text } => estimate_text_tokens(text),
                    ContentPart::Image { data, .. } => estimate_text_tokens(data) + 8,
                    ContentPart::ToolCall(call) => {
                        let input = serde_json::to_string(&call.input).unwrap_or_default();
                        estimate_text_tokens(&call.name) + estimate_text_tokens(&input) + 8
                    }
                };
            }
        }
        MessageContent::ToolOutput(parts) => {
            for part in parts {
                tokens += match part {
                    ToolOutputPart::Text { text } => estimate_text_tokens(text),
                    ToolOutputPart::Json { value } => {
                        let payload = serde_json::to_string(value).unwrap_or_default();
                        estimate_text_tokens(&payload)
                    }
                } + 8;
            }
        }
    }
    if let Some(name) = &message.tool_name {
        tokens += estimate_text_tokens(name);
    }
    tokens
}

pub fn estimate_history_tokens(messages: &[Message]) -> usize {
    messages.iter().map(estimate_message_tokens).sum()
}

/// Estimate of the serialized tool bundle handed to the model.
pub fn estimate_tool_definition_tokens(tools: &[ToolDefinition]) -> usize {
    let serialized = serde_json::to_string(tools).unwrap_or_default();
    estimate_text_tokens(&serialized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ToolCall;

    #[test]
    fn empty_text_costs_nothing() {
        assert_eq!(estimate_text_tokens(""), 0);
    }

    #[test]
    fn four_chars_per_token_rounds_up() {
        assert_eq!(estimate_text_tokens("abcde"), 2);
        assert_eq!(estimate_text_tokens("abcd"), 1);
    }

    #[test]
    fn tool_call_parts_cost_more_than_bare_text() {
        let plain = Message::assistant("do it");
        let with_call = Message::assistant_parts(vec![ContentPart::ToolCall(ToolCall {
            id: "call-1".to_string(),
            name: "run_terminal_command".to_string(),
            input: serde_json::json!({"command": "cargo test"}),
        })]);
        assert!(estimate_message_tokens(&with_call) > estimate_message_tokens(&plain));
    }
}
