//! Conversation history store.
//!
//! Owns an agent's message sequence and enforces the history invariants:
//! TTL expiration at step and prompt boundaries, removal of unfinished
//! tool calls when exporting to a spawned child, and token-bounded
//! truncation that never drops kept messages.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::config::RuntimeConfig;
use crate::types::{ContentPart, Message, MessageContent, MessageTtl, Role};

pub mod tokens;
pub mod truncation;

pub use tokens::{
    estimate_history_tokens, estimate_message_tokens, estimate_text_tokens,
    estimate_tool_definition_tokens,
};
pub use truncation::{TERMINAL_COMMAND_TOOL, TRUNCATION_PLACEHOLDER};

/// Ordered, immutable-by-convention conversation history.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct MessageStore {
    messages: Vec<Message>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn extend(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.messages.extend(messages);
    }

    /// Replace the entire history (conversation compaction).
    pub fn replace_all(&mut self, messages: Vec<Message>) {
        self.messages = messages;
    }

    /// Text of the most recent non-empty assistant message.
    pub fn last_assistant_text(&self) -> Option<String> {
        self.messages
            .iter()
            .rev()
            .filter(|m| m.role == Role::Assistant)
            .map(|m| m.text())
            .find(|text| !text.is_empty())
    }

    /// Drop messages whose TTL has reached the given boundary.
    ///
    /// `AgentStep` messages expire at both boundaries; `UserPrompt` messages
    /// only at the `UserPrompt` boundary. Idempotent.
    pub fn expire(&mut self, end_of: MessageTtl) {
        self.messages.retain(|message| match message.time_to_live {
            Some(MessageTtl::AgentStep) => false,
            Some(MessageTtl::UserPrompt) => end_of != MessageTtl::UserPrompt,
            None => true,
        });
    }

    /// History suitable for export to a spawning child: assistant tool-call
    /// parts with no matching tool message are removed, and assistant
    /// messages left empty by that removal are dropped. Some providers
    /// reject histories containing an unanswered tool call.
    pub fn filter_unfinished_tool_calls(&self) -> Vec<Message> {
        let finished: HashSet<&str> = self
            .messages
            .iter()
            .filter(|m| m.role == Role::Tool)
            .filter_map(|m| m.tool_call_id.as_deref())
            .collect();

        let mut out = Vec::with_capacity(self.messages.len());
        for message in &self.messages {
            if message.role != Role::Assistant {
                out.push(message.clone());
                continue;
            }
            let MessageContent::Parts(parts) = &message.content else {
                out.push(message.clone());
                continue;
            };
            let filtered: Vec<ContentPart> = parts
                .iter()
                .filter(|part| match part {
                    ContentPart::ToolCall(call) => finished.contains(call.id.as_str()),
                    _ => true,
                })
                .cloned()
                .collect();
            if filtered.is_empty() {
                continue;
            }
            let mut kept = message.clone();
            kept.content = MessageContent::Parts(filtered);
            out.push(kept);
        }
        out
    }

    /// Remove a just-appended tool-call part whose dispatch was refused, so
    /// history never retains a call that will get no result. The emptied
    /// assistant message is dropped with it.
    pub(crate) fn remove_tool_call_part(&mut self, call_id: &str) {
        let Some(last) = self.messages.last_mut() else {
            return;
        };
        if let MessageContent::Parts(parts) = &mut last.content {
            parts.retain(
                |part| !matches!(part, ContentPart::ToolCall(call) if call.id == call_id),
            );
            if parts.is_empty() {
                self.messages.pop();
            }
        }
    }

    /// Token-bounded truncation; see [`truncation`]. A history that already
    /// fits is returned untouched.
    pub fn trim_to_token_budget(&mut self, system_tokens: usize, config: &RuntimeConfig) -> bool {
        truncation::trim_messages(&mut self.messages, system_tokens, config)
    }
}

impl<'a> IntoIterator for &'a MessageStore {
    type Item = &'a Message;
    type IntoIter = std::slice::Iter<'a, Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.iter()
    }
}
