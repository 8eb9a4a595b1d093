//! Message types for agent conversation history.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Conversation role.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// Labels used by history filters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageTag {
    UserPrompt,
    StepPrompt,
    InstructionsPrompt,
    SubagentSpawn,
    SystemNotice,
}

/// When a message expires. `AgentStep` messages are dropped at both the
/// end-of-step and end-of-user-prompt boundaries; `UserPrompt` messages only
/// at the latter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageTtl {
    AgentStep,
    UserPrompt,
}

/// A tool call requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
}

/// One part of a tool's structured output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolOutputPart {
    Text { text: String },
    Json { value: serde_json::Value },
}

impl ToolOutputPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn json(value: serde_json::Value) -> Self {
        Self::Json { value }
    }
}

/// One part of an assistant or user message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    Image { data: String, mime_type: String },
    ToolCall(ToolCall),
}

/// Message body: plain text, ordered parts, or structured tool output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
    ToolOutput(Vec<ToolOutputPart>),
}

/// A message in an agent's conversation history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<MessageTag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_to_live: Option<MessageTtl>,
    #[serde(default)]
    pub keep_during_truncation: bool,
    /// Provider cache marker; cleared during truncation so the transport can
    /// re-apply caching against the shifted history.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

impl Message {
    fn base(role: Role, content: MessageContent) -> Self {
        Self {
            role,
            content,
            tags: BTreeSet::new(),
            time_to_live: None,
            keep_during_truncation: false,
            cache_control: None,
            tool_call_id: None,
            tool_name: None,
        }
    }

    /// Create a plain user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self::base(Role::User, MessageContent::Text(text.into()))
    }

    /// Create a user message whose text is wrapped in a `<system>` marker.
    /// Used for runtime notices that must read as host-injected, not
    /// user-authored.
    pub fn system_tagged_user(text: impl AsRef<str>) -> Self {
        let mut msg = Self::base(
            Role::User,
            MessageContent::Text(format!("<system>{}</system>", text.as_ref())),
        );
        msg.tags.insert(MessageTag::SystemNotice);
        msg
    }

    /// Create a plain assistant message.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::base(Role::Assistant, MessageContent::Text(text.into()))
    }

    /// Create an assistant message from content parts.
    pub fn assistant_parts(parts: Vec<ContentPart>) -> Self {
        Self::base(Role::Assistant, MessageContent::Parts(parts))
    }

    /// Create a tool result message.
    pub fn tool_result(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        output: Vec<ToolOutputPart>,
    ) -> Self {
        let mut msg = Self::base(Role::Tool, MessageContent::ToolOutput(output));
        msg.tool_call_id = Some(tool_call_id.into());
        msg.tool_name = Some(tool_name.into());
        msg
    }

    pub fn with_tag(mut self, tag: MessageTag) -> Self {
        self.tags.insert(tag);
        self
    }

    pub fn with_ttl(mut self, ttl: MessageTtl) -> Self {
        self.time_to_live = Some(ttl);
        self
    }

    pub fn kept(mut self) -> Self {
        self.keep_during_truncation = true;
        self
    }

    pub fn has_tag(&self, tag: MessageTag) -> bool {
        self.tags.contains(&tag)
    }

    /// Concatenated text content.
    pub fn text(&self) -> String {
        match &self.content {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    ContentPart::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(""),
            MessageContent::ToolOutput(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    ToolOutputPart::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(""),
        }
    }

    /// Tool calls carried by this message.
    pub fn tool_calls(&self) -> Vec<&ToolCall> {
        match &self.content {
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    ContentPart::ToolCall(call) => Some(call),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Whether the message carries any content at all.
    pub fn is_empty(&self) -> bool {
        match &self.content {
            MessageContent::Text(text) => text.is_empty(),
            MessageContent::Parts(parts) => parts.is_empty(),
            MessageContent::ToolOutput(parts) => parts.is_empty(),
        }
    }
}
