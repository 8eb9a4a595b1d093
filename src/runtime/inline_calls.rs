//! Incremental extraction of XML-tagged tool calls from assistant text.
//!
//! Some models emit tool calls inline as `<tool_name>` blocks with
//! `<param>value</param>` children instead of native structured parts. The
//! parser is incremental: tags may split across stream chunks, so text is
//! held back only while it could still become a registered tool tag.
//! Unregistered tags (including the `<system>` wrapper) pass through as
//! plain text.

use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum InlineEvent {
    Text(String),
    Call {
        name: String,
        input: serde_json::Value,
    },
}

struct ActiveCall {
    name: String,
}

pub(crate) struct InlineCallParser {
    known: BTreeSet<String>,
    pending: String,
    active: Option<ActiveCall>,
}

impl InlineCallParser {
    pub(crate) fn new(known: impl IntoIterator<Item = String>) -> Self {
        Self {
            known: known.into_iter().collect(),
            pending: String::new(),
            active: None,
        }
    }

    /// Feed one chunk of assistant text; returns the events that became
    /// unambiguous.
    pub(crate) fn push(&mut self, chunk: &str) -> Vec<InlineEvent> {
        self.pending.push_str(chunk);
        let mut events = Vec::new();

        loop {
            if let Some(active) = &self.active {
                let close = format!("</{}>", active.name);
                let Some(pos) = self.pending.find(&close) else {
                    break;
                };
                let body = self.pending[..pos].to_string();
                self.pending.drain(..pos + close.len());
                let name = self.active.take().expect("active call present").name;
                events.push(InlineEvent::Call {
                    name,
                    input: parse_params(&body),
                });
                continue;
            }

            let Some(lt) = self.pending.find('<') else {
                if !self.pending.is_empty() {
                    events.push(InlineEvent::Text(std::mem::take(&mut self.pending)));
                }
                break;
            };
            if lt > 0 {
                let text: String = self.pending.drain(..lt).collect();
                events.push(InlineEvent::Text(text));
            }

            match self.pending.find('>') {
                Some(gt) => {
                    let name = &self.pending[1..gt];
                    if self.known.contains(name) {
                        let name = name.to_string();
                        self.pending.drain(..gt + 1);
                        self.active = Some(ActiveCall { name });
                    } else {
                        let literal: String = self.pending.drain(..gt + 1).collect();
                        events.push(InlineEvent::Text(literal));
                    }
                }
                None => {
                    let partial = &self.pending[1..];
                    let could_open_known_tag = partial.chars().all(is_tag_char)
                        && self.known.iter().any(|name| name.starts_with(partial));
                    if could_open_known_tag {
                        break;
                    }
                    let lone: String = self.pending.drain(..1).collect();
                    events.push(InlineEvent::Text(lone));
                }
            }
        }

        events
    }

    /// Flush whatever is still buffered as text. An unclosed call is not a
    /// call; its raw text is restored.
    pub(crate) fn finish(&mut self) -> Vec<InlineEvent> {
        let mut events = Vec::new();
        if let Some(active) = self.active.take() {
            let raw = format!("<{}>{}", active.name, self.pending);
            self.pending.clear();
            if !raw.is_empty() {
                events.push(InlineEvent::Text(raw));
            }
            return events;
        }
        if !self.pending.is_empty() {
            events.push(InlineEvent::Text(std::mem::take(&mut self.pending)));
        }
        events
    }
}

fn is_tag_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '/')
}

/// Parse `<key>value</key>` children into a JSON object. Values that parse
/// as JSON keep their type; everything else is a string.
fn parse_params(body: &str) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    let mut rest = body;
    while let Some(lt) = rest.find('<') {
        let after = &rest[lt + 1..];
        let Some(gt) = after.find('>') else { break };
        let key = &after[..gt];
        if key.is_empty() || !key.chars().all(is_tag_char) {
            rest = &after[gt + 1..];
            continue;
        }
        let value_start = &after[gt + 1..];
        let close = format!("</{key}>");
        let Some(end) = value_start.find(&close) else {
            rest = value_start;
            continue;
        };
        let raw = value_start[..end].trim();
        map.insert(key.to_string(), parse_scalar(raw));
        rest = &value_start[end + close.len()..];
    }
    serde_json::Value::Object(map)
}

fn parse_scalar(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}
