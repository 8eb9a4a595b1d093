//! Spawn permission rules.

use crate::types::AgentTemplate;

/// Templates that may spawn any child without explicit permission.
pub const BASE_AGENTS: [&str; 4] = ["base", "base-lite", "base-max", "base-experimental"];

/// A parsed `publisher/id@version` agent identifier. Absent halves act as
/// wildcards on the side that omits them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentId {
    pub publisher: Option<String>,
    pub id: String,
    pub version: Option<String>,
}

impl AgentId {
    /// Parse `id`, `publisher/id`, `id@version`, or `publisher/id@version`.
    pub fn parse(raw: &str) -> Self {
        let (publisher, rest) = match raw.split_once('/') {
            Some((publisher, rest)) if !publisher.is_empty() => {
                (Some(publisher.to_string()), rest)
            }
            _ => (None, raw),
        };
        let (id, version) = match rest.split_once('@') {
            Some((id, version)) if !version.is_empty() => (id, Some(version.to_string())),
            _ => (rest, None),
        };
        Self {
            publisher,
            id: id.to_string(),
            version,
        }
    }
}

/// Compatible-id rule: equality on `(publisher, id, version)`, with publisher
/// and/or version treated as wildcards iff they are absent on the child.
pub fn ids_compatible(entry: &AgentId, child: &AgentId) -> bool {
    if entry.id != child.id {
        return false;
    }
    if child.publisher.is_some() && child.publisher != entry.publisher {
        return false;
    }
    if child.version.is_some() && child.version != entry.version {
        return false;
    }
    true
}

pub fn is_base_agent(template_id: &str) -> bool {
    BASE_AGENTS.contains(&template_id)
}

/// Whether `parent` may spawn the child identified by `child_full_id`.
pub fn can_spawn(parent: &AgentTemplate, child_full_id: &str) -> bool {
    if is_base_agent(&parent.id) {
        return true;
    }
    let child = AgentId::parse(child_full_id);
    parent
        .spawnable_agents
        .iter()
        .any(|entry| ids_compatible(&AgentId::parse(entry), &child))
}
