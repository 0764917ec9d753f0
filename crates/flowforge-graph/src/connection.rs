use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::node::NodeKind;

/// Node-local handle identifiers.
///
/// A node's kind determines which of these it exposes; the spawner and
/// the connection validator both consult this vocabulary.
pub mod handles {
    /// Generic left-side input port.
    pub const INPUT_MAIN: &str = "input-main";
    /// Generic right-side output port.
    pub const OUTPUT_MAIN: &str = "output-main";
    /// Single top-side port on llm/tool/memory child nodes.
    pub const CONNECTOR_TOP: &str = "connector-top";
    /// Agent bottom ports. Each spawns a different child kind.
    pub const AGENT_LLM: &str = "agent-llm";
    pub const AGENT_TOOL: &str = "agent-tool";
    pub const AGENT_MEMORY: &str = "agent-memory";
}

/// Declared direction of a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleDirection {
    Input,
    Output,
}

/// Direction of a known handle id, `None` for unknown handles.
pub fn handle_direction(handle: &str) -> Option<HandleDirection> {
    match handle {
        handles::INPUT_MAIN | handles::CONNECTOR_TOP => Some(HandleDirection::Input),
        handles::OUTPUT_MAIN
        | handles::AGENT_LLM
        | handles::AGENT_TOOL
        | handles::AGENT_MEMORY => Some(HandleDirection::Output),
        _ => None,
    }
}

/// Legal handle set for a node kind.
pub fn handles_for(kind: NodeKind) -> &'static [&'static str] {
    match kind {
        NodeKind::Trigger => &[handles::OUTPUT_MAIN],
        NodeKind::Agent => &[
            handles::INPUT_MAIN,
            handles::OUTPUT_MAIN,
            handles::AGENT_LLM,
            handles::AGENT_TOOL,
            handles::AGENT_MEMORY,
        ],
        NodeKind::PersonaRouter | NodeKind::Orchestrator => {
            &[handles::INPUT_MAIN, handles::OUTPUT_MAIN]
        }
        NodeKind::Llm | NodeKind::Tool | NodeKind::Memory => &[handles::CONNECTOR_TOP],
        NodeKind::Output => &[handles::INPUT_MAIN],
    }
}

/// Kind of a connection between two handles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionKind {
    #[default]
    Data,
    Control,
    Memory,
}

/// A typed, directed link between two nodes' handles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    /// Unique identifier within the owning workflow.
    pub id: String,
    /// Source node id.
    pub source: String,
    /// Target node id.
    pub target: String,
    pub source_handle: String,
    pub target_handle: String,
    #[serde(default)]
    pub kind: ConnectionKind,
    #[serde(default = "default_data_type")]
    pub data_type: String,
}

fn default_data_type() -> String {
    "any".to_string()
}

impl Connection {
    /// Create a data connection between two main ports with a fresh id.
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self::between(
            source,
            handles::OUTPUT_MAIN,
            target,
            handles::INPUT_MAIN,
        )
    }

    /// Create a data connection between explicit handles with a fresh id.
    pub fn between(
        source: impl Into<String>,
        source_handle: impl Into<String>,
        target: impl Into<String>,
        target_handle: impl Into<String>,
    ) -> Self {
        Self {
            id: format!("conn-{}", Uuid::new_v4()),
            source: source.into(),
            target: target.into(),
            source_handle: source_handle.into(),
            target_handle: target_handle.into(),
            kind: ConnectionKind::Data,
            data_type: default_data_type(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_kind(mut self, kind: ConnectionKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_data_type(mut self, data_type: impl Into<String>) -> Self {
        self.data_type = data_type.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_builders() {
        let c = Connection::new("a", "b").with_kind(ConnectionKind::Memory);
        assert_eq!(c.source, "a");
        assert_eq!(c.target, "b");
        assert_eq!(c.source_handle, handles::OUTPUT_MAIN);
        assert_eq!(c.target_handle, handles::INPUT_MAIN);
        assert_eq!(c.kind, ConnectionKind::Memory);
        assert_eq!(c.data_type, "any");
    }

    #[test]
    fn test_handle_directions() {
        assert_eq!(
            handle_direction(handles::OUTPUT_MAIN),
            Some(HandleDirection::Output)
        );
        assert_eq!(
            handle_direction(handles::AGENT_MEMORY),
            Some(HandleDirection::Output)
        );
        assert_eq!(
            handle_direction(handles::CONNECTOR_TOP),
            Some(HandleDirection::Input)
        );
        assert_eq!(handle_direction("bogus"), None);
    }

    #[test]
    fn test_handle_sets() {
        assert!(handles_for(NodeKind::Agent).contains(&handles::AGENT_LLM));
        assert_eq!(handles_for(NodeKind::Llm), &[handles::CONNECTOR_TOP]);
        assert_eq!(handles_for(NodeKind::Output), &[handles::INPUT_MAIN]);
    }

    #[test]
    fn test_serialization_roundtrip() {
        let c = Connection::between("a", handles::AGENT_MEMORY, "m", handles::CONNECTOR_TOP)
            .with_kind(ConnectionKind::Memory);
        let json = serde_json::to_string(&c).unwrap();
        let parsed: Connection = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, c);
    }
}
