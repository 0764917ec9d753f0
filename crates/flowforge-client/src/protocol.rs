use serde::{Deserialize, Serialize};

use flowforge_core::types::{ExecutionMessage, Role, SessionId};
use flowforge_graph::{Connection, Node, Workflow};

/// One prior turn sent as conversation context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub role: String,
    pub content: String,
}

/// The full serialized graph plus the live input, handed to the
/// execution endpoint for a test run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub nodes: Vec<Node>,
    pub connections: Vec<Connection>,
    pub input: String,
    pub session_id: String,
    #[serde(default)]
    pub conversation_history: Vec<HistoryMessage>,
}

impl ExecuteRequest {
    /// Build a request from a workflow and prior transcript.
    ///
    /// Only user and assistant turns are forwarded as history; system
    /// notes and error entries stay local.
    pub fn from_workflow(
        workflow: &Workflow,
        input: impl Into<String>,
        session_id: &SessionId,
        transcript: &[ExecutionMessage],
    ) -> Self {
        let conversation_history = transcript
            .iter()
            .filter_map(|msg| {
                let role = match msg.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                    Role::System | Role::Error => return None,
                };
                Some(HistoryMessage {
                    role: role.to_string(),
                    content: msg.content.clone(),
                })
            })
            .collect();

        Self {
            nodes: workflow.nodes().to_vec(),
            connections: workflow.connections().to_vec(),
            input: input.into(),
            session_id: session_id.to_string(),
            conversation_history,
        }
    }

    /// Reassemble a workflow from the request's graph shape.
    pub fn to_workflow(&self) -> Workflow {
        let mut workflow = Workflow::new();
        for node in &self.nodes {
            // Ids were unique on the way out; skip anything mangled in transit.
            let _ = workflow.add_node(node.clone());
        }
        for conn in &self.connections {
            let _ = workflow.add_connection(conn.clone());
        }
        workflow
    }
}

/// Routing metadata the endpoint reports when a persona router ran.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowExecution {
    #[serde(default)]
    pub agent_name: Option<String>,
    #[serde(default)]
    pub router_used: bool,
    #[serde(default)]
    pub selected_agent: Option<String>,
    #[serde(default)]
    pub routing_method: Option<String>,
    #[serde(default)]
    pub routing_confidence: Option<f64>,
}

/// Non-streaming response shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteResponse {
    pub response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_execution: Option<WorkflowExecution>,
}

/// One element of the streaming response.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseDelta {
    /// A fragment of assistant content.
    Content(String),
    /// The `[DONE]` completion sentinel.
    Done,
}
