use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use flowforge_core::error::{FlowforgeError, Result};
use flowforge_core::types::ExecutionLogEntry;
use flowforge_graph::{Node, NodeData, NodeKind, Workflow};

/// Check that a workflow is executable at all.
///
/// An empty workflow, or one lacking both an agent node and an LLM
/// node, fails with `WorkflowNotExecutable` before any traversal or
/// backend call happens.
pub fn validate(workflow: &Workflow) -> Result<()> {
    if workflow.is_empty() {
        return Err(FlowforgeError::WorkflowNotExecutable(
            "Workflow has no nodes".to_string(),
        ));
    }
    if !workflow.contains_kind(NodeKind::Agent) && !workflow.contains_kind(NodeKind::Llm) {
        return Err(FlowforgeError::WorkflowNotExecutable(
            "Workflow needs at least an agent or an LLM node".to_string(),
        ));
    }
    Ok(())
}

/// Simulated execution pass over the workflow graph.
///
/// The walk is a strictly sequential breadth-first traversal with a
/// visited set, so cycles and diamond fan-ins process each node at most
/// once per run. A cooperative yield sits between node steps; the
/// cancellation token is observed between iterations only.
pub struct TraversalEngine {
    cancel: CancellationToken,
    step_delay: Duration,
}

impl Default for TraversalEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TraversalEngine {
    pub fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            step_delay: Duration::ZERO,
        }
    }

    /// Artificial delay between node steps, for observable progress.
    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }

    /// Get a cancellation token for this engine.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Walk the graph from its trigger node, producing one trace entry
    /// per visited node in visit order.
    pub async fn simulate(&self, workflow: &Workflow) -> Result<Vec<ExecutionLogEntry>> {
        validate(workflow)?;

        let mut trace = Vec::new();

        let start = match workflow.first_of_kind(NodeKind::Trigger) {
            Some(node) => node,
            None => {
                // Deterministic fallback: first node in stored order.
                let first = &workflow.nodes()[0];
                warn!(node_id = %first.id, "No trigger node, starting from first node");
                trace.push(
                    ExecutionLogEntry::warning(format!(
                        "No trigger node found, starting from '{}'",
                        first.label
                    ))
                    .for_node(first.id.clone()),
                );
                first
            }
        };

        let mut queue: VecDeque<String> = VecDeque::new();
        let mut visited: HashSet<String> = HashSet::new();
        queue.push_back(start.id.clone());

        while let Some(node_id) = queue.pop_front() {
            if self.cancel.is_cancelled() {
                warn!("Simulation cancelled");
                trace.push(ExecutionLogEntry::warning(
                    "Simulation cancelled before completion",
                ));
                break;
            }

            // Re-entry guard: the graph may contain cycles or diamonds.
            if !visited.insert(node_id.clone()) {
                continue;
            }

            let Some(node) = workflow.node(&node_id) else {
                continue;
            };

            debug!(node_id = %node.id, kind = %node.kind(), "Simulating node");
            trace.push(describe_node(node).for_node(node.id.clone()));

            for conn in workflow.outgoing(&node_id) {
                if !visited.contains(&conn.target) {
                    queue.push_back(conn.target.clone());
                }
            }

            // Cooperative suspension point between node steps.
            tokio::task::yield_now().await;
            if !self.step_delay.is_zero() {
                tokio::time::sleep(self.step_delay).await;
            }
        }

        info!(visited = visited.len(), "Simulation complete");
        Ok(trace)
    }
}

/// One trace entry describing a node's simulated processing.
fn describe_node(node: &Node) -> ExecutionLogEntry {
    let label = &node.label;
    let message = match &node.data {
        NodeData::Trigger(data) => {
            format!("Trigger '{}' fired ({:?})", label, data.trigger_type)
        }
        NodeData::Agent(data) => {
            format!("Agent '{}' ({}) processing input", label, data.name)
        }
        NodeData::PersonaRouter(data) => format!(
            "Persona router '{}' selecting among {} mapped personas ({:?}, threshold {})",
            label,
            data.agent_intent_mappings.len(),
            data.intents.method,
            data.intents.confidence_threshold,
        ),
        NodeData::Llm(data) => match data.temperature {
            Some(temp) => format!(
                "LLM '{}' calling {}/{} (temperature {})",
                label, data.provider, data.model, temp
            ),
            None => format!("LLM '{}' calling {}/{}", label, data.provider, data.model),
        },
        NodeData::Tool(data) => {
            if data.enabled {
                format!("Tool '{}' invoking {} ({})", label, data.name, data.tool_type)
            } else {
                format!("Tool '{}' skipped (disabled)", label)
            }
        }
        NodeData::Memory(data) => format!(
            "Memory '{}' storing and retrieving context ({:?})",
            label, data.memory_type
        ),
        NodeData::Orchestrator(data) => {
            format!("Orchestrator '{}' dispatching ({})", label, data.routing)
        }
        NodeData::Output(data) => format!(
            "Output '{}' formatting response as {} for {}",
            label, data.format, data.destination
        ),
    };
    ExecutionLogEntry::info(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowforge_graph::Connection;

    fn chain_workflow() -> Workflow {
        let mut wf = Workflow::new();
        wf.add_node(Node::new("t", NodeKind::Trigger)).unwrap();
        wf.add_node(Node::new("a", NodeKind::Agent)).unwrap();
        wf.add_node(Node::new("l", NodeKind::Llm)).unwrap();
        wf.add_node(Node::new("o", NodeKind::Output)).unwrap();
        wf.add_connection(Connection::new("t", "a")).unwrap();
        wf.add_connection(Connection::new("a", "l")).unwrap();
        wf.add_connection(Connection::new("l", "o")).unwrap();
        wf
    }

    #[tokio::test]
    async fn test_chain_produces_one_entry_per_node_in_order() {
        let engine = TraversalEngine::new();
        let trace = engine.simulate(&chain_workflow()).await.unwrap();
        assert_eq!(trace.len(), 4);
        let node_ids: Vec<&str> = trace
            .iter()
            .map(|e| e.node_id.as_deref().unwrap())
            .collect();
        assert_eq!(node_ids, vec!["t", "a", "l", "o"]);
    }

    #[tokio::test]
    async fn test_empty_workflow_fails_validation_with_no_entries() {
        let engine = TraversalEngine::new();
        let err = engine.simulate(&Workflow::new()).await.unwrap_err();
        assert!(matches!(err, FlowforgeError::WorkflowNotExecutable(_)));
    }

    #[tokio::test]
    async fn test_workflow_without_agent_or_llm_not_executable() {
        let mut wf = Workflow::new();
        wf.add_node(Node::new("t", NodeKind::Trigger)).unwrap();
        wf.add_node(Node::new("o", NodeKind::Output)).unwrap();
        let err = TraversalEngine::new().simulate(&wf).await.unwrap_err();
        assert!(matches!(err, FlowforgeError::WorkflowNotExecutable(_)));
    }

    #[tokio::test]
    async fn test_cycle_visits_each_node_once() {
        let mut wf = Workflow::new();
        wf.add_node(Node::new("t", NodeKind::Trigger)).unwrap();
        wf.add_node(Node::new("a", NodeKind::Agent)).unwrap();
        wf.add_node(Node::new("b", NodeKind::Llm)).unwrap();
        wf.add_connection(Connection::new("t", "a")).unwrap();
        wf.add_connection(Connection::new("a", "b")).unwrap();
        wf.add_connection(Connection::new("b", "a")).unwrap();

        let trace = TraversalEngine::new().simulate(&wf).await.unwrap();
        assert_eq!(trace.len(), 3);
    }

    #[tokio::test]
    async fn test_diamond_fan_in_visits_join_once() {
        let mut wf = Workflow::new();
        wf.add_node(Node::new("t", NodeKind::Trigger)).unwrap();
        wf.add_node(Node::new("a", NodeKind::Agent)).unwrap();
        wf.add_node(Node::new("b", NodeKind::Agent)).unwrap();
        wf.add_node(Node::new("join", NodeKind::Llm)).unwrap();
        wf.add_connection(Connection::new("t", "a")).unwrap();
        wf.add_connection(Connection::new("t", "b")).unwrap();
        wf.add_connection(Connection::new("a", "join")).unwrap();
        wf.add_connection(Connection::new("b", "join")).unwrap();

        let trace = TraversalEngine::new().simulate(&wf).await.unwrap();
        assert_eq!(trace.len(), 4);
        let joins = trace
            .iter()
            .filter(|e| e.node_id.as_deref() == Some("join"))
            .count();
        assert_eq!(joins, 1);
    }

    #[tokio::test]
    async fn test_missing_trigger_falls_back_to_first_node_with_warning() {
        let mut wf = Workflow::new();
        wf.add_node(Node::new("a", NodeKind::Agent)).unwrap();
        wf.add_node(Node::new("l", NodeKind::Llm)).unwrap();
        wf.add_connection(Connection::new("a", "l")).unwrap();

        let trace = TraversalEngine::new().simulate(&wf).await.unwrap();
        assert_eq!(trace.len(), 3);
        assert_eq!(trace[0].level, flowforge_core::types::LogLevel::Warning);
        assert_eq!(trace[0].node_id.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_unreachable_nodes_are_not_visited() {
        let mut wf = chain_workflow();
        wf.add_node(Node::new("island", NodeKind::Tool)).unwrap();
        let trace = TraversalEngine::new().simulate(&wf).await.unwrap();
        assert_eq!(trace.len(), 4);
    }

    #[tokio::test]
    async fn test_pre_cancelled_engine_stops_immediately() {
        let engine = TraversalEngine::new();
        engine.cancel_token().cancel();
        let trace = engine.simulate(&chain_workflow()).await.unwrap();
        assert_eq!(trace.len(), 1);
        assert_eq!(trace[0].level, flowforge_core::types::LogLevel::Warning);
        assert!(trace[0].message.contains("cancelled"));
    }

    #[tokio::test]
    async fn test_llm_entry_carries_model_detail() {
        let trace = TraversalEngine::new()
            .simulate(&chain_workflow())
            .await
            .unwrap();
        let llm_entry = trace
            .iter()
            .find(|e| e.node_id.as_deref() == Some("l"))
            .unwrap();
        assert!(llm_entry.message.contains("gpt-4o"));
        assert!(llm_entry.message.contains("temperature"));
    }
}
