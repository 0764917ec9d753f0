use tracing::debug;

use flowforge_core::error::{FlowforgeError, Result};
use flowforge_graph::{NodeData, NodeKind, PersonaMapping, Workflow};

/// Recompute the persona table for a router node from its outgoing
/// connections.
///
/// Entries exist only for agent nodes currently reachable by an outgoing
/// connection, in connection order. Existing entries are carried over
/// unchanged; newly connected agents get empty defaults; entries for
/// disconnected agents are dropped.
pub fn recompute_mappings(
    workflow: &Workflow,
    router_id: &str,
    existing: &[PersonaMapping],
) -> Vec<PersonaMapping> {
    let mut mappings = Vec::new();
    for conn in workflow.outgoing(router_id) {
        let Some(target) = workflow.node(&conn.target) else {
            continue;
        };
        if target.kind() != NodeKind::Agent {
            continue;
        }
        if mappings
            .iter()
            .any(|m: &PersonaMapping| m.agent_id == target.id)
        {
            continue;
        }
        match existing.iter().find(|m| m.agent_id == target.id) {
            Some(kept) => mappings.push(kept.clone()),
            None => mappings.push(PersonaMapping::empty(target.id.clone())),
        }
    }
    mappings
}

/// Recompute a router's persona table in place.
///
/// Called whenever a connection to or from the router node changes —
/// an explicit step, not a polling reaction.
pub fn refresh_router_mappings(workflow: &mut Workflow, router_id: &str) -> Result<()> {
    let existing = match workflow.node(router_id).map(|n| &n.data) {
        Some(NodeData::PersonaRouter(data)) => data.agent_intent_mappings.clone(),
        Some(_) => {
            return Err(FlowforgeError::Routing(format!(
                "Node '{}' is not a persona router",
                router_id
            )))
        }
        None => return Err(FlowforgeError::NodeNotFound(router_id.to_string())),
    };

    let recomputed = recompute_mappings(workflow, router_id, &existing);
    debug!(
        router_id = %router_id,
        personas = recomputed.len(),
        "Recomputed persona mappings"
    );

    if let Some(node) = workflow.node_mut(router_id) {
        if let NodeData::PersonaRouter(ref mut data) = node.data {
            data.agent_intent_mappings = recomputed;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowforge_graph::{Connection, Node};

    fn router_workflow() -> Workflow {
        let mut wf = Workflow::new();
        wf.add_node(Node::new("router", NodeKind::PersonaRouter))
            .unwrap();
        wf.add_node(Node::new("sales", NodeKind::Agent)).unwrap();
        wf.add_node(Node::new("support", NodeKind::Agent)).unwrap();
        wf.add_connection(Connection::new("router", "sales").with_id("c-sales"))
            .unwrap();
        wf.add_connection(Connection::new("router", "support").with_id("c-support"))
            .unwrap();
        wf
    }

    #[test]
    fn test_newly_connected_agents_get_empty_defaults() {
        let wf = router_workflow();
        let mappings = recompute_mappings(&wf, "router", &[]);
        assert_eq!(mappings.len(), 2);
        assert_eq!(mappings[0].agent_id, "sales");
        assert_eq!(mappings[1].agent_id, "support");
        assert!(mappings[0].triggers.is_empty());
        assert_eq!(mappings[0].priority, 0);
    }

    #[test]
    fn test_existing_entries_survive_recompute() {
        let wf = router_workflow();
        let existing = vec![PersonaMapping::empty("support")
            .with_triggers(vec!["help".into()])
            .with_priority(2)];
        let mappings = recompute_mappings(&wf, "router", &existing);
        let support = mappings.iter().find(|m| m.agent_id == "support").unwrap();
        assert_eq!(support.triggers, vec!["help"]);
        assert_eq!(support.priority, 2);
    }

    #[test]
    fn test_disconnected_agents_are_pruned() {
        let mut wf = router_workflow();
        let existing = recompute_mappings(&wf, "router", &[]);
        wf.remove_connection("c-sales").unwrap();
        let mappings = recompute_mappings(&wf, "router", &existing);
        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0].agent_id, "support");
    }

    #[test]
    fn test_non_agent_targets_ignored() {
        let mut wf = router_workflow();
        wf.add_node(Node::new("out", NodeKind::Output)).unwrap();
        wf.add_connection(Connection::new("router", "out")).unwrap();
        let mappings = recompute_mappings(&wf, "router", &[]);
        assert_eq!(mappings.len(), 2);
    }

    #[test]
    fn test_order_tracks_connection_order() {
        let mut wf = Workflow::new();
        wf.add_node(Node::new("router", NodeKind::PersonaRouter))
            .unwrap();
        wf.add_node(Node::new("b", NodeKind::Agent)).unwrap();
        wf.add_node(Node::new("a", NodeKind::Agent)).unwrap();
        // "b" connected first, so it comes first regardless of node order.
        wf.add_connection(Connection::new("router", "b")).unwrap();
        wf.add_connection(Connection::new("router", "a")).unwrap();
        let mappings = recompute_mappings(&wf, "router", &[]);
        let ids: Vec<&str> = mappings.iter().map(|m| m.agent_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn test_refresh_updates_node_in_place() {
        let mut wf = router_workflow();
        refresh_router_mappings(&mut wf, "router").unwrap();
        let NodeData::PersonaRouter(data) = &wf.node("router").unwrap().data else {
            panic!("wrong variant");
        };
        assert_eq!(data.agent_intent_mappings.len(), 2);
    }

    #[test]
    fn test_refresh_rejects_non_router_node() {
        let mut wf = router_workflow();
        let err = refresh_router_mappings(&mut wf, "sales").unwrap_err();
        assert!(matches!(err, FlowforgeError::Routing(_)));
        let err = refresh_router_mappings(&mut wf, "ghost").unwrap_err();
        assert!(matches!(err, FlowforgeError::NodeNotFound(_)));
    }
}
