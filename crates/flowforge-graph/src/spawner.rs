use tracing::debug;

use crate::connection::{
    handle_direction, handles, Connection, ConnectionKind, HandleDirection,
};
use crate::node::{Node, NodeKind, Position};
use crate::workflow::Workflow;

/// A single click-to-extend gesture fired from one handle.
#[derive(Debug, Clone)]
pub struct SpawnRequest {
    pub origin_node_id: String,
    pub origin_handle: String,
    pub target_kind: NodeKind,
}

impl SpawnRequest {
    pub fn new(
        origin_node_id: impl Into<String>,
        origin_handle: impl Into<String>,
        target_kind: NodeKind,
    ) -> Self {
        Self {
            origin_node_id: origin_node_id.into(),
            origin_handle: origin_handle.into(),
            target_kind,
        }
    }
}

/// The fully computed outcome of a spawn gesture, before mutation.
#[derive(Debug, Clone)]
pub struct SpawnPlan {
    pub node: Node,
    pub connection: Connection,
    /// Node whose configuration editor should open once applied.
    pub open_editor: String,
}

/// Ids created by an applied spawn.
#[derive(Debug, Clone)]
pub struct Spawned {
    pub node_id: String,
    pub connection_id: String,
    pub open_editor: String,
}

/// Fixed placement offset for a spawn fired from the given handle.
///
/// The three agent bottom ports are spread horizontally so sibling
/// spawns land side by side instead of stacking.
fn spawn_offset(handle: &str) -> (f64, f64) {
    match handle {
        handles::INPUT_MAIN => (-280.0, 0.0),
        handles::AGENT_LLM => (-170.0, 190.0),
        handles::AGENT_TOOL => (0.0, 190.0),
        handles::AGENT_MEMORY => (170.0, 190.0),
        handles::CONNECTOR_TOP => (0.0, -190.0),
        _ => (280.0, 0.0),
    }
}

/// Handle on the newly spawned node that receives the connection.
fn counterpart_input_handle(kind: NodeKind) -> &'static str {
    match kind {
        NodeKind::Llm | NodeKind::Tool | NodeKind::Memory => handles::CONNECTOR_TOP,
        _ => handles::INPUT_MAIN,
    }
}

/// Compute the node + connection a spawn gesture would create.
///
/// Pure and deterministic apart from generated ids: no mutation happens
/// here, so the placement and wiring rules are testable in isolation.
/// Returns `None` when the origin node cannot be resolved or the handle
/// is unknown — the gesture is dropped without an error channel.
pub fn plan_spawn(workflow: &Workflow, req: &SpawnRequest) -> Option<SpawnPlan> {
    let origin = match workflow.node(&req.origin_node_id) {
        Some(n) => n,
        None => {
            debug!(origin = %req.origin_node_id, "Spawn origin not found, ignoring gesture");
            return None;
        }
    };
    let direction = match handle_direction(&req.origin_handle) {
        Some(d) => d,
        None => {
            debug!(handle = %req.origin_handle, "Unknown spawn handle, ignoring gesture");
            return None;
        }
    };

    let (dx, dy) = spawn_offset(&req.origin_handle);
    let position = origin.position.offset(dx, dy);
    let node = Node::spawned(req.target_kind, position);

    // Output handles make the origin the source; input handles make it
    // the target.
    let connection = match direction {
        HandleDirection::Output => Connection::between(
            origin.id.clone(),
            req.origin_handle.clone(),
            node.id.clone(),
            counterpart_input_handle(req.target_kind),
        ),
        HandleDirection::Input => Connection::between(
            node.id.clone(),
            handles::OUTPUT_MAIN,
            origin.id.clone(),
            req.origin_handle.clone(),
        ),
    };

    let kind = if req.origin_handle == handles::AGENT_MEMORY {
        ConnectionKind::Memory
    } else {
        ConnectionKind::Data
    };

    let open_editor = node.id.clone();
    Some(SpawnPlan {
        node,
        connection: connection.with_kind(kind),
        open_editor,
    })
}

/// Apply a spawn gesture: exactly one new node and one new connection,
/// or nothing at all.
pub fn spawn(workflow: &mut Workflow, req: &SpawnRequest) -> Option<Spawned> {
    let plan = plan_spawn(workflow, req)?;
    let node_id = plan.node.id.clone();
    let connection_id = plan.connection.id.clone();

    // Fresh ids and a resolved origin: neither insert can fail.
    workflow.add_node(plan.node).ok()?;
    workflow.add_connection(plan.connection).ok()?;

    debug!(
        origin = %req.origin_node_id,
        handle = %req.origin_handle,
        node_id = %node_id,
        "Spawned node from handle gesture"
    );

    Some(Spawned {
        node_id,
        connection_id,
        open_editor: plan.open_editor,
    })
}
