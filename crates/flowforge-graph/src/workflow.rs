use serde::{Deserialize, Serialize};
use tracing::debug;

use flowforge_core::error::{FlowforgeError, Result};

use crate::connection::Connection;
use crate::node::{Node, NodeKind};

/// Free-form workflow metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// The workflow aggregate: all nodes and connections composed by a user.
///
/// Fields are private; every mutation goes through a method that checks
/// before it writes, so the invariants hold on every return:
/// node ids unique, connection ids unique, no dangling endpoints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    nodes: Vec<Node>,
    connections: Vec<Connection>,
    #[serde(default)]
    metadata: WorkflowMetadata,
}

impl Workflow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.metadata.name = name.into();
        self
    }

    pub fn metadata(&self) -> &WorkflowMetadata {
        &self.metadata
    }

    /// Nodes in stored (insertion) order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Connections in stored (creation) order.
    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Add a node. Fails with `DuplicateNode` if the id is taken.
    pub fn add_node(&mut self, node: Node) -> Result<()> {
        if self.nodes.iter().any(|n| n.id == node.id) {
            return Err(FlowforgeError::DuplicateNode(node.id));
        }
        self.nodes.push(node);
        Ok(())
    }

    /// Remove a node, cascading removal of every connection that
    /// references it. Returns the removed node, or `None` if absent.
    pub fn remove_node(&mut self, id: &str) -> Option<Node> {
        let idx = self.nodes.iter().position(|n| n.id == id)?;
        let node = self.nodes.remove(idx);
        let before = self.connections.len();
        self.connections
            .retain(|c| c.source != id && c.target != id);
        let cascaded = before - self.connections.len();
        if cascaded > 0 {
            debug!(node_id = %id, cascaded, "Cascaded connection removal");
        }
        Some(node)
    }

    /// Add a connection. Fails with `InvalidEndpoint` if either endpoint
    /// node is absent and `DuplicateConnection` on id reuse. Nothing is
    /// mutated on failure.
    pub fn add_connection(&mut self, conn: Connection) -> Result<()> {
        if self.connections.iter().any(|c| c.id == conn.id) {
            return Err(FlowforgeError::DuplicateConnection(conn.id));
        }
        for endpoint in [&conn.source, &conn.target] {
            if self.node(endpoint).is_none() {
                return Err(FlowforgeError::InvalidEndpoint {
                    connection: conn.id,
                    endpoint: endpoint.clone(),
                });
            }
        }
        self.connections.push(conn);
        Ok(())
    }

    /// Remove a connection by id. Returns it, or `None` if absent.
    pub fn remove_connection(&mut self, id: &str) -> Option<Connection> {
        let idx = self.connections.iter().position(|c| c.id == id)?;
        Some(self.connections.remove(idx))
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    /// Outgoing connections of a node, in creation order.
    pub fn outgoing(&self, node_id: &str) -> Vec<&Connection> {
        self.connections
            .iter()
            .filter(|c| c.source == node_id)
            .collect()
    }

    /// Incoming connections of a node, in creation order.
    pub fn incoming(&self, node_id: &str) -> Vec<&Connection> {
        self.connections
            .iter()
            .filter(|c| c.target == node_id)
            .collect()
    }

    /// First node of the given kind, in stored order.
    pub fn first_of_kind(&self, kind: NodeKind) -> Option<&Node> {
        self.nodes.iter().find(|n| n.kind() == kind)
    }

    pub fn contains_kind(&self, kind: NodeKind) -> bool {
        self.nodes.iter().any(|n| n.kind() == kind)
    }

    /// Check the aggregate invariants. Freshly deserialized workflows go
    /// through this before anything else touches them.
    pub fn validate(&self) -> Result<()> {
        for (i, node) in self.nodes.iter().enumerate() {
            if self.nodes[..i].iter().any(|n| n.id == node.id) {
                return Err(FlowforgeError::DuplicateNode(node.id.clone()));
            }
        }
        for (i, conn) in self.connections.iter().enumerate() {
            if self.connections[..i].iter().any(|c| c.id == conn.id) {
                return Err(FlowforgeError::DuplicateConnection(conn.id.clone()));
            }
            for endpoint in [&conn.source, &conn.target] {
                if self.node(endpoint).is_none() {
                    return Err(FlowforgeError::InvalidEndpoint {
                        connection: conn.id.clone(),
                        endpoint: endpoint.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}
