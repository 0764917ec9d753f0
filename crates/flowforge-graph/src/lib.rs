//! Workflow Graph Model — typed nodes wired by typed connections.
//!
//! A workflow is a directed graph of `Node`s connected by `Connection`s.
//! Each node carries a closed, kind-tagged payload (`NodeData`) so that
//! missing or invalid configuration is a construction-time error rather
//! than a runtime lookup failure.
//!
//! The `Workflow` aggregate owns the graph and guards its invariants:
//! unique node ids, unique connection ids, no dangling endpoints.
//! `spawner` collapses "create node + default data + wire connection"
//! into one deterministic step fired from a single handle gesture.

pub mod connection;
pub mod node;
pub mod spawner;
pub mod workflow;

pub use connection::{Connection, ConnectionKind, HandleDirection};
pub use node::{DetectionMethod, Node, NodeData, NodeKind, PersonaMapping, Position};
pub use spawner::{plan_spawn, spawn, SpawnPlan, SpawnRequest, Spawned};
pub use workflow::{Workflow, WorkflowMetadata};
