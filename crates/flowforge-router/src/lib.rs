//! Persona routing — which connected agent answers this turn.
//!
//! A persona router node fans out to agent nodes, each with a
//! `PersonaMapping` entry (trigger keywords, confidence, priority).
//! `mapping` keeps that table consistent with the router's outgoing
//! connections; `intent` scores free-text input against the table and
//! picks one persona.

pub mod intent;
pub mod mapping;

pub use intent::{IntentRouter, IntentScorer, RoutingDecision};
pub use mapping::{recompute_mappings, refresh_router_mappings};
