//! Execution engine — simulated traversal and live test runs.
//!
//! `TraversalEngine` walks a workflow breadth-first from its trigger
//! node, producing an ordered trace of per-node entries without calling
//! any backend. `TestRunner` drives a real test run: it validates the
//! graph, hands it to the execution endpoint, and folds the response
//! (one-shot or chunked) into the transcript, enforcing single-flight
//! semantics throughout.

pub mod runner;
pub mod stream;
pub mod transcript;
pub mod traversal;

pub use runner::TestRunner;
pub use stream::{StreamAggregator, StreamOutcome};
pub use transcript::Transcript;
pub use traversal::{validate, TraversalEngine};
