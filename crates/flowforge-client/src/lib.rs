//! Client for the external execution endpoint.
//!
//! The core never talks to a language model or tool backend directly:
//! it serializes the whole composed graph into an `ExecuteRequest` and
//! hands it to an `ExecutionBackend`. Responses come back either as one
//! JSON object or as an SSE chunk stream ending in a `[DONE]` sentinel.

pub mod backend;
pub mod protocol;
pub mod sse;

pub use backend::{ExecutionBackend, HttpBackend};
pub use protocol::{
    ExecuteRequest, ExecuteResponse, HistoryMessage, ResponseDelta, WorkflowExecution,
};
pub use sse::{SseParser, SseStream};
