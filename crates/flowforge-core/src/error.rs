use thiserror::Error;

#[derive(Debug, Error)]
pub enum FlowforgeError {
    // Graph errors
    #[error("Duplicate node id: {0}")]
    DuplicateNode(String),

    #[error("Duplicate connection id: {0}")]
    DuplicateConnection(String),

    #[error("Connection {connection} references missing node: {endpoint}")]
    InvalidEndpoint { connection: String, endpoint: String },

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    // Execution errors
    #[error("Workflow not executable: {0}")]
    WorkflowNotExecutable(String),

    #[error("A run is already in progress")]
    RunInProgress,

    #[error("Run cancelled")]
    Cancelled,

    // Routing errors
    #[error("Routing failed: {0}")]
    Routing(String),

    // Backend errors
    #[error("Execution backend error: {0}")]
    Backend(String),

    #[error("Stream error: {0}")]
    Stream(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, FlowforgeError>;
