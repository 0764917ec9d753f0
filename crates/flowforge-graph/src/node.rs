use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of a workflow node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Trigger,
    Agent,
    PersonaRouter,
    Llm,
    Tool,
    Memory,
    Orchestrator,
    Output,
}

impl NodeKind {
    /// Default human-readable label for freshly created nodes.
    pub fn default_label(&self) -> &'static str {
        match self {
            Self::Trigger => "Trigger",
            Self::Agent => "Agent",
            Self::PersonaRouter => "Persona Router",
            Self::Llm => "LLM",
            Self::Tool => "Tool",
            Self::Memory => "Memory",
            Self::Orchestrator => "Orchestrator",
            Self::Output => "Output",
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Trigger => "trigger",
            Self::Agent => "agent",
            Self::PersonaRouter => "persona_router",
            Self::Llm => "llm",
            Self::Tool => "tool",
            Self::Memory => "memory",
            Self::Orchestrator => "orchestrator",
            Self::Output => "output",
        };
        write!(f, "{}", s)
    }
}

/// Canvas position of a node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn offset(&self, dx: f64, dy: f64) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }
}

/// How a trigger node fires.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    Webhook,
    Schedule,
    Event,
    #[default]
    Manual,
}

/// Memory backing for a memory node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    #[default]
    Buffer,
    Summary,
    Rag,
}

/// Intent detection method for a persona router.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    #[default]
    Keywords,
    Llm,
    Hybrid,
}

/// Routing table entry for one persona-capable connected agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonaMapping {
    pub agent_id: String,
    #[serde(default)]
    pub triggers: Vec<String>,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub priority: i32,
}

impl PersonaMapping {
    /// Empty-default entry for a newly connected agent.
    pub fn empty(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            triggers: vec![],
            confidence: 0.0,
            priority: 0,
        }
    }

    pub fn with_triggers(mut self, triggers: Vec<String>) -> Self {
        self.triggers = triggers;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriggerData {
    #[serde(rename = "type")]
    pub trigger_type: TriggerType,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub authentication: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentData {
    pub name: String,
    pub system_prompt: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub memory: bool,
    #[serde(default)]
    pub context_window: Option<u32>,
}

/// Intent detection settings on a persona router.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentConfig {
    #[serde(default)]
    pub method: DetectionMethod,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    #[serde(default)]
    pub default_agent: Option<String>,
}

impl Default for IntentConfig {
    fn default() -> Self {
        Self {
            method: DetectionMethod::Keywords,
            confidence_threshold: default_confidence_threshold(),
            default_agent: None,
        }
    }
}

fn default_confidence_threshold() -> f64 {
    0.7
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonaRouterData {
    pub intents: IntentConfig,
    #[serde(default)]
    pub agent_intent_mappings: Vec<PersonaMapping>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmData {
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub api_base: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolData {
    pub name: String,
    #[serde(rename = "type")]
    pub tool_type: String,
    #[serde(default)]
    pub parameters: serde_json::Value,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryData {
    #[serde(rename = "type")]
    pub memory_type: MemoryType,
    #[serde(default)]
    pub window_size: Option<usize>,
    #[serde(default)]
    pub rag_indexes: Vec<String>,
    #[serde(default)]
    pub similarity_threshold: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorData {
    pub routing: String,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub max_concurrent: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputData {
    pub format: String,
    pub destination: String,
    #[serde(default)]
    pub template: Option<String>,
}

/// Kind-specific node payload.
///
/// Closed sum type tagged by `kind`: every node kind has exactly one
/// variant, and each variant's required fields are plain (not optional),
/// so an under-configured node cannot be constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeData {
    Trigger(TriggerData),
    Agent(AgentData),
    PersonaRouter(PersonaRouterData),
    Llm(LlmData),
    Tool(ToolData),
    Memory(MemoryData),
    Orchestrator(OrchestratorData),
    Output(OutputData),
}

impl NodeData {
    /// Default payload for a node of the given kind.
    ///
    /// This is the single source of factory defaults: both explicit node
    /// drops and the dynamic spawner build their payloads here.
    pub fn default_for(kind: NodeKind) -> Self {
        match kind {
            NodeKind::Trigger => Self::Trigger(TriggerData::default()),
            NodeKind::Agent => Self::Agent(AgentData {
                name: "New Agent".to_string(),
                system_prompt: "You are a helpful assistant.".to_string(),
                capabilities: vec![],
                memory: false,
                context_window: None,
            }),
            NodeKind::PersonaRouter => Self::PersonaRouter(PersonaRouterData::default()),
            NodeKind::Llm => Self::Llm(LlmData {
                provider: "openai".to_string(),
                model: "gpt-4o".to_string(),
                temperature: Some(0.7),
                max_tokens: None,
                api_base: None,
                api_key: None,
            }),
            NodeKind::Tool => Self::Tool(ToolData {
                name: "New Tool".to_string(),
                tool_type: "api".to_string(),
                parameters: serde_json::Value::Null,
                enabled: true,
            }),
            NodeKind::Memory => Self::Memory(MemoryData {
                memory_type: MemoryType::Buffer,
                window_size: Some(10),
                rag_indexes: vec![],
                similarity_threshold: None,
            }),
            NodeKind::Orchestrator => Self::Orchestrator(OrchestratorData {
                routing: "sequential".to_string(),
                timeout_secs: None,
                max_concurrent: None,
            }),
            NodeKind::Output => Self::Output(OutputData {
                format: "text".to_string(),
                destination: "chat".to_string(),
                template: None,
            }),
        }
    }

    /// The kind this payload belongs to.
    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Trigger(_) => NodeKind::Trigger,
            Self::Agent(_) => NodeKind::Agent,
            Self::PersonaRouter(_) => NodeKind::PersonaRouter,
            Self::Llm(_) => NodeKind::Llm,
            Self::Tool(_) => NodeKind::Tool,
            Self::Memory(_) => NodeKind::Memory,
            Self::Orchestrator(_) => NodeKind::Orchestrator,
            Self::Output(_) => NodeKind::Output,
        }
    }
}

/// A node in the workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique identifier within the owning workflow.
    pub id: String,
    /// Human-readable label shown on the canvas and in trace output.
    pub label: String,
    /// Canvas position.
    #[serde(default)]
    pub position: Position,
    /// Kind-specific payload (the `kind` tag serializes inline).
    #[serde(flatten)]
    pub data: NodeData,
}

impl Node {
    /// Create a node with an explicit id and factory-default data.
    pub fn new(id: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            label: kind.default_label().to_string(),
            position: Position::default(),
            data: NodeData::default_for(kind),
        }
    }

    /// Create a node with a generated id at the given position.
    /// Used by the dynamic spawner.
    pub fn spawned(kind: NodeKind, position: Position) -> Self {
        Self {
            id: format!("{}-{}", kind, Uuid::new_v4()),
            label: kind.default_label().to_string(),
            position,
            data: NodeData::default_for(kind),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_position(mut self, x: f64, y: f64) -> Self {
        self.position = Position::new(x, y);
        self
    }

    pub fn with_data(mut self, data: NodeData) -> Self {
        self.data = data;
        self
    }

    /// The node's kind, derived from its payload.
    pub fn kind(&self) -> NodeKind {
        self.data.kind()
    }
}
