use crate::types::{ExecutionLogEntry, ExecutionMessage, SessionId};

/// Run event broadcast to all subscribers.
#[derive(Debug, Clone)]
pub enum RunEvent {
    /// A run started for a session.
    RunStarted { session_id: SessionId },
    /// A diagnostic trace entry was produced.
    Log(ExecutionLogEntry),
    /// A new transcript message was appended.
    MessageAppended(ExecutionMessage),
    /// Streaming text was appended to the message with this id.
    TextDelta { message_id: String, delta: String },
    /// The run completed.
    RunComplete { session_id: SessionId },
    /// The run failed.
    RunError { error: String },
}

/// Event bus using tokio broadcast channel.
/// All subscribers receive all events.
pub struct EventBus {
    tx: tokio::sync::broadcast::Sender<RunEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = tokio::sync::broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: RunEvent) {
        // Ignore error if no receivers
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<RunEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
