use flowforge_core::types::ExecutionMessage;

/// The conversation transcript for one editing session.
///
/// Append-only: entries never move or disappear. The single exception
/// is the message opened by `begin_streaming`, whose content grows by
/// concatenation until `finish_streaming` seals it.
#[derive(Debug, Default)]
pub struct Transcript {
    messages: Vec<ExecutionMessage>,
    streaming: Option<usize>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ExecutionMessage] {
        &self.messages
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming.is_some()
    }

    /// Append a completed message.
    pub fn push(&mut self, message: ExecutionMessage) {
        self.messages.push(message);
    }

    /// Open a new, empty assistant message that will grow as stream
    /// fragments arrive. Returns its id. Any previously open message is
    /// sealed first.
    pub fn begin_streaming(&mut self, agent_name: Option<String>) -> String {
        self.finish_streaming();
        let mut message = ExecutionMessage::assistant("");
        message.agent_name = agent_name;
        let id = message.id.clone();
        self.messages.push(message);
        self.streaming = Some(self.messages.len() - 1);
        id
    }

    /// Concatenate a fragment onto the open streaming message.
    /// Returns the message id, or `None` when no message is open.
    pub fn append_delta(&mut self, delta: &str) -> Option<String> {
        let idx = self.streaming?;
        let message = &mut self.messages[idx];
        message.content.push_str(delta);
        Some(message.id.clone())
    }

    /// Seal the open streaming message, if any, returning its id.
    pub fn finish_streaming(&mut self) -> Option<String> {
        let idx = self.streaming.take()?;
        Some(self.messages[idx].id.clone())
    }
}
