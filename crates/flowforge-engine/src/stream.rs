use std::sync::Arc;

use futures::stream::{BoxStream, StreamExt};
use tracing::{debug, warn};

use flowforge_client::ResponseDelta;
use flowforge_core::error::Result;
use flowforge_core::event::{EventBus, RunEvent};
use flowforge_core::types::ExecutionLogEntry;

use crate::transcript::Transcript;

/// How a chunked response ended.
#[derive(Debug)]
pub struct StreamOutcome {
    /// Id of the transcript message the stream wrote into, if any
    /// content arrived.
    pub message_id: Option<String>,
    /// True when the stream ended with its completion sentinel.
    pub completed: bool,
    /// Diagnostic entry for an abnormal ending (transport error, or a
    /// close without the sentinel after content was received).
    pub diagnostic: Option<ExecutionLogEntry>,
}

/// Folds a chunked response stream into the transcript.
///
/// Fragments are applied strictly in arrival order. The message is
/// opened lazily on the first content fragment, so a stream that ends
/// without producing any content leaves no transcript entry behind.
/// Partial content always survives an error or early close.
pub struct StreamAggregator {
    bus: Arc<EventBus>,
}

impl StreamAggregator {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self { bus }
    }

    pub async fn aggregate(
        &self,
        mut stream: BoxStream<'_, Result<ResponseDelta>>,
        transcript: &mut Transcript,
        agent_name: Option<String>,
    ) -> Result<StreamOutcome> {
        let mut message_id: Option<String> = None;
        let mut completed = false;
        let mut diagnostic: Option<ExecutionLogEntry> = None;

        while let Some(item) = stream.next().await {
            match item {
                Ok(ResponseDelta::Content(delta)) => {
                    let id = match &message_id {
                        Some(id) => id.clone(),
                        None => {
                            let id = transcript.begin_streaming(agent_name.clone());
                            if let Some(opened) = transcript.messages().last() {
                                self.bus.publish(RunEvent::MessageAppended(opened.clone()));
                            }
                            message_id = Some(id.clone());
                            id
                        }
                    };
                    transcript.append_delta(&delta);
                    self.bus.publish(RunEvent::TextDelta {
                        message_id: id,
                        delta,
                    });
                }
                Ok(ResponseDelta::Done) => {
                    completed = true;
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "Response stream failed, keeping partial content");
                    diagnostic = Some(ExecutionLogEntry::error(format!(
                        "Response stream failed: {}",
                        e
                    )));
                    break;
                }
            }
        }

        if !completed && diagnostic.is_none() && message_id.is_some() {
            debug!("Response stream closed without completion sentinel");
            diagnostic = Some(ExecutionLogEntry::warning(
                "Response stream closed before completing",
            ));
        }

        transcript.finish_streaming();
        if let Some(ref entry) = diagnostic {
            self.bus.publish(RunEvent::Log(entry.clone()));
        }

        Ok(StreamOutcome {
            message_id,
            completed,
            diagnostic,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowforge_core::error::FlowforgeError;
    use flowforge_core::types::{LogLevel, Role};

    fn aggregator() -> (StreamAggregator, Arc<EventBus>) {
        let bus = Arc::new(EventBus::default());
        (StreamAggregator::new(bus.clone()), bus)
    }

    fn content_stream(
        items: Vec<Result<ResponseDelta>>,
    ) -> BoxStream<'static, Result<ResponseDelta>> {
        Box::pin(futures::stream::iter(items))
    }

    #[tokio::test]
    async fn test_fragments_concatenate_in_arrival_order() {
        let (aggregator, bus) = aggregator();
        let mut rx = bus.subscribe();
        let mut transcript = Transcript::new();

        let stream = content_stream(vec![
            Ok(ResponseDelta::Content("Hel".into())),
            Ok(ResponseDelta::Content("lo, ".into())),
            Ok(ResponseDelta::Content("world".into())),
            Ok(ResponseDelta::Done),
        ]);
        let outcome = aggregator
            .aggregate(stream, &mut transcript, Some("Writer".into()))
            .await
            .unwrap();

        assert!(outcome.completed);
        assert!(outcome.diagnostic.is_none());
        assert_eq!(transcript.messages().len(), 1);
        let msg = &transcript.messages()[0];
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.content, "Hello, world");
        assert_eq!(msg.agent_name.as_deref(), Some("Writer"));
        assert_eq!(outcome.message_id.as_deref(), Some(msg.id.as_str()));

        // Subscribers observe the growing prefix in order.
        assert!(matches!(
            rx.try_recv().unwrap(),
            RunEvent::MessageAppended(_)
        ));
        let mut observed = String::new();
        let mut prefixes = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let RunEvent::TextDelta { delta, .. } = event {
                observed.push_str(&delta);
                prefixes.push(observed.clone());
            }
        }
        assert_eq!(prefixes, vec!["Hel", "Hello, ", "Hello, world"]);
    }

    #[tokio::test]
    async fn test_error_mid_stream_keeps_partial_content() {
        let (aggregator, _bus) = aggregator();
        let mut transcript = Transcript::new();

        let stream = content_stream(vec![
            Ok(ResponseDelta::Content("partial".into())),
            Err(FlowforgeError::Stream("connection reset".into())),
        ]);
        let outcome = aggregator
            .aggregate(stream, &mut transcript, None)
            .await
            .unwrap();

        assert!(!outcome.completed);
        assert_eq!(transcript.messages()[0].content, "partial");
        let diagnostic = outcome.diagnostic.unwrap();
        assert_eq!(diagnostic.level, LogLevel::Error);
        assert!(diagnostic.message.contains("connection reset"));
        assert!(!transcript.is_streaming());
    }

    #[tokio::test]
    async fn test_done_without_content_leaves_no_message() {
        let (aggregator, _bus) = aggregator();
        let mut transcript = Transcript::new();

        let stream = content_stream(vec![Ok(ResponseDelta::Done)]);
        let outcome = aggregator
            .aggregate(stream, &mut transcript, None)
            .await
            .unwrap();

        assert!(outcome.completed);
        assert!(outcome.message_id.is_none());
        assert!(transcript.messages().is_empty());
    }

    #[tokio::test]
    async fn test_close_without_sentinel_is_flagged() {
        let (aggregator, _bus) = aggregator();
        let mut transcript = Transcript::new();

        let stream = content_stream(vec![Ok(ResponseDelta::Content("half".into()))]);
        let outcome = aggregator
            .aggregate(stream, &mut transcript, None)
            .await
            .unwrap();

        assert!(!outcome.completed);
        assert_eq!(transcript.messages()[0].content, "half");
        assert_eq!(outcome.diagnostic.unwrap().level, LogLevel::Warning);
    }
}
