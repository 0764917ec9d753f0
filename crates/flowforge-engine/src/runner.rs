use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use flowforge_client::{ExecuteRequest, ExecutionBackend};
use flowforge_core::error::{FlowforgeError, Result};
use flowforge_core::event::{EventBus, RunEvent};
use flowforge_core::types::{ExecutionMessage, SessionId};
use flowforge_graph::{NodeData, NodeKind, Workflow};
use flowforge_router::{recompute_mappings, IntentRouter};

use crate::stream::StreamAggregator;
use crate::transcript::Transcript;
use crate::traversal::validate;

/// Drives a live test run against the execution endpoint.
///
/// At most one run is in flight at a time. A second `send` while a run
/// is active fails fast with `RunInProgress` and leaves the transcript
/// untouched.
pub struct TestRunner {
    backend: Arc<dyn ExecutionBackend>,
    bus: Arc<EventBus>,
    in_flight: AtomicBool,
    cancel: CancellationToken,
    streaming: bool,
}

/// Releases the in-flight flag when the run ends, on every exit path.
struct FlightGuard<'a>(&'a AtomicBool);

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl TestRunner {
    pub fn new(backend: Arc<dyn ExecutionBackend>, bus: Arc<EventBus>) -> Self {
        Self {
            backend,
            bus,
            in_flight: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            streaming: true,
        }
    }

    /// Switch between the chunked and one-shot endpoints.
    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run one user turn against the endpoint, folding the exchange
    /// into the transcript.
    pub async fn send(
        &self,
        workflow: &Workflow,
        transcript: &mut Transcript,
        session_id: &SessionId,
        input: &str,
    ) -> Result<()> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Rejecting send, a run is already in progress");
            return Err(FlowforgeError::RunInProgress);
        }
        let _guard = FlightGuard(&self.in_flight);

        self.bus.publish(RunEvent::RunStarted {
            session_id: session_id.clone(),
        });

        match self.run_turn(workflow, transcript, session_id, input).await {
            Ok(()) => {
                info!(session_id = %session_id, "Run complete");
                self.bus.publish(RunEvent::RunComplete {
                    session_id: session_id.clone(),
                });
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Run failed");
                let detail = e.to_string();
                self.push(transcript, ExecutionMessage::error(&detail));
                if let Some(hint) = guidance_for(&detail) {
                    self.push(transcript, ExecutionMessage::system(hint));
                }
                self.bus.publish(RunEvent::RunError { error: detail });
                Err(e)
            }
        }
    }

    async fn run_turn(
        &self,
        workflow: &Workflow,
        transcript: &mut Transcript,
        session_id: &SessionId,
        input: &str,
    ) -> Result<()> {
        validate(workflow)?;

        // History is the state before this turn; the live input travels
        // in its own field.
        let history = transcript.messages().to_vec();
        self.push(transcript, ExecutionMessage::user(input));

        let preview = self.routing_preview(workflow, input).await?;
        if let Some((agent_label, note)) = &preview {
            debug!(agent = %agent_label, "Routing preview");
            self.push(transcript, ExecutionMessage::system(note.clone()));
        }

        let request = ExecuteRequest::from_workflow(workflow, input, session_id, &history);

        if self.streaming {
            let stream = tokio::select! {
                _ = self.cancel.cancelled() => return Err(FlowforgeError::Cancelled),
                opened = self.backend.execute_stream(request) => opened?,
            };
            let aggregator = StreamAggregator::new(self.bus.clone());
            let agent_name = preview.map(|(label, _)| label);
            let outcome = tokio::select! {
                _ = self.cancel.cancelled() => None,
                outcome = aggregator.aggregate(stream, transcript, agent_name) => Some(outcome),
            };
            match outcome {
                Some(result) => {
                    result?;
                }
                None => {
                    transcript.finish_streaming();
                    return Err(FlowforgeError::Cancelled);
                }
            }
        } else {
            let response = tokio::select! {
                _ = self.cancel.cancelled() => return Err(FlowforgeError::Cancelled),
                res = self.backend.execute(request) => res?,
            };
            let agent_name = response
                .workflow_execution
                .as_ref()
                .and_then(|exec| exec.agent_name.clone());
            let mut message = ExecutionMessage::assistant(response.response);
            message.agent_name = agent_name;
            self.push(transcript, message);
        }

        Ok(())
    }

    /// Local routing preview for workflows with a persona router.
    ///
    /// The endpoint makes the authoritative routing decision; this runs
    /// the same selection locally so the transcript can show which
    /// persona is expected to answer. Returns the selected agent's
    /// label and the system note.
    async fn routing_preview(
        &self,
        workflow: &Workflow,
        input: &str,
    ) -> Result<Option<(String, String)>> {
        let Some(router) = workflow.first_of_kind(NodeKind::PersonaRouter) else {
            return Ok(None);
        };
        let NodeData::PersonaRouter(data) = &router.data else {
            return Ok(None);
        };

        let mappings = recompute_mappings(workflow, &router.id, &data.agent_intent_mappings);
        if mappings.is_empty() {
            warn!(router_id = %router.id, "Persona router has no connected agents");
            return Ok(None);
        }

        let decision = IntentRouter::from_config(&data.intents)
            .route(input, &mappings, None)
            .await?;

        let label = workflow
            .node(&decision.selected_agent_id)
            .map(|n| n.label.clone())
            .unwrap_or_else(|| decision.selected_agent_id.clone());
        let note = format!(
            "Routing to '{}' ({:?} detection, confidence {:.2})",
            label, decision.method_used, decision.confidence
        );
        Ok(Some((label, note)))
    }

    fn push(&self, transcript: &mut Transcript, message: ExecutionMessage) {
        self.bus.publish(RunEvent::MessageAppended(message.clone()));
        transcript.push(message);
    }
}

/// Actionable hint for a failed run, matched on the error text.
fn guidance_for(error: &str) -> Option<&'static str> {
    let lower = error.to_lowercase();
    if lower.contains("api key") || lower.contains("unauthorized") || lower.contains("401") {
        Some("Check the endpoint API key in your configuration.")
    } else if lower.contains("not executable") {
        Some("Add an agent or LLM node and connect it before running.")
    } else if lower.contains("persona") || lower.contains("router") {
        Some("Connect at least one agent to the persona router.")
    } else if lower.contains("llm") || lower.contains("model") {
        Some("Connect an LLM node to your agent and pick a model.")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::BoxFuture;
    use futures::stream::BoxStream;
    use tokio::sync::Notify;

    use flowforge_client::{ExecuteResponse, ResponseDelta, WorkflowExecution};
    use flowforge_core::types::Role;
    use flowforge_graph::{Connection, Node};

    fn executable_workflow() -> Workflow {
        let mut wf = Workflow::new();
        wf.add_node(Node::new("t", NodeKind::Trigger)).unwrap();
        wf.add_node(Node::new("a", NodeKind::Agent)).unwrap();
        wf.add_connection(Connection::new("t", "a")).unwrap();
        wf
    }

    struct CannedBackend {
        response: ExecuteResponse,
        deltas: Vec<Result<ResponseDelta>>,
    }

    impl CannedBackend {
        fn plain(text: &str) -> Self {
            Self {
                response: ExecuteResponse {
                    response: text.to_string(),
                    workflow_execution: None,
                },
                deltas: vec![
                    Ok(ResponseDelta::Content(text.to_string())),
                    Ok(ResponseDelta::Done),
                ],
            }
        }
    }

    impl ExecutionBackend for CannedBackend {
        fn execute(&self, _request: ExecuteRequest) -> BoxFuture<'_, Result<ExecuteResponse>> {
            let response = self.response.clone();
            Box::pin(async move { Ok(response) })
        }

        fn execute_stream(
            &self,
            _request: ExecuteRequest,
        ) -> BoxFuture<'_, Result<BoxStream<'static, Result<ResponseDelta>>>> {
            let deltas: Vec<Result<ResponseDelta>> = self
                .deltas
                .iter()
                .map(|d| match d {
                    Ok(delta) => Ok(delta.clone()),
                    Err(e) => Err(FlowforgeError::Stream(e.to_string())),
                })
                .collect();
            Box::pin(async move {
                Ok(Box::pin(futures::stream::iter(deltas))
                    as BoxStream<'static, Result<ResponseDelta>>)
            })
        }
    }

    struct FailingBackend;

    impl ExecutionBackend for FailingBackend {
        fn execute(&self, _request: ExecuteRequest) -> BoxFuture<'_, Result<ExecuteResponse>> {
            Box::pin(async { Err(FlowforgeError::Backend("Invalid API key".to_string())) })
        }

        fn execute_stream(
            &self,
            _request: ExecuteRequest,
        ) -> BoxFuture<'_, Result<BoxStream<'static, Result<ResponseDelta>>>> {
            Box::pin(async { Err(FlowforgeError::Backend("Invalid API key".to_string())) })
        }
    }

    /// Blocks inside execute until released, to hold the in-flight flag.
    struct BlockingBackend {
        entered: Arc<Notify>,
        release: Arc<Notify>,
    }

    impl ExecutionBackend for BlockingBackend {
        fn execute(&self, _request: ExecuteRequest) -> BoxFuture<'_, Result<ExecuteResponse>> {
            let entered = self.entered.clone();
            let release = self.release.clone();
            Box::pin(async move {
                entered.notify_one();
                release.notified().await;
                Ok(ExecuteResponse {
                    response: "done".to_string(),
                    workflow_execution: None,
                })
            })
        }

        fn execute_stream(
            &self,
            _request: ExecuteRequest,
        ) -> BoxFuture<'_, Result<BoxStream<'static, Result<ResponseDelta>>>> {
            Box::pin(async { Err(FlowforgeError::Backend("unused".to_string())) })
        }
    }

    #[tokio::test]
    async fn test_non_streaming_turn_appends_user_then_assistant() {
        let runner = TestRunner::new(
            Arc::new(CannedBackend::plain("Hello from the endpoint")),
            Arc::new(EventBus::default()),
        )
        .with_streaming(false);
        let mut transcript = Transcript::new();

        runner
            .send(
                &executable_workflow(),
                &mut transcript,
                &SessionId::new(),
                "hi",
            )
            .await
            .unwrap();

        let messages = transcript.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].content, "hi");
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[1].content, "Hello from the endpoint");
        assert!(!runner.is_running());
    }

    #[tokio::test]
    async fn test_streaming_turn_assembles_full_message() {
        let backend = CannedBackend {
            response: ExecuteResponse {
                response: String::new(),
                workflow_execution: None,
            },
            deltas: vec![
                Ok(ResponseDelta::Content("Hel".to_string())),
                Ok(ResponseDelta::Content("lo".to_string())),
                Ok(ResponseDelta::Done),
            ],
        };
        let runner = TestRunner::new(Arc::new(backend), Arc::new(EventBus::default()));
        let mut transcript = Transcript::new();

        runner
            .send(
                &executable_workflow(),
                &mut transcript,
                &SessionId::new(),
                "hi",
            )
            .await
            .unwrap();

        assert_eq!(transcript.messages().len(), 2);
        assert_eq!(transcript.messages()[1].content, "Hello");
        assert!(!transcript.is_streaming());
    }

    #[tokio::test]
    async fn test_assistant_message_carries_reported_agent_name() {
        let backend = CannedBackend {
            response: ExecuteResponse {
                response: "Sure".to_string(),
                workflow_execution: Some(WorkflowExecution {
                    agent_name: Some("Sales".to_string()),
                    router_used: true,
                    selected_agent: Some("sales-1".to_string()),
                    routing_method: Some("keywords".to_string()),
                    routing_confidence: Some(1.0),
                }),
            },
            deltas: vec![],
        };
        let runner =
            TestRunner::new(Arc::new(backend), Arc::new(EventBus::default())).with_streaming(false);
        let mut transcript = Transcript::new();

        runner
            .send(
                &executable_workflow(),
                &mut transcript,
                &SessionId::new(),
                "buy",
            )
            .await
            .unwrap();

        assert_eq!(transcript.messages()[1].agent_name.as_deref(), Some("Sales"));
    }

    #[tokio::test]
    async fn test_router_workflow_gets_routing_note() {
        let mut wf = Workflow::new();
        wf.add_node(Node::new("router", NodeKind::PersonaRouter))
            .unwrap();
        wf.add_node(Node::new("sales", NodeKind::Agent).with_label("Sales Agent"))
            .unwrap();
        wf.add_connection(Connection::new("router", "sales")).unwrap();
        if let Some(node) = wf.node_mut("router") {
            if let NodeData::PersonaRouter(ref mut data) = node.data {
                data.agent_intent_mappings =
                    vec![flowforge_graph::PersonaMapping::empty("sales")
                        .with_triggers(vec!["buy".to_string()])];
            }
        }

        let runner = TestRunner::new(
            Arc::new(CannedBackend::plain("ok")),
            Arc::new(EventBus::default()),
        )
        .with_streaming(false);
        let mut transcript = Transcript::new();

        runner
            .send(&wf, &mut transcript, &SessionId::new(), "I want to buy")
            .await
            .unwrap();

        let messages = transcript.messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].role, Role::System);
        assert!(messages[1].content.contains("Sales Agent"));
    }

    #[tokio::test]
    async fn test_failed_run_appends_error_and_guidance() {
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let runner =
            TestRunner::new(Arc::new(FailingBackend), bus.clone()).with_streaming(false);
        let mut transcript = Transcript::new();

        let err = runner
            .send(
                &executable_workflow(),
                &mut transcript,
                &SessionId::new(),
                "hi",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FlowforgeError::Backend(_)));

        let messages = transcript.messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].role, Role::Error);
        assert!(messages[1].content.contains("Invalid API key"));
        assert_eq!(messages[2].role, Role::System);
        assert!(messages[2].content.contains("API key"));

        // Flag is released so the next turn can run.
        assert!(!runner.is_running());

        let mut saw_error = false;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, RunEvent::RunError { .. }) {
                saw_error = true;
            }
        }
        assert!(saw_error);
    }

    #[tokio::test]
    async fn test_invalid_workflow_fails_before_user_message_survives_rejection() {
        let runner = TestRunner::new(
            Arc::new(CannedBackend::plain("never")),
            Arc::new(EventBus::default()),
        )
        .with_streaming(false);
        let mut transcript = Transcript::new();

        let err = runner
            .send(&Workflow::new(), &mut transcript, &SessionId::new(), "hi")
            .await
            .unwrap_err();
        assert!(matches!(err, FlowforgeError::WorkflowNotExecutable(_)));

        // Validation failed before the turn started, so the transcript
        // holds only the error entry and its hint.
        assert_eq!(transcript.messages()[0].role, Role::Error);
    }

    #[tokio::test]
    async fn test_second_send_while_running_is_rejected() {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let backend = BlockingBackend {
            entered: entered.clone(),
            release: release.clone(),
        };
        let runner = Arc::new(
            TestRunner::new(Arc::new(backend), Arc::new(EventBus::default()))
                .with_streaming(false),
        );

        let first = {
            let runner = runner.clone();
            tokio::spawn(async move {
                let mut transcript = Transcript::new();
                runner
                    .send(
                        &executable_workflow(),
                        &mut transcript,
                        &SessionId::new(),
                        "first",
                    )
                    .await?;
                Ok::<_, FlowforgeError>(transcript)
            })
        };

        entered.notified().await;
        assert!(runner.is_running());

        let mut transcript = Transcript::new();
        let err = runner
            .send(
                &executable_workflow(),
                &mut transcript,
                &SessionId::new(),
                "second",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FlowforgeError::RunInProgress));
        // Rejected turn leaves no trace.
        assert!(transcript.messages().is_empty());

        release.notify_one();
        let first_transcript = first.await.unwrap().unwrap();
        assert_eq!(first_transcript.messages().len(), 2);
        assert!(!runner.is_running());
    }

    #[tokio::test]
    async fn test_cancelled_run_reports_cancelled() {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let backend = BlockingBackend {
            entered: entered.clone(),
            release: release.clone(),
        };
        let runner = Arc::new(
            TestRunner::new(Arc::new(backend), Arc::new(EventBus::default()))
                .with_streaming(false),
        );
        let cancel = runner.cancel_token();

        let run = {
            let runner = runner.clone();
            tokio::spawn(async move {
                let mut transcript = Transcript::new();
                let result = runner
                    .send(
                        &executable_workflow(),
                        &mut transcript,
                        &SessionId::new(),
                        "hi",
                    )
                    .await;
                (result, transcript)
            })
        };

        entered.notified().await;
        cancel.cancel();

        let (result, transcript) = run.await.unwrap();
        assert!(matches!(result, Err(FlowforgeError::Cancelled)));
        let last = transcript.messages().last().unwrap();
        assert_eq!(last.role, Role::Error);
        assert!(!runner.is_running());
    }
}
