use futures_util::{Stream, StreamExt};
use serde::Serialize;
use serde_json::Value;
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::{CancellationToken, DropGuard};
use uuid::Uuid;

use super::events::{RelayEvent, final_chunk};
use super::prompts::prepare_messages;
use super::task::Task;
use crate::analysis::{ExtractionResult, ResultExtractor};
use crate::config::Config;
use crate::error::{AnalysisError, ErrorKind};
use crate::persistence::{PersistenceSink, ProblemStore, SaveOutcome};
use crate::providers::{
    Connected, HealthTracker, ProviderConfig, ProviderRegistry, ProviderSelector,
    RequestDispatcher, adapter_for,
};
use crate::stream::{DecodedChunk, SessionStatus, StreamSession, decode_stream};

/// Events buffered between the session task and a slow reader.
const RELAY_BUFFER: usize = 64;

/// Final report of one session, available after its stream has ended.
#[derive(Debug, Clone, Serialize)]
pub struct SessionOutcome {
    pub session_id: String,
    pub task_id: String,
    pub status: SessionStatus,
    pub provider_used: Option<String>,
    pub failure: Option<ErrorKind>,
    pub answer: String,
    pub reasoning: String,
    pub extraction: Option<ExtractionResult>,
    pub save: Option<SaveOutcome>,
}

impl SessionOutcome {
    fn new(
        session: &StreamSession,
        extraction: Option<ExtractionResult>,
        save: Option<SaveOutcome>,
    ) -> Self {
        Self {
            session_id: session.session_id.to_string(),
            task_id: session.task_id.clone(),
            status: session.status(),
            provider_used: session.provider_used().map(str::to_string),
            failure: session.failure(),
            answer: session.accumulator.answer().to_string(),
            reasoning: session.accumulator.reasoning().to_string(),
            extraction,
            save,
        }
    }
}

/// Caller side of a running session.
///
/// Dropping it cancels the session: the upstream request is abandoned and
/// nothing is persisted.
pub struct RelayStream {
    inner: ReceiverStream<RelayEvent>,
    _cancel_on_drop: DropGuard,
}

impl Stream for RelayStream {
    type Item = RelayEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

pub struct AnalysisHandle {
    pub session_id: Uuid,
    pub task_id: String,
    pub events: RelayStream,
    pub outcome: JoinHandle<SessionOutcome>,
}

impl AnalysisHandle {
    /// `text/event-stream` frames, ready for an HTTP body.
    pub fn into_sse(self) -> impl Stream<Item = Result<String, Infallible>> + Send {
        self.events.map(|event| Ok(event.to_sse()))
    }
}

enum StreamEnd {
    Finished,
    Cancelled,
    Failed(String),
}

/// Runs tasks end to end: selection, dispatch, decoding, accumulation,
/// extraction and write-back. Each task gets its own spawned session.
pub struct AnalysisEngine {
    registry: Arc<ProviderRegistry>,
    health: Arc<HealthTracker>,
    selector: ProviderSelector,
    dispatcher: RequestDispatcher,
    extractor: ResultExtractor,
    sink: Option<PersistenceSink>,
}

impl AnalysisEngine {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        health: Arc<HealthTracker>,
        config: &Config,
    ) -> Self {
        let reliability = &config.reliability;
        Self {
            selector: ProviderSelector::new(
                Arc::clone(&registry),
                Arc::clone(&health),
                reliability.demote_after_failures,
            ),
            dispatcher: RequestDispatcher::new(
                Arc::clone(&health),
                reliability.base_backoff_ms,
                reliability.max_backoff_ms,
            ),
            extractor: ResultExtractor::new(config.extraction.solution_max_chars),
            registry,
            health,
            sink: None,
        }
    }

    /// Write completed results back to `store`.
    pub fn with_store(mut self, store: Arc<dyn ProblemStore>) -> Self {
        self.sink = Some(PersistenceSink::new(store));
        self
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn health(&self) -> &Arc<HealthTracker> {
        &self.health
    }

    pub fn selector(&self) -> &ProviderSelector {
        &self.selector
    }

    /// Select a failover chain and spawn the session.
    ///
    /// Selection happens before anything is spawned, so a capability no
    /// provider offers fails here without any network traffic.
    pub fn start(self: &Arc<Self>, task: Task) -> Result<AnalysisHandle, AnalysisError> {
        let chain = self.selector.select(task.required_capability)?;

        let session = StreamSession::new(task.task_id.clone());
        let session_id = session.session_id;
        let task_id = task.task_id.clone();
        let (tx, rx) = mpsc::channel(RELAY_BUFFER);
        let cancel = CancellationToken::new();

        tracing::info!(
            session_id = %session_id,
            task_id = task_id.as_str(),
            capability = %task.required_capability,
            candidates = chain.len(),
            "analysis session started"
        );

        let engine = Arc::clone(self);
        let outcome = tokio::spawn(engine.run(task, chain, session, tx, cancel.clone()));

        Ok(AnalysisHandle {
            session_id,
            task_id,
            events: RelayStream {
                inner: ReceiverStream::new(rx),
                _cancel_on_drop: cancel.drop_guard(),
            },
            outcome,
        })
    }

    async fn run(
        self: Arc<Self>,
        task: Task,
        chain: Vec<ProviderConfig>,
        mut session: StreamSession,
        tx: mpsc::Sender<RelayEvent>,
        cancel: CancellationToken,
    ) -> SessionOutcome {
        let messages = prepare_messages(&task);

        let connected = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            result = self.dispatcher.connect(&chain, &messages) => Some(result),
        };
        let Connected { provider, response } = match connected {
            None => return cancelled(&mut session),
            Some(Err(e)) => {
                tracing::warn!(
                    session_id = %session.session_id,
                    error = %e,
                    "no provider opened a stream"
                );
                session.fail(e.kind());
                emit(&tx, RelayEvent::error(e.kind(), e.to_string())).await;
                emit(&tx, RelayEvent::Done).await;
                return SessionOutcome::new(&session, None, None);
            }
            Some(Ok(connected)) => connected,
        };

        session.begin_streaming(&provider.id);
        let adapter = adapter_for(provider.kind);
        let context = task.extraction_context();
        let started = Instant::now();
        let mut extraction = None;
        let mut chunks = Box::pin(decode_stream(response.bytes_stream()));

        let end = loop {
            let item = tokio::select! {
                biased;
                () = cancel.cancelled() => break StreamEnd::Cancelled,
                item = chunks.next() => item,
            };
            let value = match item {
                None | Some(Ok(DecodedChunk::Done)) => break StreamEnd::Finished,
                Some(Err(e)) => break StreamEnd::Failed(e.to_string()),
                Some(Ok(DecodedChunk::Data(value) | DecodedChunk::Placeholder(value))) => value,
            };

            let delta = adapter.parse_chunk(&value);
            let mut relay = adapter.relay_value(value, &delta, &provider);
            if let Some(completion) = session.accumulator.push(&delta) {
                tracing::debug!(
                    session_id = %session.session_id,
                    ?completion,
                    "answer complete"
                );
                let result = self.extractor.extract(session.accumulator.answer(), &context);
                attach_result(&mut relay, &result);
                extraction = Some(result);
            }
            if !emit(&tx, RelayEvent::Chunk(relay)).await {
                break StreamEnd::Cancelled;
            }
        };
        // Releases the upstream connection.
        drop(chunks);

        match end {
            StreamEnd::Finished => {}
            StreamEnd::Cancelled => return cancelled(&mut session),
            StreamEnd::Failed(message) => {
                tracing::warn!(
                    session_id = %session.session_id,
                    provider = provider.id.as_str(),
                    error = message.as_str(),
                    "upstream stream broke mid-response"
                );
                self.health
                    .record_failure(&provider.id, started.elapsed(), &message);
                session.fail(ErrorKind::ConnectionError);
                emit(&tx, RelayEvent::error(ErrorKind::ConnectionError, message)).await;
                emit(&tx, RelayEvent::Done).await;
                return SessionOutcome::new(&session, None, None);
            }
        }

        let result = match extraction {
            Some(result) => result,
            None => {
                session.accumulator.finish();
                let result = self.extractor.extract(session.accumulator.answer(), &context);
                let mut chunk = final_chunk(&provider.model);
                attach_result(&mut chunk, &result);
                if !emit(&tx, RelayEvent::Chunk(chunk)).await {
                    return cancelled(&mut session);
                }
                result
            }
        };

        if cancel.is_cancelled() {
            return cancelled(&mut session);
        }
        session.complete();
        tracing::info!(
            session_id = %session.session_id,
            provider = provider.id.as_str(),
            answer_chars = session.accumulator.answer().chars().count(),
            confidence = ?result.extraction_confidence,
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "analysis completed"
        );

        let save = match (task.problem_id, &self.sink) {
            (Some(problem_id), Some(sink)) => Some(sink.save(problem_id, &result).await),
            _ => None,
        };
        if let Some(outcome) = &save {
            emit(&tx, RelayEvent::SaveResult(outcome.clone())).await;
        }
        emit(&tx, RelayEvent::Done).await;

        SessionOutcome::new(&session, Some(result), save)
    }
}

fn cancelled(session: &mut StreamSession) -> SessionOutcome {
    tracing::warn!(
        session_id = %session.session_id,
        status = %session.status(),
        "client disconnected; upstream request abandoned"
    );
    session.fail(ErrorKind::ClientCancelled);
    SessionOutcome::new(session, None, None)
}

/// False once the reader is gone.
async fn emit(tx: &mpsc::Sender<RelayEvent>, event: RelayEvent) -> bool {
    tx.send(event).await.is_ok()
}

fn attach_result(chunk: &mut Value, result: &ExtractionResult) {
    if let (Some(object), Ok(value)) = (chunk.as_object_mut(), serde_json::to_value(result)) {
        object.insert("result_object".into(), value);
    }
}
