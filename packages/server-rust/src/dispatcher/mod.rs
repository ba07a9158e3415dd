//! Bus consumer dispatching decoded messages to per-kind processing loops.
//!
//! One polling loop drains the [`OperationSource`] and routes each message to
//! the unbounded channel of its kind. One processing loop per kind handles
//! its messages strictly in arrival order, so a slow kind never holds up the
//! poller or the other kinds. There is no ordering across kinds.
//!
//! The per-kind channels are unbounded: while one kind's handler is stalled,
//! its backlog keeps growing in memory for as long as the source delivers.
//! The backlog of every kind is exported as the [`QUEUE_DEPTH`] gauge.
//!
//! Handler failures are logged and counted, never propagated: the loops only
//! stop when the dispatcher's cancellation token fires.

pub mod handlers;
pub mod source;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use netplane_core::{ErrorKind, KindedMessage, ServiceResult};
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

pub use handlers::{ApplicationEventsHandler, NetworkOpsHandler};
pub use source::{channel, ChannelPublisher, ChannelSource, OperationSource, RawMessage, SourceError};

/// Counter of processed messages, labelled by topic, kind, and outcome.
pub const DISPATCHED_TOTAL: &str = "netplane_dispatched_total";
/// Gauge of messages routed to a kind but not yet picked up by its loop.
pub const QUEUE_DEPTH: &str = "netplane_dispatch_queue_depth";

/// Handles the decoded messages of one topic.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    type Message: KindedMessage + DeserializeOwned + fmt::Debug;

    /// Topic name used in logs and metrics.
    fn topic(&self) -> &'static str;

    async fn handle(&self, message: Self::Message) -> ServiceResult<()>;
}

/// Timing and batching knobs of a dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Upper bound of one receive call. Expiry just starts the next one.
    pub receive_timeout: Duration,
    /// Pause after a failed receive before polling again.
    pub error_backoff: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            receive_timeout: Duration::from_secs(60 * 60),
            error_backoff: Duration::from_secs(1),
        }
    }
}

struct Envelope<M> {
    id: Uuid,
    message: M,
}

fn record(topic: &'static str, kind: &'static str, outcome: &'static str) {
    metrics::counter!(DISPATCHED_TOTAL, "topic" => topic, "kind" => kind, "outcome" => outcome)
        .increment(1);
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Consumes one topic on behalf of a [`MessageHandler`].
pub struct Dispatcher<H: MessageHandler> {
    handler: Arc<H>,
    config: DispatcherConfig,
}

impl<H: MessageHandler> fmt::Debug for Dispatcher<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("topic", &self.handler.topic())
            .field("config", &self.config)
            .finish()
    }
}

impl<H: MessageHandler> Dispatcher<H> {
    #[must_use]
    pub fn new(handler: Arc<H>, config: DispatcherConfig) -> Self {
        Self { handler, config }
    }

    /// Spawns one processing loop per message kind and the polling loop.
    pub fn start<S: OperationSource>(self, source: S) -> DispatcherHandle {
        let token = CancellationToken::new();
        let topic = self.handler.topic();
        let mut senders = HashMap::new();
        let mut tasks = Vec::with_capacity(H::Message::KINDS.len() + 1);

        for &kind in H::Message::KINDS {
            let (tx, rx) = mpsc::unbounded_channel();
            senders.insert(kind, tx);
            tasks.push(tokio::spawn(process_loop(
                Arc::clone(&self.handler),
                kind,
                rx,
                token.clone(),
            )));
        }
        tasks.push(tokio::spawn(poll_loop::<H::Message, S>(
            topic,
            source,
            senders,
            self.config,
            token.clone(),
        )));

        info!(topic, kinds = H::Message::KINDS.len(), "dispatcher started");
        DispatcherHandle { topic, token, tasks }
    }
}

// ---------------------------------------------------------------------------
// DispatcherHandle
// ---------------------------------------------------------------------------

/// Owner of a running dispatcher's tasks.
pub struct DispatcherHandle {
    topic: &'static str,
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl fmt::Debug for DispatcherHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatcherHandle")
            .field("topic", &self.topic)
            .field("tasks", &self.tasks.len())
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}

impl DispatcherHandle {
    #[must_use]
    pub fn topic(&self) -> &'static str {
        self.topic
    }

    /// Cancels every loop and waits for all of them to exit. A message being
    /// handled when this is called is finished first.
    pub async fn shutdown(self) {
        self.token.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                error!(topic = self.topic, error = %e, "dispatcher task panicked");
            }
        }
        info!(topic = self.topic, "dispatcher stopped");
    }
}

// ---------------------------------------------------------------------------
// Loops
// ---------------------------------------------------------------------------

async fn poll_loop<M, S>(
    topic: &'static str,
    mut source: S,
    senders: HashMap<&'static str, mpsc::UnboundedSender<Envelope<M>>>,
    config: DispatcherConfig,
    token: CancellationToken,
) where
    M: KindedMessage + DeserializeOwned,
    S: OperationSource,
{
    loop {
        let received = tokio::select! {
            biased;
            () = token.cancelled() => break,
            received = source.receive(config.receive_timeout) => received,
        };

        match received {
            Ok(batch) => {
                for raw in batch {
                    route(topic, &senders, raw);
                }
            }
            Err(SourceError::Timeout) => {
                debug!(topic, "receive timed out, polling again");
            }
            Err(e) => {
                error!(topic, error = %e, "receive failed");
                tokio::select! {
                    () = token.cancelled() => break,
                    () = tokio::time::sleep(config.error_backoff) => {}
                }
            }
        }
    }
    debug!(topic, "poll loop exited");
}

fn route<M: KindedMessage + DeserializeOwned>(
    topic: &'static str,
    senders: &HashMap<&'static str, mpsc::UnboundedSender<Envelope<M>>>,
    raw: RawMessage,
) {
    let message: M = match serde_json::from_slice(&raw.body) {
        Ok(message) => message,
        Err(e) => {
            warn!(topic, message_id = %raw.id, error = %e, "dropping undecodable message");
            record(topic, "unknown", "dropped");
            return;
        }
    };
    let kind = message.kind();
    let Some(tx) = senders.get(kind) else {
        warn!(topic, kind, message_id = %raw.id, "no loop for message kind, dropping");
        record(topic, kind, "dropped");
        return;
    };
    if tx.send(Envelope { id: raw.id, message }).is_err() {
        warn!(topic, kind, message_id = %raw.id, "processing loop gone, dropping");
        record(topic, kind, "dropped");
        return;
    }
    metrics::gauge!(QUEUE_DEPTH, "topic" => topic, "kind" => kind).increment(1.0);
}

async fn process_loop<H: MessageHandler>(
    handler: Arc<H>,
    kind: &'static str,
    mut rx: mpsc::UnboundedReceiver<Envelope<H::Message>>,
    token: CancellationToken,
) {
    let topic = handler.topic();
    loop {
        let next = tokio::select! {
            biased;
            () = token.cancelled() => break,
            next = rx.recv() => next,
        };
        let Some(envelope) = next else { break };
        metrics::gauge!(QUEUE_DEPTH, "topic" => topic, "kind" => kind).decrement(1.0);
        process(handler.as_ref(), topic, kind, envelope).await;
    }
    debug!(topic, kind, "processing loop exited");
}

async fn process<H: MessageHandler>(
    handler: &H,
    topic: &'static str,
    kind: &'static str,
    envelope: Envelope<H::Message>,
) {
    let span = info_span!(
        "dispatch",
        topic,
        kind,
        message_id = %envelope.id,
        duration_ms = tracing::field::Empty,
    );
    async {
        let start = Instant::now();
        let result = handler.handle(envelope.message).await;
        #[allow(clippy::cast_possible_truncation)]
        let duration_ms = start.elapsed().as_millis() as u64;
        tracing::Span::current().record("duration_ms", duration_ms);

        let outcome = match result {
            Ok(()) => {
                debug!("message handled");
                "ok"
            }
            Err(e) if e.is(ErrorKind::Unimplemented) => {
                warn!(error = %e, "unimplemented operation, message dropped");
                "unimplemented"
            }
            Err(e) => {
                error!(error = %e, error_kind = %e.kind, "message handling failed");
                "error"
            }
        };
        record(topic, kind, outcome);
    }
    .instrument(span)
    .await;
}
