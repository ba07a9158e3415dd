//! Message sources feeding a dispatcher.
//!
//! A source hands out raw, still-encoded messages in batches. Decoding happens
//! in the dispatcher so that a malformed message is dropped there instead of
//! failing the whole receive.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Errors from [`OperationSource::receive`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    /// Nothing arrived within the receive timeout.
    #[error("receive timed out")]
    Timeout,
    /// Every publisher is gone; no message will ever arrive.
    #[error("source closed")]
    Closed,
    #[error("receive failed: {0}")]
    Other(String),
}

/// An encoded message as taken off a topic.
#[derive(Clone, PartialEq, Eq)]
pub struct RawMessage {
    /// Assigned at publish time, used to correlate logs.
    pub id: Uuid,
    pub body: Vec<u8>,
}

impl fmt::Debug for RawMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawMessage")
            .field("id", &self.id)
            .field("len", &self.body.len())
            .finish()
    }
}

/// A topic subscription polled by the dispatcher.
#[async_trait]
pub trait OperationSource: Send + 'static {
    /// Waits up to `timeout` for at least one message and returns what is
    /// available, never an empty batch.
    ///
    /// Must be cancel-safe: dropping the future loses no message.
    async fn receive(&mut self, timeout: Duration) -> Result<Vec<RawMessage>, SourceError>;
}

/// Creates a connected in-process publisher/source pair.
///
/// `capacity` bounds the messages buffered between publish and receive;
/// `batch_size` caps how many messages one `receive` returns.
#[must_use]
pub fn channel(topic: &'static str, capacity: usize, batch_size: usize) -> (ChannelPublisher, ChannelSource) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        ChannelPublisher { topic, tx },
        ChannelSource {
            rx,
            batch_size: batch_size.max(1),
        },
    )
}

/// Publishing side of an in-process topic.
#[derive(Debug, Clone)]
pub struct ChannelPublisher {
    topic: &'static str,
    tx: mpsc::Sender<RawMessage>,
}

impl ChannelPublisher {
    #[must_use]
    pub fn topic(&self) -> &'static str {
        self.topic
    }

    /// Publishes `body`, waiting for buffer space. Returns the message id.
    ///
    /// # Errors
    ///
    /// `SourceError::Closed` once the source has been dropped.
    pub async fn publish(&self, body: Vec<u8>) -> Result<Uuid, SourceError> {
        let id = Uuid::new_v4();
        self.tx
            .send(RawMessage { id, body })
            .await
            .map_err(|_| SourceError::Closed)?;
        Ok(id)
    }

    /// Serializes `message` as JSON and publishes it.
    ///
    /// # Errors
    ///
    /// `SourceError::Other` when encoding fails, `Closed` as for `publish`.
    pub async fn publish_json<T: serde::Serialize + Sync>(
        &self,
        message: &T,
    ) -> Result<Uuid, SourceError> {
        let body = serde_json::to_vec(message).map_err(|e| SourceError::Other(e.to_string()))?;
        self.publish(body).await
    }
}

/// Receiving side of an in-process topic.
#[derive(Debug)]
pub struct ChannelSource {
    rx: mpsc::Receiver<RawMessage>,
    batch_size: usize,
}

#[async_trait]
impl OperationSource for ChannelSource {
    async fn receive(&mut self, timeout: Duration) -> Result<Vec<RawMessage>, SourceError> {
        let first = match tokio::time::timeout(timeout, self.rx.recv()).await {
            Err(_) => return Err(SourceError::Timeout),
            Ok(None) => return Err(SourceError::Closed),
            Ok(Some(message)) => message,
        };
        let mut batch = Vec::with_capacity(self.batch_size);
        batch.push(first);
        while batch.len() < self.batch_size {
            match self.rx.try_recv() {
                Ok(message) => batch.push(message),
                Err(_) => break,
            }
        }
        Ok(batch)
    }
}
