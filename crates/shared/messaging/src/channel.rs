//! Channel contract: publish, subscribe, acknowledge.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::stream::{BoxStream, Stream};

use common::AppResult;

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

/// Identifier assigned by the channel on publish
pub type MessageId = String;

/// Event channel trait for dependency injection.
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait EventChannel: Send + Sync {
    /// Durably enqueue `payload` on `topic`. Does not wait for consumers.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> AppResult<MessageId>;

    /// Join the consumer group on `topic` as `consumer`.
    ///
    /// The returned stream never ends on its own; transient read failures
    /// are yielded as errors and the stream keeps going.
    async fn subscribe(&self, topic: &str, consumer: &str) -> AppResult<Subscription>;

    /// Check connectivity
    async fn ping(&self) -> AppResult<()>;
}

/// Settles deliveries on behalf of a backend.
#[async_trait]
pub trait Acknowledger: Send + Sync {
    /// Processing succeeded; the message is gone for good
    async fn ack(&self, topic: &str, id: &str) -> AppResult<()>;

    /// Processing failed; the message may be delivered again
    async fn nack(&self, topic: &str, id: &str) -> AppResult<()>;

    /// Move the message to the dead-letter topic and acknowledge it
    async fn dead_letter(&self, topic: &str, id: &str, payload: &[u8], reason: &str)
        -> AppResult<()>;
}

/// A message handed to a consumer, together with its ack handle.
pub struct Delivery {
    id: MessageId,
    topic: String,
    payload: Vec<u8>,
    attempt: u32,
    acker: Arc<dyn Acknowledger>,
}

impl Delivery {
    pub fn new(
        id: MessageId,
        topic: impl Into<String>,
        payload: Vec<u8>,
        attempt: u32,
        acker: Arc<dyn Acknowledger>,
    ) -> Self {
        Self {
            id,
            topic: topic.into(),
            payload,
            attempt,
            acker,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// 1 on first delivery, incremented on every redelivery
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub async fn ack(self) -> AppResult<()> {
        self.acker.ack(&self.topic, &self.id).await
    }

    pub async fn nack(self) -> AppResult<()> {
        self.acker.nack(&self.topic, &self.id).await
    }

    pub async fn dead_letter(self, reason: &str) -> AppResult<()> {
        self.acker
            .dead_letter(&self.topic, &self.id, &self.payload, reason)
            .await
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .field("payload_len", &self.payload.len())
            .field("attempt", &self.attempt)
            .finish()
    }
}

/// Unbounded stream of deliveries for one consumer.
pub struct Subscription {
    inner: BoxStream<'static, AppResult<Delivery>>,
}

impl Subscription {
    pub fn new(stream: impl Stream<Item = AppResult<Delivery>> + Send + 'static) -> Self {
        Self {
            inner: Box::pin(stream),
        }
    }
}

impl Stream for Subscription {
    type Item = AppResult<Delivery>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Subscription")
    }
}
