//! In-process event channel.
//!
//! Mirrors the Redis backend's semantics inside one process: consumers of a
//! topic share a single queue, deliveries stay in flight until settled, and
//! in-flight messages older than the visibility timeout are handed out
//! again. Nothing survives a restart.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Notify;

use common::AppResult;
use domain::dead_letter_topic;

use crate::channel::{Acknowledger, Delivery, EventChannel, MessageId, Subscription};

/// Default visibility timeout for unacknowledged deliveries
const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound on how long an idle consumer sleeps between checks
const MAX_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// In-process channel. Clones share the same queues.
#[derive(Clone)]
pub struct MemoryChannel {
    inner: Arc<Inner>,
}

struct Inner {
    topics: Mutex<HashMap<String, Topic>>,
    notify: Notify,
    visibility_timeout: Duration,
}

#[derive(Default)]
struct Topic {
    next_seq: u64,
    ready: VecDeque<Stored>,
    in_flight: HashMap<MessageId, InFlight>,
}

#[derive(Clone)]
struct Stored {
    id: MessageId,
    payload: Vec<u8>,
    deliveries: u32,
}

struct InFlight {
    message: Stored,
    delivered_at: Instant,
}

impl Topic {
    fn push(&mut self, payload: Vec<u8>) -> MessageId {
        self.next_seq += 1;
        let id = format!("{}-0", self.next_seq);
        self.ready.push_back(Stored {
            id: id.clone(),
            payload,
            deliveries: 0,
        });
        id
    }

    fn requeue_expired(&mut self, timeout: Duration) {
        let expired: Vec<MessageId> = self
            .in_flight
            .iter()
            .filter(|(_, entry)| entry.delivered_at.elapsed() >= timeout)
            .map(|(id, _)| id.clone())
            .collect();

        for id in expired {
            if let Some(entry) = self.in_flight.remove(&id) {
                tracing::debug!(id = %id, "Visibility timeout elapsed, requeueing");
                self.ready.push_back(entry.message);
            }
        }
    }

    fn take(&mut self) -> Option<Stored> {
        let mut message = self.ready.pop_front()?;
        message.deliveries += 1;
        self.in_flight.insert(
            message.id.clone(),
            InFlight {
                message: message.clone(),
                delivered_at: Instant::now(),
            },
        );
        Some(message)
    }

    /// Remove a message wherever it currently sits
    fn remove(&mut self, id: &str) -> Option<Stored> {
        if let Some(entry) = self.in_flight.remove(id) {
            return Some(entry.message);
        }
        let position = self.ready.iter().position(|m| m.id == id)?;
        self.ready.remove(position)
    }
}

impl Default for MemoryChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryChannel {
    /// Create a channel with the default visibility timeout
    pub fn new() -> Self {
        Self::with_visibility_timeout(DEFAULT_VISIBILITY_TIMEOUT)
    }

    /// Create a channel whose unacknowledged deliveries reappear after `timeout`
    pub fn with_visibility_timeout(timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                topics: Mutex::new(HashMap::new()),
                notify: Notify::new(),
                visibility_timeout: timeout,
            }),
        }
    }

    /// Payloads waiting to be delivered on `topic`
    pub fn ready_payloads(&self, topic: &str) -> Vec<Vec<u8>> {
        self.inner
            .topics()
            .get(topic)
            .map(|t| t.ready.iter().map(|m| m.payload.clone()).collect())
            .unwrap_or_default()
    }

    /// Deliveries handed out but not yet settled on `topic`
    pub fn in_flight_count(&self, topic: &str) -> usize {
        self.inner
            .topics()
            .get(topic)
            .map(|t| t.in_flight.len())
            .unwrap_or(0)
    }

    fn try_take(&self, topic: &str) -> Option<Delivery> {
        let message = {
            let mut topics = self.inner.topics();
            let state = topics.entry(topic.to_string()).or_default();
            state.requeue_expired(self.inner.visibility_timeout);
            state.take()?
        };

        Some(Delivery::new(
            message.id,
            topic,
            message.payload,
            message.deliveries,
            self.inner.clone(),
        ))
    }

    async fn next_delivery(&self, topic: &str) -> Delivery {
        let poll_interval = self.inner.visibility_timeout.min(MAX_POLL_INTERVAL);
        loop {
            // Registered before checking so a publish in between is not missed
            let notified = self.inner.notify.notified();
            if let Some(delivery) = self.try_take(topic) {
                return delivery;
            }
            let _ = tokio::time::timeout(poll_interval, notified).await;
        }
    }
}

impl Inner {
    fn topics(&self) -> MutexGuard<'_, HashMap<String, Topic>> {
        self.topics.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish_to(&self, topic: &str, payload: Vec<u8>) -> MessageId {
        let id = self
            .topics()
            .entry(topic.to_string())
            .or_default()
            .push(payload);
        self.notify.notify_waiters();
        id
    }
}

#[async_trait]
impl EventChannel for MemoryChannel {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> AppResult<MessageId> {
        let id = self.inner.publish_to(topic, payload);
        tracing::debug!(topic = %topic, id = %id, "Message published");
        Ok(id)
    }

    async fn subscribe(&self, topic: &str, consumer: &str) -> AppResult<Subscription> {
        tracing::debug!(topic = %topic, consumer = %consumer, "Subscribed to in-process channel");

        let stream = futures::stream::unfold(
            (self.clone(), topic.to_string()),
            |(channel, topic)| async move {
                let delivery = channel.next_delivery(&topic).await;
                Some((Ok(delivery), (channel, topic)))
            },
        );

        Ok(Subscription::new(stream))
    }

    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }
}

#[async_trait]
impl Acknowledger for Inner {
    async fn ack(&self, topic: &str, id: &str) -> AppResult<()> {
        if let Some(state) = self.topics().get_mut(topic) {
            state.remove(id);
        }
        Ok(())
    }

    async fn nack(&self, topic: &str, id: &str) -> AppResult<()> {
        {
            let mut topics = self.topics();
            if let Some(state) = topics.get_mut(topic) {
                if let Some(entry) = state.in_flight.remove(id) {
                    state.ready.push_front(entry.message);
                }
            }
        }
        self.notify.notify_waiters();
        Ok(())
    }

    async fn dead_letter(
        &self,
        topic: &str,
        id: &str,
        payload: &[u8],
        reason: &str,
    ) -> AppResult<()> {
        let target = dead_letter_topic(topic);
        self.publish_to(&target, payload.to_vec());
        tracing::warn!(topic = %topic, id = %id, reason = %reason, "Message dead-lettered");
        self.ack(topic, id).await
    }
}
