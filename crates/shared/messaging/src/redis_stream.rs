//! Redis Streams event channel.
//!
//! Each topic is a stream. Subscribers join a consumer group, so every
//! entry goes to one consumer of the group and stays in the group's
//! pending list until `XACK`. Entries left pending longer than the
//! visibility timeout (consumer crashed, or nacked) are taken over with
//! `XAUTOCLAIM` and delivered again.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::streams::{
    StreamAutoClaimOptions, StreamAutoClaimReply, StreamId, StreamPendingCountReply,
    StreamReadOptions, StreamReadReply,
};
use redis::{AsyncCommands, Client, RedisResult};

use common::{AppResult, ChannelConfig};
use domain::dead_letter_topic;

use crate::channel::{Acknowledger, Delivery, EventChannel, MessageId, Subscription};

/// Stream entry field holding the message body
const PAYLOAD_FIELD: &str = "payload";

/// Start of the pending list, and the cursor Redis returns once a scan is complete
const SCAN_START: &str = "0-0";

/// Pause after a failed read before the stream yields the error
const READ_ERROR_BACKOFF: Duration = Duration::from_millis(500);

/// Redis Streams backed channel.
#[derive(Clone)]
pub struct RedisStreamChannel {
    client: Client,
    connection: ConnectionManager,
    group: String,
    config: ChannelConfig,
}

impl RedisStreamChannel {
    /// Connect to Redis. `group` is the consumer group subscriptions join.
    pub async fn connect(config: &ChannelConfig, group: &str) -> AppResult<Self> {
        let client = Client::open(config.url.as_str())?;
        let connection = ConnectionManager::new(client.clone()).await?;

        tracing::info!(group = %group, "Redis event channel connected");

        Ok(Self {
            client,
            connection,
            group: group.to_string(),
            config: config.clone(),
        })
    }

    async fn ensure_group(&self, topic: &str) -> AppResult<()> {
        let mut conn = self.connection.clone();
        let created: RedisResult<()> = conn.xgroup_create_mkstream(topic, &self.group, "0").await;

        match created {
            Ok(()) => {
                tracing::info!(topic = %topic, group = %self.group, "Consumer group created");
                Ok(())
            }
            Err(e) if e.code() == Some("BUSYGROUP") => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl EventChannel for RedisStreamChannel {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> AppResult<MessageId> {
        let mut conn = self.connection.clone();
        let id: String = conn
            .xadd(topic, "*", &[(PAYLOAD_FIELD, payload.as_slice())])
            .await?;

        tracing::debug!(topic = %topic, id = %id, "Message published");
        Ok(id)
    }

    async fn subscribe(&self, topic: &str, consumer: &str) -> AppResult<Subscription> {
        self.ensure_group(topic).await?;

        // Blocking reads get their own connection so acks and publishes
        // on the shared one are not queued behind them.
        let reader_conn = ConnectionManager::new(self.client.clone()).await?;

        let reader = StreamReader {
            connection: reader_conn,
            acker: Arc::new(RedisAcker {
                connection: self.connection.clone(),
                group: self.group.clone(),
            }),
            topic: topic.to_string(),
            group: self.group.clone(),
            consumer: consumer.to_string(),
            config: self.config.clone(),
            buffer: VecDeque::new(),
            claim_cursor: ClaimCursor::default(),
        };

        tracing::info!(topic = %topic, group = %self.group, consumer = %consumer, "Subscribed");

        let stream = futures::stream::unfold(reader, |mut reader| async move {
            let item = reader.next_delivery().await;
            Some((item, reader))
        });

        Ok(Subscription::new(stream))
    }

    async fn ping(&self) -> AppResult<()> {
        let mut conn = self.connection.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

/// Per-subscription read state.
struct StreamReader {
    connection: ConnectionManager,
    acker: Arc<RedisAcker>,
    topic: String,
    group: String,
    consumer: String,
    config: ChannelConfig,
    buffer: VecDeque<Delivery>,
    claim_cursor: ClaimCursor,
}

/// Position of the `XAUTOCLAIM` scan over the pending list.
///
/// Each call resumes where the previous one stopped, so stale entries deep
/// in a long pending list are reached without rescanning its head.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ClaimCursor(String);

impl Default for ClaimCursor {
    fn default() -> Self {
        Self(SCAN_START.to_string())
    }
}

impl ClaimCursor {
    fn position(&self) -> &str {
        &self.0
    }

    /// Move to the cursor Redis returned; a completed scan starts over
    fn advance(&mut self, next: &str) {
        self.0 = if next.is_empty() {
            SCAN_START.to_string()
        } else {
            next.to_string()
        };
    }
}

impl StreamReader {
    async fn next_delivery(&mut self) -> AppResult<Delivery> {
        loop {
            if let Some(delivery) = self.buffer.pop_front() {
                return Ok(delivery);
            }

            if let Err(e) = self.fill().await {
                tracing::error!(topic = %self.topic, error = %e, "Stream read failed");
                tokio::time::sleep(READ_ERROR_BACKOFF).await;
                return Err(e.into());
            }
        }
    }

    /// Claim stale pending entries first, then block for new ones.
    async fn fill(&mut self) -> RedisResult<()> {
        self.claim_stale().await?;
        if !self.buffer.is_empty() {
            return Ok(());
        }

        let options = StreamReadOptions::default()
            .group(&self.group, &self.consumer)
            .count(self.config.batch_size)
            .block(usize::try_from(self.config.block_ms).unwrap_or(usize::MAX));

        let reply: Option<StreamReadReply> = self
            .connection
            .xread_options(&[self.topic.as_str()], &[">"], &options)
            .await?;

        for key in reply.map(|r| r.keys).unwrap_or_default() {
            for entry in key.ids {
                self.push(entry, 1);
            }
        }

        Ok(())
    }

    async fn claim_stale(&mut self) -> RedisResult<()> {
        let options = StreamAutoClaimOptions::default().count(self.config.batch_size);
        let reply: StreamAutoClaimReply = self
            .connection
            .xautoclaim_options(
                &self.topic,
                &self.group,
                &self.consumer,
                self.config.visibility_timeout_ms,
                self.claim_cursor.position(),
                options,
            )
            .await?;
        self.claim_cursor.advance(&reply.next_stream_id);

        for entry in reply.claimed {
            let attempt = self.delivery_count(&entry.id).await?;
            tracing::debug!(id = %entry.id, attempt, "Reclaimed stale message");
            self.push(entry, attempt);
        }

        Ok(())
    }

    /// Times the group has delivered `id`, including the current claim
    async fn delivery_count(&mut self, id: &str) -> RedisResult<u32> {
        let reply: StreamPendingCountReply = self
            .connection
            .xpending_count(&self.topic, &self.group, id, id, 1)
            .await?;

        let times = reply.ids.first().map(|p| p.times_delivered).unwrap_or(1);
        Ok(u32::try_from(times).unwrap_or(u32::MAX))
    }

    fn push(&mut self, entry: StreamId, attempt: u32) {
        // Entries without a payload field surface as empty payloads and are
        // rejected by the consumer like any other undecodable message.
        let payload: Vec<u8> = entry.get(PAYLOAD_FIELD).unwrap_or_default();
        self.buffer.push_back(Delivery::new(
            entry.id,
            self.topic.clone(),
            payload,
            attempt,
            self.acker.clone(),
        ));
    }
}

/// Settles deliveries against the consumer group.
struct RedisAcker {
    connection: ConnectionManager,
    group: String,
}

#[async_trait]
impl Acknowledger for RedisAcker {
    async fn ack(&self, topic: &str, id: &str) -> AppResult<()> {
        let mut conn = self.connection.clone();
        let _: i64 = conn.xack(topic, &self.group, &[id]).await?;
        Ok(())
    }

    async fn nack(&self, topic: &str, id: &str) -> AppResult<()> {
        // Left in the pending list; reclaimed once the visibility timeout passes
        tracing::debug!(topic = %topic, id = %id, "Message left pending for redelivery");
        Ok(())
    }

    async fn dead_letter(
        &self,
        topic: &str,
        id: &str,
        payload: &[u8],
        reason: &str,
    ) -> AppResult<()> {
        let mut conn = self.connection.clone();
        let target = dead_letter_topic(topic);
        let _: String = conn
            .xadd(
                &target,
                "*",
                &[
                    (PAYLOAD_FIELD, payload),
                    ("reason", reason.as_bytes()),
                    ("source_id", id.as_bytes()),
                ],
            )
            .await?;

        tracing::warn!(topic = %topic, id = %id, reason = %reason, "Message dead-lettered");
        self.ack(topic, id).await
    }
}
