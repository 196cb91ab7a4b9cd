//! Event channel shared by the user and email services.
//!
//! The channel is durable and at-least-once: a delivered message stays
//! owned by the channel until the consumer acknowledges it, and messages
//! that are never acknowledged become deliverable again after a
//! visibility timeout. Ordering holds per producer only and nothing is
//! deduplicated, so consumers must be idempotent.
//!
//! Two backends are provided:
//! - [`RedisStreamChannel`]: Redis Streams with consumer groups
//! - [`MemoryChannel`]: in-process queue for single-process runs and tests

mod channel;
mod memory;
mod redis_stream;

pub use channel::{Acknowledger, Delivery, EventChannel, MessageId, Subscription};
pub use memory::MemoryChannel;
pub use redis_stream::RedisStreamChannel;

#[cfg(any(test, feature = "test-utils"))]
pub use channel::MockEventChannel;

use std::sync::Arc;

use common::{AppResult, ChannelConfig};

/// Connect the backend selected by `config.url`.
///
/// `group` names the consumer group subscriptions join; producers pass
/// their own service name.
pub async fn connect(config: &ChannelConfig, group: &str) -> AppResult<Arc<dyn EventChannel>> {
    if config.is_in_memory() {
        tracing::warn!("Using in-process event channel, messages do not survive restarts");
        let channel = MemoryChannel::with_visibility_timeout(std::time::Duration::from_millis(
            config.visibility_timeout_ms,
        ));
        return Ok(Arc::new(channel));
    }

    let channel = RedisStreamChannel::connect(config, group).await?;
    Ok(Arc::new(channel))
}
