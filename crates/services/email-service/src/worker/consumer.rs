//! Email consumer - reads notifications from the channel and settles each
//! delivery according to what the notifier made of it.
//!
//! - processed (stored, resumed or duplicate): ack
//! - malformed payload: dead-letter right away, redelivery cannot fix it
//! - any other failure, an unreachable mailer included: nack for
//!   redelivery, dead-letter once the delivery attempt reaches
//!   `max_deliveries`

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use common::{AppError, AppResult};
use messaging::{Delivery, EventChannel};

use crate::config::EmailServiceConfig;
use crate::service::{EmailService, Processed};

/// How a delivery was settled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settled {
    Acked,
    Nacked,
    DeadLettered,
}

/// Consumer of the email notifications topic.
pub struct EmailConsumer {
    channel: Arc<dyn EventChannel>,
    notifier: Arc<dyn EmailService>,
    topic: String,
    max_deliveries: u32,
}

impl EmailConsumer {
    pub fn new(
        channel: Arc<dyn EventChannel>,
        notifier: Arc<dyn EmailService>,
        config: &EmailServiceConfig,
    ) -> Self {
        Self {
            channel,
            notifier,
            topic: config.channel.topic.clone(),
            max_deliveries: config.max_deliveries,
        }
    }

    /// Process one delivery and settle it.
    pub async fn handle(&self, delivery: Delivery) -> AppResult<Settled> {
        let id = delivery.id().to_string();
        let attempt = delivery.attempt();

        let result = self.notifier.on_message(delivery.payload()).await;
        match result {
            Ok(processed) => {
                if processed == Processed::Duplicate {
                    tracing::debug!(id = %id, attempt, "Duplicate delivery acknowledged");
                }
                delivery.ack().await?;
                Ok(Settled::Acked)
            }
            Err(AppError::MalformedPayload(reason)) => {
                tracing::warn!(id = %id, reason = %reason, "Malformed notification");
                delivery.dead_letter(&reason).await?;
                Ok(Settled::DeadLettered)
            }
            Err(e) if attempt >= self.max_deliveries => {
                tracing::error!(id = %id, attempt, error = %e, "Delivery attempts exhausted");
                delivery.dead_letter(&e.to_string()).await?;
                Ok(Settled::DeadLettered)
            }
            Err(e) => {
                tracing::warn!(id = %id, attempt, error = %e, "Notification processing failed, will retry");
                delivery.nack().await?;
                Ok(Settled::Nacked)
            }
        }
    }

    /// Consume as `consumer` until `shutdown` flips to true.
    pub async fn run(&self, consumer: &str, mut shutdown: watch::Receiver<bool>) -> AppResult<()> {
        let mut subscription = self.channel.subscribe(&self.topic, consumer).await?;
        tracing::info!(consumer = %consumer, topic = %self.topic, "Email consumer started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                next = subscription.next() => match next {
                    Some(Ok(delivery)) => {
                        if let Err(e) = self.handle(delivery).await {
                            tracing::error!(consumer = %consumer, error = %e, "Failed to settle delivery");
                        }
                    }
                    Some(Err(e)) => {
                        tracing::warn!(consumer = %consumer, error = %e, "Channel read failed");
                    }
                    None => break,
                },
            }
        }

        tracing::info!(consumer = %consumer, "Email consumer stopped");
        Ok(())
    }

    /// Start `count` consumers, each a distinct member of the group.
    pub fn spawn_pool(
        self: Arc<Self>,
        count: usize,
        shutdown: watch::Receiver<bool>,
    ) -> Vec<JoinHandle<()>> {
        let prefix = format!("{}-{}", crate::SERVICE_NAME, std::process::id());

        (0..count)
            .map(|i| {
                let consumer = self.clone();
                let shutdown = shutdown.clone();
                let name = format!("{}-{}", prefix, i);
                tokio::spawn(async move {
                    if let Err(e) = consumer.run(&name, shutdown).await {
                        tracing::error!(consumer = %name, error = %e, "Email consumer failed");
                    }
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use domain::{dead_letter_topic, EmailMessage, EmailStatus};
    use messaging::MemoryChannel;
    use uuid::Uuid;

    use crate::repository::MemoryEmailStore;
    use crate::service::{EmailNotifier, LogMailer, MailError, MockEmailService, MockMailer};

    const TOPIC: &str = "ms.email";

    fn config() -> EmailServiceConfig {
        EmailServiceConfig {
            max_deliveries: 3,
            ..EmailServiceConfig::in_memory()
        }
    }

    async fn next_delivery(channel: &MemoryChannel) -> Delivery {
        let mut sub = channel.subscribe(TOPIC, "test").await.unwrap();
        tokio::time::timeout(Duration::from_secs(2), sub.next())
            .await
            .expect("timed out waiting for delivery")
            .expect("stream ended")
            .expect("delivery error")
    }

    #[tokio::test]
    async fn test_processed_message_is_acked() {
        let channel = MemoryChannel::new();
        let notifier = Arc::new(EmailNotifier::new(
            Arc::new(MemoryEmailStore::new()),
            Arc::new(LogMailer),
            &config(),
        ));
        let consumer = EmailConsumer::new(Arc::new(channel.clone()), notifier.clone(), &config());

        let message = EmailMessage::new(Uuid::new_v4(), "a@x.com", "Hi", "Body");
        channel.publish(TOPIC, message.encode().unwrap()).await.unwrap();

        let settled = consumer.handle(next_delivery(&channel).await).await.unwrap();

        assert_eq!(settled, Settled::Acked);
        assert_eq!(channel.in_flight_count(TOPIC), 0);
        assert_eq!(notifier.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_message_is_dead_lettered_immediately() {
        let channel = MemoryChannel::new();
        let notifier = Arc::new(EmailNotifier::new(
            Arc::new(MemoryEmailStore::new()),
            Arc::new(LogMailer),
            &config(),
        ));
        let consumer = EmailConsumer::new(Arc::new(channel.clone()), notifier, &config());

        channel.publish(TOPIC, b"garbage".to_vec()).await.unwrap();
        let settled = consumer.handle(next_delivery(&channel).await).await.unwrap();

        assert_eq!(settled, Settled::DeadLettered);
        assert!(channel.ready_payloads(TOPIC).is_empty());
        assert_eq!(
            channel.ready_payloads(&dead_letter_topic(TOPIC)),
            vec![b"garbage".to_vec()]
        );
    }

    #[tokio::test]
    async fn test_infrastructure_failure_retried_then_dead_lettered() {
        let channel = MemoryChannel::new();
        let mut notifier = MockEmailService::new();
        notifier
            .expect_on_message()
            .times(3)
            .returning(|_| Err(AppError::infrastructure("Email store")));
        let consumer = EmailConsumer::new(Arc::new(channel.clone()), Arc::new(notifier), &config());

        let message = EmailMessage::new(Uuid::new_v4(), "a@x.com", "Hi", "Body");
        channel.publish(TOPIC, message.encode().unwrap()).await.unwrap();

        let mut sub = channel.subscribe(TOPIC, "test").await.unwrap();
        let mut outcomes = Vec::new();
        for _ in 0..3 {
            let delivery = tokio::time::timeout(Duration::from_secs(2), sub.next())
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            outcomes.push(consumer.handle(delivery).await.unwrap());
        }

        assert_eq!(
            outcomes,
            vec![Settled::Nacked, Settled::Nacked, Settled::DeadLettered]
        );
        assert_eq!(channel.in_flight_count(TOPIC), 0);
        assert_eq!(channel.ready_payloads(&dead_letter_topic(TOPIC)).len(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_mailer_is_retried_until_sent() {
        let channel = MemoryChannel::new();
        let store = Arc::new(MemoryEmailStore::new());

        let mut sends = 0;
        let mut mailer = MockMailer::new();
        mailer.expect_send().times(2).returning(move |_| {
            sends += 1;
            if sends == 1 {
                Err(MailError::Unavailable("connection refused".to_string()))
            } else {
                Ok(())
            }
        });
        let notifier = Arc::new(EmailNotifier::new(store.clone(), Arc::new(mailer), &config()));
        let consumer = EmailConsumer::new(Arc::new(channel.clone()), notifier.clone(), &config());

        let message = EmailMessage::new(Uuid::new_v4(), "a@x.com", "Hi", "Body");
        channel.publish(TOPIC, message.encode().unwrap()).await.unwrap();

        let mut sub = channel.subscribe(TOPIC, "test").await.unwrap();
        let mut outcomes = Vec::new();
        for _ in 0..2 {
            let delivery = tokio::time::timeout(Duration::from_secs(2), sub.next())
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            outcomes.push(consumer.handle(delivery).await.unwrap());
        }

        assert_eq!(outcomes, vec![Settled::Nacked, Settled::Acked]);
        let records = notifier.list().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, EmailStatus::Sent);
    }

    #[tokio::test]
    async fn test_pool_consumes_until_shutdown() {
        let channel = MemoryChannel::new();
        let store = Arc::new(MemoryEmailStore::new());
        let notifier = Arc::new(EmailNotifier::new(store, Arc::new(LogMailer), &config()));
        let consumer = Arc::new(EmailConsumer::new(
            Arc::new(channel.clone()),
            notifier.clone(),
            &config(),
        ));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handles = consumer.spawn_pool(2, shutdown_rx);

        for i in 0..5 {
            let message = EmailMessage::new(Uuid::new_v4(), format!("u{}@x.com", i), "Hi", "Body");
            channel.publish(TOPIC, message.encode().unwrap()).await.unwrap();
        }

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while notifier.list().await.unwrap().len() < 5 {
            assert!(tokio::time::Instant::now() < deadline, "messages not consumed");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        shutdown_tx.send(true).unwrap();
        for handle in handles {
            tokio::time::timeout(Duration::from_secs(2), handle)
                .await
                .expect("consumer did not stop")
                .unwrap();
        }
    }
}
