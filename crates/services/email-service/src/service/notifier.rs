//! Email notifier - persists one email record per logical message and
//! hands it to the mailer.
//!
//! The channel delivers at least once, so the same message can arrive
//! several times, on several consumers at once. Each message maps to a
//! dedup key and the store accepts one record per key; later copies are
//! reported as [`Processed::Duplicate`] and change nothing, unless the
//! stored record is still pending: then the mailer is tried again.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use common::{AppError, AppResult, OptionExt};
use domain::{EmailMessage, EmailNotification, EmailStatus};

use super::mailer::{MailError, Mailer};
use crate::config::EmailServiceConfig;
use crate::repository::{EmailRepository, Inserted};

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

/// What consuming a message did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Processed {
    /// First delivery of this message; the record was written
    Stored(EmailNotification),
    /// The record from an earlier delivery was still pending and has been
    /// handed to the mailer again
    Resumed(EmailNotification),
    /// A record for this message already existed
    Duplicate,
}

/// Email service trait for dependency injection.
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait EmailService: Send + Sync {
    /// Consume one channel payload.
    ///
    /// `MalformedPayload` when the payload cannot be decoded. Store
    /// failures and an unreachable mailer are infrastructure errors; the
    /// message should be delivered again.
    async fn on_message(&self, payload: &[u8]) -> AppResult<Processed>;

    /// All records, oldest first
    async fn list(&self) -> AppResult<Vec<EmailNotification>>;

    /// Get record by ID
    async fn get(&self, id: Uuid) -> AppResult<EmailNotification>;

    /// Records sent on behalf of one user, oldest first
    async fn list_for_user(&self, user_id: Uuid) -> AppResult<Vec<EmailNotification>>;
}

/// Notifier backed by an email repository and a mailer.
pub struct EmailNotifier {
    repo: Arc<dyn EmailRepository>,
    mailer: Arc<dyn Mailer>,
    default_sender: String,
}

impl EmailNotifier {
    pub fn new(
        repo: Arc<dyn EmailRepository>,
        mailer: Arc<dyn Mailer>,
        config: &EmailServiceConfig,
    ) -> Self {
        Self {
            repo,
            mailer,
            default_sender: config.default_sender.clone(),
        }
    }

    /// Send a freshly stored record and record the outcome
    async fn deliver(&self, mut record: EmailNotification) -> AppResult<EmailNotification> {
        let status = match self.mailer.send(&record).await {
            Ok(()) => EmailStatus::Sent,
            Err(MailError::Rejected(reason)) => {
                tracing::warn!(email_id = %record.id, reason = %reason, "Email rejected");
                EmailStatus::Failed
            }
            // Left pending; the redelivery picks the record up again
            Err(MailError::Unavailable(reason)) => {
                tracing::warn!(email_id = %record.id, reason = %reason, "Mailer unavailable, email left pending");
                return Err(AppError::infrastructure("Mail relay"));
            }
        };

        self.repo.set_status(record.id, status).await?;
        record.status = status;
        Ok(record)
    }
}

#[async_trait]
impl EmailService for EmailNotifier {
    async fn on_message(&self, payload: &[u8]) -> AppResult<Processed> {
        let message = EmailMessage::decode(payload)?;
        let key = message.dedup_key();

        if let Some(existing) = self.repo.find_by_dedup_key(key).await? {
            if existing.status != EmailStatus::Pending {
                tracing::debug!(dedup_key = %key, "Message already processed");
                return Ok(Processed::Duplicate);
            }

            // An earlier delivery stored the record but never settled its status
            tracing::info!(email_id = %existing.id, "Retrying pending email");
            let record = self.deliver(existing).await?;
            return Ok(Processed::Resumed(record));
        }

        let record = EmailNotification::from_message(message, &self.default_sender);
        let record = match self.repo.insert(record).await? {
            Inserted::Created(record) => record,
            // Another consumer stored the same message between lookup and insert
            Inserted::Duplicate => {
                tracing::debug!(dedup_key = %key, "Message stored concurrently");
                return Ok(Processed::Duplicate);
            }
        };

        let record = self.deliver(record).await?;
        tracing::info!(
            email_id = %record.id,
            user_id = %record.user_id,
            status = %record.status,
            "Email record stored"
        );

        Ok(Processed::Stored(record))
    }

    async fn list(&self) -> AppResult<Vec<EmailNotification>> {
        self.repo.list().await
    }

    async fn get(&self, id: Uuid) -> AppResult<EmailNotification> {
        self.repo.find_by_id(id).await?.ok_or_not_found("Email")
    }

    async fn list_for_user(&self, user_id: Uuid) -> AppResult<Vec<EmailNotification>> {
        self.repo.list_for_user(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{MemoryEmailStore, MockEmailRepository};
    use crate::service::{LogMailer, MockMailer};
    use tokio_test::assert_ok;

    fn notifier(repo: Arc<dyn EmailRepository>, mailer: Arc<dyn Mailer>) -> EmailNotifier {
        EmailNotifier::new(repo, mailer, &EmailServiceConfig::in_memory())
    }

    fn payload(message: &EmailMessage) -> Vec<u8> {
        message.encode().unwrap()
    }

    #[tokio::test]
    async fn test_stores_record_as_sent() {
        let store = Arc::new(MemoryEmailStore::new());
        let service = notifier(store.clone(), Arc::new(LogMailer));
        let message = EmailMessage::new(Uuid::new_v4(), "a@x.com", "Hi", "Body");

        let processed = service.on_message(&payload(&message)).await.unwrap();

        let Processed::Stored(record) = processed else {
            panic!("expected a stored record");
        };
        assert_eq!(record.email_to, "a@x.com");
        assert_eq!(record.email_from, "noreply@example.com");
        assert_eq!(record.status, EmailStatus::Sent);
        assert_eq!(store.list().await.unwrap(), vec![record]);
    }

    #[tokio::test]
    async fn test_redelivery_yields_single_record() {
        let store = Arc::new(MemoryEmailStore::new());
        let service = notifier(store.clone(), Arc::new(LogMailer));
        let bytes = payload(&EmailMessage::new(Uuid::new_v4(), "a@x.com", "Hi", "Body"));

        let first = assert_ok!(service.on_message(&bytes).await);
        assert!(matches!(first, Processed::Stored(_)));
        let second = assert_ok!(service.on_message(&bytes).await);
        assert_eq!(second, Processed::Duplicate);
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_redelivery_without_message_id_is_deduplicated() {
        let store = Arc::new(MemoryEmailStore::new());
        let service = notifier(store.clone(), Arc::new(LogMailer));
        let bytes = format!(
            r#"{{"userId":"{}","emailTo":"a@x.com","subject":"Hi","text":"Body","sentAt":"2024-05-01T10:00:00Z"}}"#,
            Uuid::new_v4()
        );

        service.on_message(bytes.as_bytes()).await.unwrap();
        service.on_message(bytes.as_bytes()).await.unwrap();

        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_redeliveries_store_once() {
        let store = Arc::new(MemoryEmailStore::new());
        let service = Arc::new(notifier(store.clone(), Arc::new(LogMailer)));
        let bytes = payload(&EmailMessage::new(Uuid::new_v4(), "a@x.com", "Hi", "Body"));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let service = service.clone();
                let bytes = bytes.clone();
                tokio::spawn(async move { service.on_message(&bytes).await })
            })
            .collect();

        let mut stored = 0;
        for handle in handles {
            if let Processed::Stored(_) = handle.await.unwrap().unwrap() {
                stored += 1;
            }
        }

        assert_eq!(stored, 1);
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_payload_is_rejected() {
        let store = Arc::new(MemoryEmailStore::new());
        let service = notifier(store.clone(), Arc::new(LogMailer));

        let err = service.on_message(b"{\"subject\":\"Hi\"}").await.unwrap_err();

        assert!(matches!(err, AppError::MalformedPayload(_)));
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lost_insert_race_reports_duplicate() {
        let mut repo = MockEmailRepository::new();
        repo.expect_find_by_dedup_key().returning(|_| Ok(None));
        repo.expect_insert().times(1).returning(|_| Ok(Inserted::Duplicate));
        repo.expect_set_status().never();

        let mut mailer = MockMailer::new();
        mailer.expect_send().never();

        let service = notifier(Arc::new(repo), Arc::new(mailer));
        let bytes = payload(&EmailMessage::new(Uuid::new_v4(), "a@x.com", "Hi", "Body"));

        assert_eq!(service.on_message(&bytes).await.unwrap(), Processed::Duplicate);
    }

    #[tokio::test]
    async fn test_store_outage_is_infrastructure_error() {
        let mut repo = MockEmailRepository::new();
        repo.expect_find_by_dedup_key()
            .returning(|_| Err(AppError::infrastructure("Email store")));

        let service = notifier(Arc::new(repo), Arc::new(LogMailer));
        let bytes = payload(&EmailMessage::new(Uuid::new_v4(), "a@x.com", "Hi", "Body"));

        let err = service.on_message(&bytes).await.unwrap_err();
        assert!(err.is_infrastructure());
    }

    #[tokio::test]
    async fn test_mailer_outcomes_set_status() {
        let store = Arc::new(MemoryEmailStore::new());

        let mut rejecting = MockMailer::new();
        rejecting
            .expect_send()
            .returning(|_| Err(MailError::Rejected("mailbox does not exist".to_string())));
        let service = notifier(store.clone(), Arc::new(rejecting));
        let bytes = payload(&EmailMessage::new(Uuid::new_v4(), "a@x.com", "Hi", "Body"));
        let Processed::Stored(failed) = service.on_message(&bytes).await.unwrap() else {
            panic!("expected a stored record");
        };
        assert_eq!(failed.status, EmailStatus::Failed);

        let mut down = MockMailer::new();
        down.expect_send()
            .returning(|_| Err(MailError::Unavailable("connection refused".to_string())));
        let service = notifier(store.clone(), Arc::new(down));
        let bytes = payload(&EmailMessage::new(Uuid::new_v4(), "b@x.com", "Hi", "Body"));
        let err = service.on_message(&bytes).await.unwrap_err();
        assert!(err.is_infrastructure());

        let statuses: Vec<EmailStatus> =
            store.list().await.unwrap().into_iter().map(|r| r.status).collect();
        assert_eq!(statuses, vec![EmailStatus::Failed, EmailStatus::Pending]);
    }

    #[tokio::test]
    async fn test_pending_record_is_sent_on_redelivery() {
        let store = Arc::new(MemoryEmailStore::new());
        let bytes = payload(&EmailMessage::new(Uuid::new_v4(), "a@x.com", "Hi", "Body"));

        let mut down = MockMailer::new();
        down.expect_send()
            .times(1)
            .returning(|_| Err(MailError::Unavailable("connection refused".to_string())));
        let first = notifier(store.clone(), Arc::new(down));
        let err = first.on_message(&bytes).await.unwrap_err();
        assert!(err.is_infrastructure());
        assert_eq!(store.list().await.unwrap()[0].status, EmailStatus::Pending);

        let second = notifier(store.clone(), Arc::new(LogMailer));
        let Processed::Resumed(record) = second.on_message(&bytes).await.unwrap() else {
            panic!("expected the pending record to be resumed");
        };
        assert_eq!(record.status, EmailStatus::Sent);

        let records = store.list().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, EmailStatus::Sent);

        // Settled now, so a further copy changes nothing
        assert_eq!(second.on_message(&bytes).await.unwrap(), Processed::Duplicate);
    }

    #[tokio::test]
    async fn test_status_write_failure_is_retried_on_redelivery() {
        let stored: Arc<std::sync::Mutex<Option<EmailNotification>>> = Arc::default();

        let mut repo = MockEmailRepository::new();
        let lookup = stored.clone();
        repo.expect_find_by_dedup_key()
            .returning(move |_| Ok(lookup.lock().unwrap().clone()));
        let keep = stored.clone();
        repo.expect_insert().times(1).returning(move |record| {
            *keep.lock().unwrap() = Some(record.clone());
            Ok(Inserted::Created(record))
        });
        let mut status_writes = 0;
        repo.expect_set_status().times(2).returning(move |_, _| {
            status_writes += 1;
            if status_writes == 1 {
                Err(AppError::infrastructure("Email store"))
            } else {
                Ok(())
            }
        });

        let mut mailer = MockMailer::new();
        mailer.expect_send().times(2).returning(|_| Ok(()));

        let service = notifier(Arc::new(repo), Arc::new(mailer));
        let bytes = payload(&EmailMessage::new(Uuid::new_v4(), "a@x.com", "Hi", "Body"));

        let err = service.on_message(&bytes).await.unwrap_err();
        assert!(err.is_infrastructure());

        let Processed::Resumed(record) = service.on_message(&bytes).await.unwrap() else {
            panic!("expected the pending record to be resumed");
        };
        assert_eq!(record.status, EmailStatus::Sent);
    }

    #[tokio::test]
    async fn test_read_operations() {
        let store = Arc::new(MemoryEmailStore::new());
        let service = notifier(store, Arc::new(LogMailer));
        let alice = Uuid::new_v4();

        service
            .on_message(&payload(&EmailMessage::new(alice, "a@x.com", "One", "Body")))
            .await
            .unwrap();
        service
            .on_message(&payload(&EmailMessage::new(Uuid::new_v4(), "b@x.com", "Two", "Body")))
            .await
            .unwrap();

        let all = service.list().await.unwrap();
        assert_eq!(all.len(), 2);

        let for_alice = service.list_for_user(alice).await.unwrap();
        assert_eq!(for_alice.len(), 1);
        assert_eq!(service.get(for_alice[0].id).await.unwrap(), for_alice[0]);

        let err = service.get(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
