//! Outbound mail delivery.

use async_trait::async_trait;
use thiserror::Error;

use domain::EmailNotification;

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

/// Why a send did not go through
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MailError {
    /// The relay could not be reached; the record stays pending
    #[error("Mail relay unavailable: {0}")]
    Unavailable(String),

    /// The relay refused the message for good
    #[error("Mail rejected: {0}")]
    Rejected(String),
}

/// Mail transport trait for dependency injection.
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &EmailNotification) -> Result<(), MailError>;
}

/// Mailer that writes every email to the log instead of sending it.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &EmailNotification) -> Result<(), MailError> {
        tracing::info!(
            "=== EMAIL (not sent) ===\n\
             From: {}\n\
             To: {}\n\
             Subject: {}\n\
             Body:\n{}\n\
             ========================",
            email.email_from,
            email.email_to,
            email.subject,
            email.text
        );
        Ok(())
    }
}
