//! Email notification message and record.
//!
//! [`EmailMessage`] is the wire contract published on the event channel.
//! Fields are camelCase JSON; unknown fields are ignored so the schema can
//! only grow additively. [`EmailNotification`] is the record the email
//! service persists for every distinct message it consumes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::{DUPLICATE_REGISTRATION_SUBJECT, WELCOME_SUBJECT};
use crate::error::{DomainError, DomainResult};
use crate::user::User;

/// Namespace for content-derived deduplication keys
const DEDUP_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_1b2e_9a43_4d0f_8e55_2c7b_0e4a_91d3);

/// Delivery status of a persisted notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum EmailStatus {
    Pending,
    Sent,
    Failed,
}

impl EmailStatus {
    /// Stored/serialized representation
    pub fn as_str(&self) -> &'static str {
        match self {
            EmailStatus::Pending => "PENDING",
            EmailStatus::Sent => "SENT",
            EmailStatus::Failed => "FAILED",
        }
    }
}

impl std::str::FromStr for EmailStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(EmailStatus::Pending),
            "SENT" => Ok(EmailStatus::Sent),
            "FAILED" => Ok(EmailStatus::Failed),
            other => Err(DomainError::internal(format!("Unknown email status: {}", other))),
        }
    }
}

impl std::fmt::Display for EmailStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notification message carried by the event channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailMessage {
    /// Producer-assigned identifier, used for deduplication when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<Uuid>,
    pub user_id: Uuid,
    pub email_to: String,
    pub subject: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<DateTime<Utc>>,
}

impl EmailMessage {
    /// Create a message with a fresh message id, stamped now
    pub fn new(
        user_id: Uuid,
        email_to: impl Into<String>,
        subject: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            message_id: Some(Uuid::new_v4()),
            user_id,
            email_to: email_to.into(),
            subject: subject.into(),
            text: text.into(),
            email_from: None,
            sent_at: Some(Utc::now()),
        }
    }

    /// Set the sender address
    pub fn with_from(mut self, from: impl Into<String>) -> Self {
        self.email_from = Some(from.into());
        self
    }

    /// Notice for the owner of `email` that someone tried to register with it.
    ///
    /// `attempt_id` identifies the rejected registration; no user record
    /// exists for it.
    pub fn duplicate_registration(attempt_id: Uuid, name: &str, email: &str) -> Self {
        let text = format!(
            "Hello,\n\n\
             Someone just tried to create an account named \"{}\" using {}.\n\
             This address is already registered, so no new account was created.\n\
             If this was you, you can keep using your existing account.",
            name, email
        );
        Self::new(attempt_id, email, DUPLICATE_REGISTRATION_SUBJECT, text)
    }

    /// Welcome message for a freshly created user
    pub fn welcome(user: &User) -> Self {
        let text = format!(
            "Hello {},\n\nYour account has been created with {}.",
            user.name, user.email
        );
        Self::new(user.id, &user.email, WELCOME_SUBJECT, text)
    }

    /// Encode for publishing
    pub fn encode(&self) -> DomainResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| DomainError::internal(format!("Encode error: {}", e)))
    }

    /// Decode a channel payload, rejecting payloads without a recipient or subject
    pub fn decode(payload: &[u8]) -> DomainResult<Self> {
        let message: EmailMessage =
            serde_json::from_slice(payload).map_err(|e| DomainError::malformed(e.to_string()))?;

        if message.email_to.trim().is_empty() {
            return Err(DomainError::malformed("emailTo is empty"));
        }
        if message.subject.trim().is_empty() {
            return Err(DomainError::malformed("subject is empty"));
        }

        Ok(message)
    }

    /// Key identifying this logical message across redeliveries.
    ///
    /// The producer's message id when present, otherwise a UUID v5 over
    /// user id, recipient, subject and send timestamp.
    pub fn dedup_key(&self) -> Uuid {
        if let Some(id) = self.message_id {
            return id;
        }

        let sent_at = self.sent_at.map(|t| t.to_rfc3339()).unwrap_or_default();
        let content = format!(
            "{}\n{}\n{}\n{}",
            self.user_id, self.email_to, self.subject, sent_at
        );
        Uuid::new_v5(&DEDUP_NAMESPACE, content.as_bytes())
    }
}

/// Persisted notification record owned by the email service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailNotification {
    pub id: Uuid,
    pub dedup_key: Uuid,
    pub user_id: Uuid,
    pub email_from: String,
    pub email_to: String,
    pub subject: String,
    pub text: String,
    pub sent_at: DateTime<Utc>,
    pub status: EmailStatus,
}

impl EmailNotification {
    /// Build a pending record from a consumed message
    pub fn from_message(message: EmailMessage, default_from: &str) -> Self {
        let dedup_key = message.dedup_key();
        Self {
            id: Uuid::new_v4(),
            dedup_key,
            user_id: message.user_id,
            email_from: message
                .email_from
                .unwrap_or_else(|| default_from.to_string()),
            email_to: message.email_to,
            subject: message.subject,
            text: message.text,
            sent_at: message.sent_at.unwrap_or_else(Utc::now),
            status: EmailStatus::Pending,
        }
    }
}

/// Email record response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct EmailResponse {
    pub email_id: Uuid,
    pub user_id: Uuid,
    pub email_from: String,
    pub email_to: String,
    pub subject: String,
    pub text: String,
    pub send_date_email: DateTime<Utc>,
    pub status_email: EmailStatus,
}

impl From<EmailNotification> for EmailResponse {
    fn from(record: EmailNotification) -> Self {
        Self {
            email_id: record.id,
            user_id: record.user_id,
            email_from: record.email_from,
            email_to: record.email_to,
            subject: record.subject,
            text: record.text,
            send_date_email: record.sent_at,
            status_email: record.status,
        }
    }
}
