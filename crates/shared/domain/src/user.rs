//! User domain entity and related types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::ValidateEmail;

use crate::constants::{MAX_EMAIL_LENGTH, MAX_NAME_LENGTH, MIN_NAME_LENGTH};
use crate::error::{DomainError, DomainResult};

/// Normalize an email address for storage and uniqueness checks.
///
/// Surrounding whitespace is dropped and the address is lower-cased, so
/// `Alice@X.com ` and `alice@x.com` are the same registration.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Validated name/email pair accepted by create and update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserDetails {
    pub name: String,
    pub email: String,
}

impl UserDetails {
    /// Validate raw input. The name is trimmed and the email normalized.
    pub fn parse(name: impl AsRef<str>, email: impl AsRef<str>) -> DomainResult<Self> {
        let name = name.as_ref().trim();
        let email = normalize_email(email.as_ref());

        if name.chars().count() < MIN_NAME_LENGTH {
            return Err(DomainError::validation("Name cannot be empty"));
        }
        if name.chars().count() > MAX_NAME_LENGTH {
            return Err(DomainError::validation(format!(
                "Name cannot be longer than {} characters",
                MAX_NAME_LENGTH
            )));
        }
        if email.is_empty() {
            return Err(DomainError::validation("Email cannot be empty"));
        }
        if email.len() > MAX_EMAIL_LENGTH || !email.validate_email() {
            return Err(DomainError::validation("Invalid email format"));
        }

        Ok(Self {
            name: name.to_string(),
            email,
        })
    }
}

/// User domain entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create a new user with a fresh identifier
    pub fn new(details: UserDetails) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: details.name,
            email: details.email,
            created_at: now,
            updated_at: now,
        }
    }

    /// Overwrite name and email, keeping the identifier
    pub fn apply(&mut self, details: UserDetails) {
        self.name = details.name;
        self.email = details.email;
        self.updated_at = Utc::now();
    }

    /// Whether applying `details` would change the email address
    pub fn changes_email(&self, details: &UserDetails) -> bool {
        self.email != details.email
    }
}

/// User response (safe to return to client)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct UserResponse {
    /// Unique user identifier
    pub id: Uuid,
    /// User display name
    pub name: String,
    /// User email address
    pub email: String,
    /// Account creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}
