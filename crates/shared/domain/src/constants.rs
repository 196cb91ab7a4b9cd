//! Domain-level constants.
//!
//! These constants define business rules and the contract shared between
//! the user and email services.

// =============================================================================
// Event Channel
// =============================================================================

/// Topic on which the user service publishes email notifications
pub const EMAIL_NOTIFICATIONS_TOPIC: &str = "ms.email";

/// Suffix appended to a topic to name its dead-letter topic
pub const DEAD_LETTER_SUFFIX: &str = ".dead-letter";

/// Delivery attempts before a failing message is dead-lettered
pub const DEFAULT_MAX_DELIVERIES: u32 = 5;

/// Dead-letter topic for a given topic
pub fn dead_letter_topic(topic: &str) -> String {
    format!("{}{}", topic, DEAD_LETTER_SUFFIX)
}

// =============================================================================
// Validation
// =============================================================================

/// Minimum name length requirement
pub const MIN_NAME_LENGTH: usize = 1;

/// Maximum name length (matches the users.name column)
pub const MAX_NAME_LENGTH: usize = 255;

/// Maximum email length (RFC 5321 path limit)
pub const MAX_EMAIL_LENGTH: usize = 254;

// =============================================================================
// Notifications
// =============================================================================

/// Sender used when a message does not carry one
pub const DEFAULT_NOTIFICATION_SENDER: &str = "noreply@example.com";

/// Subject of the notice sent when someone registers with a taken email
pub const DUPLICATE_REGISTRATION_SUBJECT: &str = "Registration attempt with your email address";

/// Subject of the welcome message sent after a successful registration
pub const WELCOME_SUBJECT: &str = "Welcome aboard";
