//! Service layer - turns consumed notifications into email records.

mod mailer;
mod notifier;

pub use mailer::{LogMailer, MailError, Mailer};
pub use notifier::{EmailNotifier, EmailService, Processed};

#[cfg(any(test, feature = "test-utils"))]
pub use mailer::MockMailer;
#[cfg(any(test, feature = "test-utils"))]
pub use notifier::MockEmailService;
