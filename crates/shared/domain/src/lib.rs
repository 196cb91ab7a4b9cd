//! Domain layer - Core business entities and value objects.
//!
//! This crate contains pure domain logic with no infrastructure dependencies.
//! Both services share these types: the user service produces
//! [`EmailMessage`] values and the email service persists them as
//! [`EmailNotification`] records.

pub mod constants;
pub mod email;
pub mod error;
pub mod user;

pub use constants::*;
pub use email::{EmailMessage, EmailNotification, EmailResponse, EmailStatus};
pub use error::{DomainError, DomainResult};
pub use user::{normalize_email, User, UserDetails, UserResponse};
