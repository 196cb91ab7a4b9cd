//! Service layer - registration business logic.

mod user_service;

pub use user_service::{UserRegistrar, UserService};

#[cfg(any(test, feature = "test-utils"))]
pub use user_service::MockUserService;
