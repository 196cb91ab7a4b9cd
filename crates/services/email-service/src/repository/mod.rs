//! Repository layer for data access.

mod email_repository;
pub mod entities;
mod memory;

pub use email_repository::{EmailRepository, EmailStore, Inserted};
pub use memory::MemoryEmailStore;

#[cfg(any(test, feature = "test-utils"))]
pub use email_repository::MockEmailRepository;
