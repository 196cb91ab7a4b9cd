//! Common utilities shared across both services.
//!
//! This crate provides:
//! - Unified error handling with HTTP conversion
//! - Configuration structures
//! - The health check response

pub mod config;
pub mod error;
pub mod health;

pub use config::*;
pub use error::{AppError, AppResult, OptionExt};
pub use health::{health_report, HealthResponse};
