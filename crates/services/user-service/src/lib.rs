//! User Service Library
//!
//! Owns user records and publishes email notifications on the event
//! channel. It can be run as a standalone service or embedded in the
//! combined binary.

pub mod config;
pub mod http;
pub mod infra;
pub mod repository;
pub mod service;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

use common::AppResult;
use messaging::EventChannel;

use crate::config::UserServiceConfig;
use crate::http::{create_router, AppState};
use crate::infra::Database;
use crate::repository::{MemoryUserStore, UserRepository, UserStore};
use crate::service::UserRegistrar;

/// Name used for logging and as the channel consumer group
pub const SERVICE_NAME: &str = "user-service";

/// Run the user service as an embedded component (for combined binary).
pub async fn run_embedded(config: UserServiceConfig) -> Result<(), Box<dyn std::error::Error>> {
    let channel = messaging::connect(&config.channel, SERVICE_NAME).await?;
    let state = build_state(&config, channel).await?;
    serve(&config.host, config.port, state, shutdown_signal()).await
}

/// Wire store, registrar and channel into the facade state.
///
/// The channel is passed in so the combined binary can share one
/// in-process channel between both services.
pub async fn build_state(
    config: &UserServiceConfig,
    channel: Arc<dyn EventChannel>,
) -> AppResult<AppState> {
    let store: Arc<dyn UserRepository> = if config.database.is_in_memory() {
        tracing::warn!("Using in-process user store, records do not survive restarts");
        Arc::new(MemoryUserStore::new())
    } else {
        let db = Database::connect(&config.database).await?;
        Arc::new(UserStore::new(db.get_connection()))
    };

    let registrar = Arc::new(UserRegistrar::new(store.clone(), channel.clone(), config));
    Ok(AppState::new(registrar, store, channel))
}

/// Serve the HTTP facade until `shutdown` resolves.
pub async fn serve(
    host: &str,
    port: u16,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("User service listening on http://{}", addr);

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("User service stopped");
    Ok(())
}

/// Resolves on Ctrl+C
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Run migrations (for CLI commands).
pub async fn run_migrations(action: MigrateAction) -> Result<(), Box<dyn std::error::Error>> {
    let config = UserServiceConfig::from_env();
    let db = Database::connect_without_migrations(&config.database).await?;

    match action {
        MigrateAction::Up => {
            db.run_migrations().await?;
            info!("Migrations applied successfully");
        }
        MigrateAction::Down => {
            db.rollback_migration().await?;
            info!("Rolled back last migration");
        }
        MigrateAction::Status => {
            for (name, applied) in db.migration_status().await? {
                let marker = if applied { "[x]" } else { "[ ]" };
                println!("{} {}", marker, name);
            }
        }
        MigrateAction::Fresh => {
            db.fresh_migrations().await?;
            info!("Database reset and migrations applied");
        }
    }

    Ok(())
}

/// Migration action type.
#[derive(Debug, Clone, Copy)]
pub enum MigrateAction {
    Up,
    Down,
    Status,
    Fresh,
}
