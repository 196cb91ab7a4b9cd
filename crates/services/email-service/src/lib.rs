//! Email Service Library
//!
//! Consumes email notifications from the event channel, keeps one email
//! record per logical message and exposes the records read-only over
//! HTTP. It can be run as a standalone service or embedded in the
//! combined binary.

pub mod config;
pub mod http;
pub mod infra;
pub mod repository;
pub mod service;
pub mod worker;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use common::AppResult;
use messaging::EventChannel;

use crate::config::EmailServiceConfig;
use crate::http::{create_router, AppState};
use crate::infra::Database;
use crate::repository::{EmailRepository, EmailStore, MemoryEmailStore};
use crate::service::{EmailNotifier, LogMailer};
use crate::worker::EmailConsumer;

/// Name used for logging and as the channel consumer group
pub const SERVICE_NAME: &str = "email-service";

/// Run the email service as an embedded component (for combined binary).
pub async fn run_embedded(config: EmailServiceConfig) -> Result<(), Box<dyn std::error::Error>> {
    let channel = messaging::connect(&config.channel, SERVICE_NAME).await?;
    run(&config, channel, shutdown_signal()).await
}

/// Start the consumer pool and the HTTP facade, stop both on `shutdown`.
pub async fn run(
    config: &EmailServiceConfig,
    channel: Arc<dyn EventChannel>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), Box<dyn std::error::Error>> {
    let state = build_state(config, channel).await?;
    let consumer = Arc::new(build_consumer(&state, config));

    let (stop_tx, stop_rx) = watch::channel(false);
    let workers = consumer.spawn_pool(config.consumers, stop_rx);
    info!(consumers = config.consumers, "Email consumers running");

    // Consumers stop with the server; if serving fails the dropped sender stops them too
    let shutdown = async move {
        shutdown.await;
        let _ = stop_tx.send(true);
    };
    serve(&config.host, config.port, state, shutdown).await?;

    for worker in workers {
        if let Err(e) = worker.await {
            tracing::error!("Email consumer task panicked: {}", e);
        }
    }

    Ok(())
}

/// Wire store, notifier and channel into the facade state.
///
/// The channel is passed in so the combined binary can share one
/// in-process channel between both services.
pub async fn build_state(
    config: &EmailServiceConfig,
    channel: Arc<dyn EventChannel>,
) -> AppResult<AppState> {
    let store: Arc<dyn EmailRepository> = if config.database.is_in_memory() {
        tracing::warn!("Using in-process email store, records do not survive restarts");
        Arc::new(MemoryEmailStore::new())
    } else {
        let db = Database::connect(&config.database).await?;
        Arc::new(EmailStore::new(db.get_connection()))
    };

    let notifier = Arc::new(EmailNotifier::new(store.clone(), Arc::new(LogMailer), config));
    Ok(AppState::new(notifier, store, channel))
}

/// Consumer of the notifications topic driving the state's notifier.
pub fn build_consumer(state: &AppState, config: &EmailServiceConfig) -> EmailConsumer {
    EmailConsumer::new(state.channel.clone(), state.email_service.clone(), config)
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
    info!("Email service listening on http://{}", addr);

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Email service stopped");
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
    let config = EmailServiceConfig::from_env();
    let db = Database::connect_without_migrations(&config.database).await?;

    match action {
        MigrateAction::Up => {
            db.run_migrations().await?;
            info!("Email migrations applied successfully");
        }
        MigrateAction::Down => {
            db.rollback_migration().await?;
            info!("Rolled back last email migration");
        }
        MigrateAction::Status => {
            for (name, applied) in db.migration_status().await? {
                let marker = if applied { "[x]" } else { "[ ]" };
                println!("{} {}", marker, name);
            }
        }
        MigrateAction::Fresh => {
            db.fresh_migrations().await?;
            info!("Email database reset and migrations applied");
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
