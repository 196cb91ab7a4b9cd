//! Combined binary for development - runs both services in one process.

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use email_service_lib::config::EmailServiceConfig;
use messaging::{EventChannel, MemoryChannel};
use user_service_lib::config::UserServiceConfig;

#[derive(Parser)]
#[command(name = "rust-api")]
#[command(about = "Combined microservices binary for development")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run both services in a single process (development mode)
    Serve {
        /// Overrides both services' configured host
        #[arg(long)]
        host: Option<String>,
        /// Overrides USER_SERVICE_PORT (default 8081)
        #[arg(long)]
        user_port: Option<u16>,
        /// Overrides EMAIL_SERVICE_PORT (default 8082)
        #[arg(long)]
        email_port: Option<u16>,
        /// Use in-process stores and one shared in-process channel
        #[arg(long)]
        in_memory: bool,
    },
    /// Run database migrations for both services
    Migrate {
        #[command(subcommand)]
        action: MigrateAction,
    },
}

#[derive(Subcommand, Clone, Copy)]
enum MigrateAction {
    /// Run pending migrations
    Up,
    /// Rollback last migration
    Down,
    /// Show migration status
    Status,
    /// Reset database and run all migrations
    Fresh,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            host,
            user_port,
            email_port,
            in_memory,
        } => {
            let (user_config, email_config) = if in_memory {
                (UserServiceConfig::in_memory(), EmailServiceConfig::in_memory())
            } else {
                (UserServiceConfig::from_env(), EmailServiceConfig::from_env())
            };
            let user_config = user_config.with_listen(host.clone(), user_port);
            let email_config = email_config.with_listen(host, email_port);

            info!("Starting combined services in development mode");
            info!("  User service:  http://{}:{}", user_config.host, user_config.port);
            info!("  Email service: http://{}:{}", email_config.host, email_config.port);

            // Separate in-process channels would never see each other's messages
            let (user_channel, email_channel): (Arc<dyn EventChannel>, Arc<dyn EventChannel>) =
                if in_memory {
                    let shared: Arc<dyn EventChannel> =
                        Arc::new(MemoryChannel::with_visibility_timeout(Duration::from_millis(
                            email_config.channel.visibility_timeout_ms,
                        )));
                    (shared.clone(), shared)
                } else {
                    (
                        messaging::connect(&user_config.channel, user_service_lib::SERVICE_NAME)
                            .await?,
                        messaging::connect(&email_config.channel, email_service_lib::SERVICE_NAME)
                            .await?,
                    )
                };

            // Spawn email-service first so the consumer group exists before users arrive
            let email_handle = tokio::spawn(async move {
                if let Err(e) = email_service_lib::run(
                    &email_config,
                    email_channel,
                    email_service_lib::shutdown_signal(),
                )
                .await
                {
                    error!("Email service failed: {}", e);
                }
            });

            let user_state = user_service_lib::build_state(&user_config, user_channel).await?;
            let user_handle = tokio::spawn(async move {
                if let Err(e) = user_service_lib::serve(
                    &user_config.host,
                    user_config.port,
                    user_state,
                    user_service_lib::shutdown_signal(),
                )
                .await
                {
                    error!("User service failed: {}", e);
                }
            });

            // Either service exiting ends the process
            tokio::select! {
                _ = user_handle => info!("User service exited"),
                _ = email_handle => info!("Email service exited"),
            }
        }
        Commands::Migrate { action } => {
            let (user_action, email_action) = match action {
                MigrateAction::Up => (
                    user_service_lib::MigrateAction::Up,
                    email_service_lib::MigrateAction::Up,
                ),
                MigrateAction::Down => (
                    user_service_lib::MigrateAction::Down,
                    email_service_lib::MigrateAction::Down,
                ),
                MigrateAction::Status => (
                    user_service_lib::MigrateAction::Status,
                    email_service_lib::MigrateAction::Status,
                ),
                MigrateAction::Fresh => (
                    user_service_lib::MigrateAction::Fresh,
                    email_service_lib::MigrateAction::Fresh,
                ),
            };

            // Each service owns its own database
            user_service_lib::run_migrations(user_action).await?;
            email_service_lib::run_migrations(email_action).await?;
        }
    }

    Ok(())
}
