//! Email Service - notification consumer with a read-only HTTP facade.

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use email_service_lib::config::EmailServiceConfig;
use email_service_lib::MigrateAction;

#[derive(Parser)]
#[command(name = "email-service")]
#[command(about = "Email notification microservice")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the consumers and the HTTP server
    Serve {
        /// Overrides EMAIL_SERVICE_HOST
        #[arg(long)]
        host: Option<String>,
        /// Overrides EMAIL_SERVICE_PORT (default 8082)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Database migration commands
    Migrate {
        #[command(subcommand)]
        action: MigrateCommands,
    },
}

#[derive(Subcommand)]
enum MigrateCommands {
    /// Run pending migrations
    Up,
    /// Rollback last migration
    Down,
    /// Show migration status
    Status,
    /// Reset database and run all migrations
    Fresh,
}

impl From<MigrateCommands> for MigrateAction {
    fn from(command: MigrateCommands) -> Self {
        match command {
            MigrateCommands::Up => MigrateAction::Up,
            MigrateCommands::Down => MigrateAction::Down,
            MigrateCommands::Status => MigrateAction::Status,
            MigrateCommands::Fresh => MigrateAction::Fresh,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    match Cli::parse().command {
        Commands::Serve { host, port } => {
            let config = EmailServiceConfig::from_env().with_listen(host, port);
            email_service_lib::run_embedded(config).await?;
        }
        Commands::Migrate { action } => {
            email_service_lib::run_migrations(action.into()).await?;
        }
    }

    Ok(())
}
