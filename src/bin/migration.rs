//! Schema management and bootstrap tasks for storefront-api.

use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::info;

use storefront_api::{
    auth::{AuthConfig, AuthService},
    config, db,
    entities::Role,
    migrator,
    services::accounts::UserService,
};

#[derive(Parser)]
#[command(
    name = "migration",
    about = "Apply or roll back storefront-api migrations",
    version
)]
struct Cli {
    /// Overrides `database_url` from the loaded configuration
    #[arg(long, global = true, env = "DATABASE_URL")]
    database_url: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply every pending migration
    Up,
    /// Roll back the most recent migrations
    Down(DownArgs),
    /// Create an admin account (migrations are applied first)
    CreateAdmin(CreateAdminArgs),
}

#[derive(Args)]
struct DownArgs {
    #[arg(long, default_value_t = 1)]
    steps: u32,
}

#[derive(Args)]
struct CreateAdminArgs {
    #[arg(long)]
    name: String,
    #[arg(long)]
    email: String,
    #[arg(long, env = "ADMIN_PASSWORD", hide_env_values = true)]
    password: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut cfg = config::load_config().context("failed to load configuration")?;
    config::init_tracing(&cfg.log_level, cfg.log_json);

    if let Some(url) = cli.database_url {
        cfg.database_url = url;
    }

    match cli.command {
        Commands::Up => migrator::run_migration(&cfg.database_url).await?,
        Commands::Down(args) => migrator::rollback_migration(&cfg.database_url, args.steps).await?,
        Commands::CreateAdmin(args) => {
            let pool = db::establish_connection_from_app_config(&cfg).await?;
            db::run_migrations(&pool).await?;

            let auth = Arc::new(AuthService::new(AuthConfig::from(&cfg)));
            let users = UserService::new(Arc::new(pool), auth);
            let admin = users
                .create_user(&args.name, &args.email, &args.password, Role::Admin)
                .await?;
            info!(user_id = admin.id, email = %admin.email, "admin account created");
        }
    }

    Ok(())
}
